//! Acceleration structures over `VK_KHR_acceleration_structure`
//!
//! Translates backend-neutral build inputs into Vulkan geometry descriptions,
//! owns structure storage and the query pool used for compaction.

use ash::extensions::khr::AccelerationStructure as AccelerationLoader;
use ash::{vk, Device};

use super::buffer::Buffer;
use super::context::{VulkanContext, VulkanError, VulkanResult};
use crate::device::{BufferUsage, BuildFlags, BuildInput, DeviceAddress, StructureLevel};

/// Vulkan structure type for a level
pub fn structure_type(level: StructureLevel) -> vk::AccelerationStructureTypeKHR {
    match level {
        StructureLevel::PerObject => vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
        StructureLevel::Scene => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
    }
}

/// Vulkan build flags for backend-neutral preferences
pub fn build_flags(flags: BuildFlags) -> vk::BuildAccelerationStructureFlagsKHR {
    let mut out = vk::BuildAccelerationStructureFlagsKHR::empty();
    if flags.contains(BuildFlags::ALLOW_UPDATE) {
        out |= vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE;
    }
    if flags.contains(BuildFlags::ALLOW_COMPACTION) {
        out |= vk::BuildAccelerationStructureFlagsKHR::ALLOW_COMPACTION;
    }
    if flags.contains(BuildFlags::PREFER_FAST_TRACE) {
        out |= vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;
    }
    if flags.contains(BuildFlags::PREFER_FAST_BUILD) {
        out |= vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD;
    }
    out
}

/// Geometry description and range of one build input
pub fn geometry(input: &BuildInput) -> (vk::AccelerationStructureGeometryKHR, vk::AccelerationStructureBuildRangeInfoKHR) {
    let geometry = match input {
        BuildInput::Triangles(triangles) => {
            let mut flags = vk::GeometryFlagsKHR::NO_DUPLICATE_ANY_HIT_INVOCATION;
            if triangles.opaque {
                flags |= vk::GeometryFlagsKHR::OPAQUE;
            }
            let data = vk::AccelerationStructureGeometryTrianglesDataKHR::builder()
                .vertex_format(vk::Format::R32G32B32_SFLOAT)
                .vertex_data(vk::DeviceOrHostAddressConstKHR {
                    device_address: triangles.vertex_address,
                })
                .vertex_stride(triangles.vertex_stride)
                .max_vertex(triangles.max_vertex)
                .index_type(vk::IndexType::UINT32)
                .index_data(vk::DeviceOrHostAddressConstKHR {
                    device_address: triangles.index_address,
                })
                .build();
            vk::AccelerationStructureGeometryKHR::builder()
                .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
                .geometry(vk::AccelerationStructureGeometryDataKHR { triangles: data })
                .flags(flags)
                .build()
        }
        BuildInput::Instances(instances) => {
            let data = vk::AccelerationStructureGeometryInstancesDataKHR::builder()
                .array_of_pointers(false)
                .data(vk::DeviceOrHostAddressConstKHR {
                    device_address: instances.instance_address,
                })
                .build();
            vk::AccelerationStructureGeometryKHR::builder()
                .geometry_type(vk::GeometryTypeKHR::INSTANCES)
                .geometry(vk::AccelerationStructureGeometryDataKHR { instances: data })
                .build()
        }
    };

    let range = vk::AccelerationStructureBuildRangeInfoKHR::builder()
        .primitive_count(input.primitive_count())
        .build();
    (geometry, range)
}

/// Acceleration structure and its storage buffer
pub struct Structure {
    loader: AccelerationLoader,
    handle: vk::AccelerationStructureKHR,
    address: DeviceAddress,
    level: StructureLevel,
    // Dropped after the structure
    storage: Buffer,
}

impl Structure {
    /// Create an unbuilt structure of `size` bytes
    pub fn new(context: &VulkanContext, level: StructureLevel, size: u64) -> VulkanResult<Self> {
        let storage = Buffer::new(context, size, BufferUsage::STRUCTURE_STORAGE)?;
        let loader = context.acceleration().clone();

        let create_info = vk::AccelerationStructureCreateInfoKHR::builder()
            .buffer(storage.handle())
            .offset(0)
            .size(size)
            .ty(structure_type(level));
        let handle = unsafe {
            loader
                .create_acceleration_structure(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let address_info = vk::AccelerationStructureDeviceAddressInfoKHR::builder().acceleration_structure(handle);
        let address = unsafe { loader.get_acceleration_structure_device_address(&address_info) };

        Ok(Self {
            loader,
            handle,
            address,
            level,
            storage,
        })
    }

    /// Structure handle
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle
    }

    /// Device address referenced by instance records and descriptors
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Level of this structure
    pub fn level(&self) -> StructureLevel {
        self.level
    }

    /// Size of the storage buffer
    pub fn size(&self) -> u64 {
        self.storage.size()
    }
}

impl Drop for Structure {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_acceleration_structure(self.handle, None);
        }
    }
}

/// Query storage and scratch sizes for a build
pub fn build_sizes(
    loader: &AccelerationLoader,
    input: &BuildInput,
    flags: BuildFlags,
) -> vk::AccelerationStructureBuildSizesInfoKHR {
    let (geometry, range) = geometry(input);
    let geometries = [geometry];
    let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::builder()
        .ty(structure_type(input.level()))
        .flags(build_flags(flags))
        .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
        .geometries(&geometries);

    unsafe {
        loader.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[range.primitive_count],
        )
    }
}

/// Query pool receiving compacted sizes
pub struct CompactionQuery {
    device: Device,
    pool: vk::QueryPool,
    count: u32,
}

impl CompactionQuery {
    /// Create a pool with `count` compacted-size queries
    pub fn new(device: Device, count: u32) -> VulkanResult<Self> {
        let create_info = vk::QueryPoolCreateInfo::builder()
            .query_type(vk::QueryType::ACCELERATION_STRUCTURE_COMPACTED_SIZE_KHR)
            .query_count(count.max(1));
        let pool = unsafe { device.create_query_pool(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, pool, count })
    }

    /// Reset the queries and write the compacted sizes of `structures`
    pub fn record(&self, loader: &AccelerationLoader, command_buffer: vk::CommandBuffer, structures: &[vk::AccelerationStructureKHR]) {
        unsafe {
            self.device.cmd_reset_query_pool(command_buffer, self.pool, 0, self.count.max(1));
            loader.cmd_write_acceleration_structures_properties(
                command_buffer,
                structures,
                vk::QueryType::ACCELERATION_STRUCTURE_COMPACTED_SIZE_KHR,
                self.pool,
                0,
            );
        }
    }

    /// Read back the compacted sizes, waiting for them to be available
    pub fn results(&self) -> VulkanResult<Vec<u64>> {
        let mut sizes = vec![0u64; self.count as usize];
        if sizes.is_empty() {
            return Ok(sizes);
        }
        unsafe {
            self.device
                .get_query_pool_results(
                    self.pool,
                    0,
                    self.count,
                    &mut sizes,
                    vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
                )
                .map_err(VulkanError::Api)?;
        }
        Ok(sizes)
    }
}

impl Drop for CompactionQuery {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_query_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{InstanceInput, TriangleInput};

    #[test]
    fn test_opaque_triangles_skip_any_hit() {
        let input = BuildInput::Triangles(TriangleInput {
            vertex_address: 0x1000,
            vertex_stride: 32,
            max_vertex: 2,
            index_address: 0x2000,
            triangle_count: 1,
            opaque: true,
        });
        let (geometry, range) = geometry(&input);
        assert!(geometry.flags.contains(vk::GeometryFlagsKHR::OPAQUE));
        assert!(geometry.flags.contains(vk::GeometryFlagsKHR::NO_DUPLICATE_ANY_HIT_INVOCATION));
        assert_eq!(range.primitive_count, 1);
    }

    #[test]
    fn test_instances_map_to_top_level() {
        let input = BuildInput::Instances(InstanceInput {
            instance_address: 0x3000,
            instance_count: 4,
        });
        let (geometry, range) = geometry(&input);
        assert_eq!(geometry.geometry_type, vk::GeometryTypeKHR::INSTANCES);
        assert_eq!(range.primitive_count, 4);
        assert_eq!(structure_type(input.level()), vk::AccelerationStructureTypeKHR::TOP_LEVEL);
    }

    #[test]
    fn test_build_flag_translation() {
        let flags = build_flags(BuildFlags::ALLOW_UPDATE | BuildFlags::PREFER_FAST_BUILD);
        assert!(flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE));
        assert!(flags.contains(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD));
        assert!(!flags.contains(vk::BuildAccelerationStructureFlagsKHR::ALLOW_COMPACTION));
    }
}
