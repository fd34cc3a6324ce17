//! Vulkan buffer wrapper with RAII cleanup

use ash::{vk, Device};

use super::context::{VulkanContext, VulkanError, VulkanResult};
use crate::device::{BufferUsage, DeviceAddress};

/// Vulkan buffer with bound memory and a device address
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    address: DeviceAddress,
    host_visible: bool,
}

/// Translate backend-neutral usage into Vulkan usage flags
pub fn usage_flags(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS | vk::BufferUsageFlags::TRANSFER_DST;
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::BUILD_INPUT) {
        flags |= vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR;
    }
    if usage.contains(BufferUsage::STRUCTURE_STORAGE) {
        flags |= vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR;
    }
    if usage.contains(BufferUsage::SCRATCH) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    flags
}

impl Buffer {
    /// Create a new buffer
    ///
    /// Scratch and structure storage live in device-local memory; everything
    /// else is host-visible and coherent so it can be written directly.
    pub fn new(context: &VulkanContext, size: vk::DeviceSize, usage: BufferUsage) -> VulkanResult<Self> {
        let device = context.raw_device().clone();
        let size = size.max(4);
        let host_visible = !usage.intersects(BufferUsage::SCRATCH | BufferUsage::STRUCTURE_STORAGE);

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage_flags(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let properties = if host_visible {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let memory_type_index = match context.find_memory_type(mem_requirements.memory_type_bits, properties) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let mut allocate_flags = vk::MemoryAllocateFlagsInfo::builder().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut allocate_flags);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) | Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::OutOfMemory {
                    requested: mem_requirements.size,
                });
            }
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        let address_info = vk::BufferDeviceAddressInfo::builder().buffer(buffer);
        let address = unsafe { device.get_buffer_device_address(&address_info) };

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            address,
            host_visible,
        })
    }

    /// Write data at `offset`
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        if !self.host_visible {
            return Err(VulkanError::InvalidOperation {
                reason: "Buffer is not host-visible".to_string(),
            });
        }
        let end = offset + data.len() as u64;
        if end > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Write of {} bytes at {} overruns buffer of {} bytes", data.len(), offset, self.size),
            });
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, offset, data.len() as u64, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get buffer size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Device address of the buffer start
    pub fn address(&self) -> DeviceAddress {
        self.address
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_buffer_is_addressable() {
        for usage in [BufferUsage::STORAGE, BufferUsage::UNIFORM, BufferUsage::SCRATCH] {
            assert!(usage_flags(usage).contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS));
        }
    }

    #[test]
    fn test_build_inputs_are_read_only_structure_inputs() {
        let flags = usage_flags(BufferUsage::BUILD_INPUT | BufferUsage::STORAGE);
        assert!(flags.contains(vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR));
        assert!(flags.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
    }
}
