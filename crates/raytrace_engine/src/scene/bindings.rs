//! Read-only scene snapshot for the render submission path

use crate::device::{BufferHandle, DeviceAddress, StructureHandle, TextureHandle};

/// Per-geometry record in the geometry buffer, indexed by `geometry_index`
///
/// The hit shader reads the instance custom index, fetches this record and
/// follows the addresses to the vertices, indices and material indices.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuGeometryRecord {
    /// Vertex buffer address
    pub vertex_address: u64,
    /// Index buffer address
    pub index_address: u64,
    /// Material index buffer address
    pub material_index_address: u64,
    /// Triangle count
    pub triangle_count: u32,
    /// [`GeometryFlags`](super::geometry::GeometryFlags) bits
    pub flags: u32,
}

unsafe impl bytemuck::Pod for GpuGeometryRecord {}
unsafe impl bytemuck::Zeroable for GpuGeometryRecord {}

/// Device resources the trace reads, published after each resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneBindings {
    /// Scene-wide index
    pub scene_index: Option<StructureHandle>,
    /// Device address of the scene-wide index
    pub scene_index_address: DeviceAddress,
    /// Geometry record buffer
    pub geometry_records: Option<BufferHandle>,
    /// Material buffer
    pub materials: Option<BufferHandle>,
    /// Material textures in index order
    pub textures: Vec<TextureHandle>,
    /// Environment texture
    pub environment: Option<TextureHandle>,
    /// Instances in the scene-wide index (including a placeholder)
    pub instance_count: u32,
    /// Bumped every time the snapshot changes
    pub revision: u64,
}

impl SceneBindings {
    /// Buffers referenced by the snapshot
    pub fn buffers(&self) -> impl Iterator<Item = BufferHandle> + '_ {
        self.geometry_records.iter().chain(self.materials.iter()).copied()
    }

    /// Whether a scene-wide index is bound
    pub fn is_traceable(&self) -> bool {
        self.scene_index.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_record_layout() {
        assert_eq!(std::mem::size_of::<GpuGeometryRecord>(), 32);
    }

    #[test]
    fn test_default_bindings_are_not_traceable() {
        let bindings = SceneBindings::default();
        assert!(!bindings.is_traceable());
        assert_eq!(bindings.buffers().count(), 0);
    }
}
