//! Geometry model
//!
//! A [`Geometry`] is one triangle mesh uploaded once and traced through its
//! own per-object index. Meshes arrive already parsed as [`MeshData`]; each
//! submesh carries its material, which the resource manager deduplicates and
//! flattens into a per-triangle material-index array.

use bitflags::bitflags;
use slotmap::new_key_type;

use super::error::{SceneError, SceneResult};
use super::material::Material;
use crate::device::BufferHandle;

new_key_type! {
    /// Stable handle to a submitted geometry
    pub struct GeometryKey;
}

bitflags! {
    /// Per-geometry behaviour flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GeometryFlags: u32 {
        /// Transforms of its instances change often
        const DYNAMIC = 1 << 0;
        /// No any-hit processing (alpha testing) needed
        const OPAQUE = 1 << 1;
        /// Keep the slot but exclude the triangles from tracing
        const HIDE_RENDER = 1 << 2;
    }
}

/// Vertex layout shared by uploads and per-object index builds
///
/// Position comes first so that index builds can read it at offset 0 with
/// the full vertex stride.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Position in object space
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

// Only f32 arrays, no padding
unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self { position, normal, tex_coord }
    }

    /// Byte stride between vertices
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;
}

/// Contiguous run of triangles sharing a material
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    /// First index (multiple of 3)
    pub index_start: usize,
    /// Number of indices (multiple of 3)
    pub index_count: usize,
    /// Material of these triangles
    pub material: Material,
}

/// Parsed mesh handed over by the mesh-import collaborator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    /// Optional name for logs
    pub name: String,
    /// Vertex array
    pub vertices: Vec<Vertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
    /// Material runs; empty means one default material for the whole mesh
    pub submeshes: Vec<Submesh>,
}

impl MeshData {
    /// Create a mesh with a single material
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>, material: Material) -> Self {
        let index_count = indices.len();
        Self {
            name: name.into(),
            vertices,
            indices,
            submeshes: vec![Submesh { index_start: 0, index_count, material }],
        }
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check index bounds and submesh coverage
    pub fn validate(&self) -> SceneResult<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(SceneError::InvalidGeometry(format!("mesh '{}' is empty", self.name)));
        }
        if self.indices.len() % 3 != 0 {
            return Err(SceneError::InvalidGeometry(format!(
                "mesh '{}' has {} indices, not a triangle list",
                self.name,
                self.indices.len()
            )));
        }
        let vertex_count = self.vertices.len() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= vertex_count) {
            return Err(SceneError::InvalidGeometry(format!(
                "mesh '{}' references vertex {} of {}",
                self.name, bad, vertex_count
            )));
        }

        let mut covered = 0;
        for submesh in &self.submeshes {
            if submesh.index_start != covered || submesh.index_count % 3 != 0 {
                return Err(SceneError::InvalidGeometry(format!(
                    "mesh '{}' submeshes must tile the index list in whole triangles",
                    self.name
                )));
            }
            covered += submesh.index_count;
        }
        if !self.submeshes.is_empty() && covered != self.indices.len() {
            return Err(SceneError::InvalidGeometry(format!(
                "mesh '{}' submeshes cover {} of {} indices",
                self.name,
                covered,
                self.indices.len()
            )));
        }
        Ok(())
    }

    /// Unit cube centred at the origin
    pub fn cube(material: Material) -> Self {
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, tangent u, tangent v
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = [
                    0.5 * (normal[0] + su * u[0] + sv * v[0]),
                    0.5 * (normal[1] + su * u[1] + sv * v[1]),
                    0.5 * (normal[2] + su * u[2] + sv * v[2]),
                ];
                vertices.push(Vertex::new(position, normal, [(su + 1.0) * 0.5, (sv + 1.0) * 0.5]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self::new("cube", vertices, indices, material)
    }

    /// Square in the XZ plane facing +Y
    pub fn plane(size: f32, material: Material) -> Self {
        let h = size * 0.5;
        let up = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-h, 0.0, -h], up, [0.0, 0.0]),
            Vertex::new([-h, 0.0, h], up, [0.0, 1.0]),
            Vertex::new([h, 0.0, h], up, [1.0, 1.0]),
            Vertex::new([h, 0.0, -h], up, [1.0, 0.0]),
        ];
        Self::new("plane", vertices, vec![0, 1, 2, 2, 3, 0], material)
    }
}

/// Device buffers of an uploaded geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBuffers {
    /// Vertex buffer
    pub vertices: BufferHandle,
    /// Index buffer
    pub indices: BufferHandle,
    /// Per-triangle material index buffer
    pub material_indices: BufferHandle,
}

impl GeometryBuffers {
    /// All three buffers
    pub fn handles(&self) -> [BufferHandle; 3] {
        [self.vertices, self.indices, self.material_indices]
    }
}

/// A submitted geometry owned by the scene resource manager
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Stable handle
    pub key: GeometryKey,
    /// Dense index used by shaders and by the per-object index arena
    pub geometry_index: u32,
    /// Name for logs
    pub name: String,
    /// Vertex array
    pub vertices: Vec<Vertex>,
    /// Index array
    pub indices: Vec<u32>,
    /// Global material index per triangle
    pub mat_index: Vec<u32>,
    /// Behaviour flags
    pub flags: GeometryFlags,
    /// Whether the device buffers were uploaded
    pub initialized: bool,
    /// Device buffers once uploaded
    pub buffers: Option<GeometryBuffers>,
    /// Placeholder keeping an empty scene buildable
    pub degenerate: bool,
}

impl Geometry {
    /// Number of triangles
    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Whether tracing should skip this geometry
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(GeometryFlags::HIDE_RENDER)
    }

    /// Whether any-hit processing is skipped
    pub fn is_opaque(&self) -> bool {
        self.flags.contains(GeometryFlags::OPAQUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_stride_matches_layout() {
        assert_eq!(Vertex::STRIDE, 32);
    }

    #[test]
    fn test_cube_is_valid() {
        let cube = MeshData::cube(Material::default());
        assert!(cube.validate().is_ok());
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.vertices.len(), 24);
    }

    #[test]
    fn test_out_of_bounds_index_rejected() {
        let mut mesh = MeshData::plane(1.0, Material::default());
        mesh.indices[2] = 99;
        assert!(matches!(mesh.validate(), Err(SceneError::InvalidGeometry(_))));
    }

    #[test]
    fn test_submesh_gap_rejected() {
        let mut mesh = MeshData::cube(Material::default());
        mesh.submeshes = vec![
            Submesh { index_start: 0, index_count: 6, material: Material::default() },
            Submesh { index_start: 12, index_count: 24, material: Material::default() },
        ];
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_partial_triangle_list_rejected() {
        let mut mesh = MeshData::plane(1.0, Material::default());
        mesh.indices.pop();
        mesh.submeshes.clear();
        assert!(mesh.validate().is_err());
    }
}
