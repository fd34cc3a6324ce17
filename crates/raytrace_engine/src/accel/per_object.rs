//! Per-object index arena
//!
//! One slot per geometry, addressed by `geometry_index`. Slots are rebuilt
//! wholesale whenever the geometry set changes, so the arena never needs
//! stable addresses across rebuilds; shaders and the scene-wide index always
//! go through the slot's current device address.

use crate::device::{
    DeviceAddress, DeviceBackend, DeviceError, DeviceResult, StructureHandle, SubmissionTicket,
    TriangleInput,
};
use crate::scene::geometry::{Geometry, Vertex};

/// Lifecycle of one per-object index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Built and final (compaction disabled)
    Built,
    /// Built; its compacted size is being queried by a submission
    AwaitingCompactedSize {
        /// Build submission carrying the query
        ticket: SubmissionTicket,
        /// Position of this slot's result in the query
        query: usize,
    },
    /// Copied into a structure of exactly its compacted size
    Compacted,
}

/// One occupied slot of the arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerObjectSlot {
    /// Device structure
    pub structure: StructureHandle,
    /// Device address referenced by scene-wide instances
    pub address: DeviceAddress,
    /// Storage size in bytes
    pub size: u64,
    /// Triangles in the build; zero for hidden geometry
    pub primitive_count: u32,
    /// Lifecycle state
    pub state: SlotState,
}

/// Build descriptor of one per-object index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerObjectDescriptor {
    /// Slot this descriptor fills
    pub geometry_index: u32,
    /// Triangle input handed to the device
    pub input: TriangleInput,
    /// Label for logs and debug names
    pub label: String,
}

impl PerObjectDescriptor {
    /// Whether the descriptor builds an empty placeholder structure
    pub fn is_empty(&self) -> bool {
        self.input.triangle_count == 0
    }
}

/// Describe the per-object index of an uploaded geometry
///
/// Hidden geometry keeps its slot with a zero-primitive build: the slot stays
/// valid for instances referencing it, but no ray can hit it.
pub fn describe_per_object<B: DeviceBackend>(backend: &B, geometry: &Geometry) -> DeviceResult<PerObjectDescriptor> {
    let buffers = geometry.buffers.ok_or_else(|| {
        DeviceError::operation(
            "describe_per_object",
            format!("geometry {} ('{}') has no device buffers", geometry.geometry_index, geometry.name),
        )
    })?;

    let triangle_count = if geometry.is_hidden() { 0 } else { geometry.triangle_count() };

    Ok(PerObjectDescriptor {
        geometry_index: geometry.geometry_index,
        input: TriangleInput {
            vertex_address: backend.buffer_address(buffers.vertices)?,
            vertex_stride: Vertex::STRIDE,
            max_vertex: (geometry.vertices.len() as u32).saturating_sub(1),
            index_address: backend.buffer_address(buffers.indices)?,
            triangle_count,
            opaque: geometry.is_opaque(),
        },
        label: format!("blas[{}] {}", geometry.geometry_index, geometry.name),
    })
}
