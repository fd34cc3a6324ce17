//! Device abstraction traits for the ray tracing core
//!
//! This module defines the seam between the scene / acceleration-structure /
//! frame-pacing logic and the device that executes the work. Backends hand out
//! opaque handles; nothing above this layer ever touches a raw API object.
//!
//! Two backends implement [`DeviceBackend`]:
//! - [`VulkanBackend`](crate::render::backends::vulkan::VulkanBackend): the
//!   production backend over `VK_KHR_acceleration_structure`
//! - [`HeadlessBackend`]: host-memory backend that records every operation,
//!   used for tests and for running the scene pipeline without a GPU

pub mod error;
pub mod headless;

pub use error::{DeviceError, DeviceResult};
pub use headless::{DeviceOp, HeadlessBackend};

use bitflags::bitflags;

use crate::scene::bindings::SceneBindings;
use crate::scene::environment::ImageData;

/// GPU virtual address of a buffer or acceleration structure
pub type DeviceAddress = u64;

/// Handle to a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a sampled device texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to an acceleration structure (per-object or scene-wide index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructureHandle(pub u64);

/// Handle to a completion signal raised by the device when a frame retires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandle(pub u64);

/// Handle to the storage image the trace pass writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

/// Ticket for a batch of structure work submitted to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmissionTicket(pub u64);

bitflags! {
    /// How a buffer is used by the device
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Read by shaders as a storage buffer
        const STORAGE = 1 << 0;
        /// Read by shaders as a uniform buffer
        const UNIFORM = 1 << 1;
        /// Read by acceleration-structure builds (vertices, indices, instances)
        const BUILD_INPUT = 1 << 2;
        /// Backing storage for an acceleration structure
        const STRUCTURE_STORAGE = 1 << 3;
        /// Scratch memory for acceleration-structure builds
        const SCRATCH = 1 << 4;
        /// Host-visible and rewritten in place
        const HOST_WRITE = 1 << 5;
    }
}

bitflags! {
    /// Build preferences for an acceleration structure
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BuildFlags: u32 {
        /// The structure can later be refit in place
        const ALLOW_UPDATE = 1 << 0;
        /// The structure can be copied into a compacted structure
        const ALLOW_COMPACTION = 1 << 1;
        /// Optimize for trace performance
        const PREFER_FAST_TRACE = 1 << 2;
        /// Optimize for build time
        const PREFER_FAST_BUILD = 1 << 3;
    }
}

/// Description of a buffer allocation
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    /// Debug label
    pub label: &'a str,
    /// Size in bytes
    pub size: u64,
    /// Usage flags
    pub usage: BufferUsage,
}

impl<'a> BufferDesc<'a> {
    /// Create a buffer description
    pub fn new(label: &'a str, size: u64, usage: BufferUsage) -> Self {
        Self { label, size, usage }
    }
}

/// Level of an acceleration structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureLevel {
    /// Bottom level: triangles of one geometry
    PerObject,
    /// Top level: instances of per-object structures
    Scene,
}

/// Triangle input of a per-object structure build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriangleInput {
    /// Address of the vertex buffer (positions first in each vertex)
    pub vertex_address: DeviceAddress,
    /// Stride between vertices in bytes
    pub vertex_stride: u64,
    /// Highest vertex index referenced
    pub max_vertex: u32,
    /// Address of the u32 index buffer
    pub index_address: DeviceAddress,
    /// Number of triangles; zero for a placeholder structure
    pub triangle_count: u32,
    /// Skip any-hit shaders for this geometry
    pub opaque: bool,
}

/// Instance input of a scene-wide structure build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceInput {
    /// Address of the packed instance records
    pub instance_address: DeviceAddress,
    /// Number of instance records
    pub instance_count: u32,
}

/// Geometry consumed by one structure build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildInput {
    /// Per-object triangle mesh
    Triangles(TriangleInput),
    /// Scene-wide instance list
    Instances(InstanceInput),
}

impl BuildInput {
    /// Structure level this input builds
    pub fn level(&self) -> StructureLevel {
        match self {
            BuildInput::Triangles(_) => StructureLevel::PerObject,
            BuildInput::Instances(_) => StructureLevel::Scene,
        }
    }

    /// Number of primitives (triangles or instances)
    pub fn primitive_count(&self) -> u32 {
        match self {
            BuildInput::Triangles(triangles) => triangles.triangle_count,
            BuildInput::Instances(instances) => instances.instance_count,
        }
    }
}

/// Sizes reported by the device for a prospective build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSizes {
    /// Size of the structure storage
    pub structure_size: u64,
    /// Scratch size for a full build
    pub build_scratch_size: u64,
    /// Scratch size for an in-place update
    pub update_scratch_size: u64,
}

/// One structure build inside a batched submission
#[derive(Debug, Clone, Copy)]
pub struct StructureBuild {
    /// Geometry to build from
    pub input: BuildInput,
    /// Build preferences
    pub flags: BuildFlags,
    /// Structure receiving the result
    pub destination: StructureHandle,
    /// Previous structure for an update build; `None` for a full build
    pub source: Option<StructureHandle>,
    /// Scratch buffer for the build
    pub scratch: BufferHandle,
}

/// Copy of a built structure into a compacted one
#[derive(Debug, Clone, Copy)]
pub struct CompactionCopy {
    /// Uncompacted structure
    pub source: StructureHandle,
    /// Destination sized by the compacted-size query
    pub destination: StructureHandle,
}

/// Everything the device needs to submit one frame's trace work
#[derive(Debug, Clone, Copy)]
pub struct FrameSubmission<'a> {
    /// Ring slot of this frame
    pub slot: usize,
    /// Monotonic frame number
    pub frame_number: u64,
    /// Completion signal of the previous frame, waited on by the device
    pub wait_for: Option<SignalHandle>,
    /// Completion signal raised when this frame retires
    pub signal: SignalHandle,
    /// Storage image written by the trace
    pub output: ImageHandle,
    /// Output extent in pixels
    pub extent: (u32, u32),
    /// Per-slot frame uniform buffer
    pub uniforms: BufferHandle,
    /// Scene resources read by the trace
    pub bindings: &'a SceneBindings,
}

/// Main device trait
///
/// Implementations execute work asynchronously; the host only blocks in
/// [`wait_submission`](Self::wait_submission), [`wait_signal`](Self::wait_signal)
/// and [`wait_idle`](Self::wait_idle).
pub trait DeviceBackend {
    /// Backend name for logging
    fn name(&self) -> &str;

    // === Buffers ===

    /// Allocate a buffer, optionally initialised with `contents`
    fn create_buffer(&mut self, desc: &BufferDesc<'_>, contents: Option<&[u8]>) -> DeviceResult<BufferHandle>;

    /// Overwrite part of a host-visible buffer
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> DeviceResult<()>;

    /// Free a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Device address of a buffer
    fn buffer_address(&self, buffer: BufferHandle) -> DeviceResult<DeviceAddress>;

    // === Textures ===

    /// Upload an RGBA8 image as a sampled texture
    fn create_texture(&mut self, label: &str, image: &ImageData) -> DeviceResult<TextureHandle>;

    /// Free a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    // === Acceleration structures ===

    /// Query storage and scratch sizes for a build
    fn structure_build_sizes(&self, input: &BuildInput, flags: BuildFlags) -> DeviceResult<BuildSizes>;

    /// Create an (unbuilt) acceleration structure of `size` bytes
    fn create_structure(&mut self, level: StructureLevel, size: u64, label: &str) -> DeviceResult<StructureHandle>;

    /// Free an acceleration structure and its storage
    fn destroy_structure(&mut self, structure: StructureHandle);

    /// Device address of an acceleration structure
    fn structure_address(&self, structure: StructureHandle) -> DeviceResult<DeviceAddress>;

    /// Record all `builds` into one submission
    ///
    /// With `query_compacted_sizes`, the compacted size of every destination
    /// is written to a query readable through [`compacted_sizes`](Self::compacted_sizes),
    /// in the order of `builds`.
    fn build_structures(&mut self, builds: &[StructureBuild], query_compacted_sizes: bool) -> DeviceResult<SubmissionTicket>;

    /// Read the compacted sizes queried by a build submission
    fn compacted_sizes(&mut self, ticket: SubmissionTicket) -> DeviceResult<Vec<u64>>;

    /// Record all compaction copies into one submission
    fn compact_structures(&mut self, copies: &[CompactionCopy]) -> DeviceResult<SubmissionTicket>;

    /// Block until a structure submission has completed
    fn wait_submission(&mut self, ticket: SubmissionTicket) -> DeviceResult<()>;

    // === Frames ===

    /// Create a completion signal
    fn create_signal(&mut self) -> DeviceResult<SignalHandle>;

    /// Free a completion signal
    fn destroy_signal(&mut self, signal: SignalHandle);

    /// Block until the frame that raises `signal` has retired
    ///
    /// Returns immediately for a signal that was never submitted.
    fn wait_signal(&mut self, signal: SignalHandle) -> DeviceResult<()>;

    /// Whether the frame that raises `signal` has retired, without blocking
    fn signal_status(&self, signal: SignalHandle) -> DeviceResult<bool>;

    /// Submit one frame of trace work
    fn submit_frame(&mut self, submission: &FrameSubmission<'_>) -> DeviceResult<()>;

    /// Create the storage image the trace writes into
    fn create_output_image(&mut self, width: u32, height: u32) -> DeviceResult<ImageHandle>;

    /// Free the output image
    fn destroy_output_image(&mut self, image: ImageHandle);

    /// Block until all submitted work has completed
    fn wait_idle(&mut self) -> DeviceResult<()>;
}
