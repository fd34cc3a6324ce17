//! Host-memory device backend
//!
//! `HeadlessBackend` executes nothing on a GPU. It keeps every resource in
//! host memory, hands out fake device addresses and records each device call
//! as a [`DeviceOp`]. It also plays the role of a validation layer for the
//! invariants the renderer must uphold:
//!
//! - a resource referenced by a submitted frame must not be destroyed or
//!   rewritten until that frame's completion signal was awaited (violations
//!   are collected in [`HeadlessBackend::hazards`])
//! - a scene-wide build must only reference live per-object structures
//! - an update build must reuse a structure built with `ALLOW_UPDATE` over the
//!   same primitive count
//!
//! Frames never retire on their own: a frame stays in flight until its
//! signal (or a later one, or device idle) is awaited.

use std::collections::{HashMap, HashSet};

use super::{
    BufferDesc, BufferHandle, BufferUsage, BuildFlags, BuildInput, BuildSizes, CompactionCopy,
    DeviceAddress, DeviceBackend, DeviceError, DeviceResult, FrameSubmission, ImageHandle,
    SignalHandle, StructureBuild, StructureHandle, StructureLevel, SubmissionTicket, TextureHandle,
};
use crate::accel::scene_index::EncodedInstance;
use crate::scene::environment::ImageData;

const ADDRESS_ALIGNMENT: u64 = 256;
const STRUCTURE_BASE_SIZE: u64 = 256;

/// One recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOp {
    /// Buffer allocated
    CreateBuffer {
        /// Resource id
        id: u64,
        /// Debug label
        label: String,
        /// Size in bytes
        size: u64,
    },
    /// Host write into a buffer
    WriteBuffer {
        /// Resource id
        id: u64,
        /// Bytes written
        bytes: u64,
    },
    /// Buffer freed
    DestroyBuffer {
        /// Resource id
        id: u64,
    },
    /// Texture uploaded
    CreateTexture {
        /// Resource id
        id: u64,
        /// Debug label
        label: String,
    },
    /// Texture freed
    DestroyTexture {
        /// Resource id
        id: u64,
    },
    /// Acceleration structure created
    CreateStructure {
        /// Resource id
        id: u64,
        /// Structure level
        level: StructureLevel,
        /// Storage size
        size: u64,
    },
    /// Acceleration structure freed
    DestroyStructure {
        /// Resource id
        id: u64,
        /// Structure level
        level: StructureLevel,
    },
    /// Batched structure build submission
    BuildStructures {
        /// Number of per-object builds in the batch
        per_object: usize,
        /// Number of scene-wide builds in the batch
        scene: usize,
        /// How many of the builds were in-place updates
        updates: usize,
        /// Whether compacted sizes were queried
        queried: bool,
    },
    /// Batched compaction copy submission
    CompactStructures {
        /// Number of copies
        count: usize,
    },
    /// Host waited for a structure submission
    WaitSubmission {
        /// Ticket id
        ticket: u64,
    },
    /// Host waited for a completion signal
    WaitSignal {
        /// Signal id
        signal: u64,
    },
    /// Frame submitted
    SubmitFrame {
        /// Ring slot
        slot: usize,
        /// Frame number
        frame_number: u64,
        /// Signal the device waits on before starting
        waited_on: Option<u64>,
        /// Signal raised on completion
        signal: u64,
    },
    /// Output image created
    CreateOutputImage {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
    /// Output image freed
    DestroyOutputImage {
        /// Resource id
        id: u64,
    },
    /// Host waited for the device to go idle
    WaitIdle,
}

#[derive(Debug)]
struct HostBuffer {
    label: String,
    usage: BufferUsage,
    data: Vec<u8>,
    address: DeviceAddress,
}

#[derive(Debug)]
struct HostStructure {
    level: StructureLevel,
    size: u64,
    address: DeviceAddress,
    built: Option<BuiltState>,
    /// Per-object structures referenced by a scene-wide structure
    references: Vec<u64>,
}

#[derive(Debug, Clone, Copy)]
struct BuiltState {
    flags: BuildFlags,
    primitive_count: u32,
}

#[derive(Debug)]
struct HostSubmission {
    compacted_sizes: Option<Vec<u64>>,
}

#[derive(Debug)]
struct InFlightFrame {
    signal: u64,
    sequence: u64,
    resources: HashSet<u64>,
}

/// Host-memory device backend that records every operation
#[derive(Debug)]
pub struct HeadlessBackend {
    next_id: u64,
    next_address: DeviceAddress,
    buffers: HashMap<u64, HostBuffer>,
    textures: HashMap<u64, (u32, u32)>,
    structures: HashMap<u64, HostStructure>,
    signals: HashSet<u64>,
    images: HashMap<u64, (u32, u32)>,
    submissions: HashMap<u64, HostSubmission>,
    in_flight: Vec<InFlightFrame>,
    frame_sequence: u64,
    ops: Vec<DeviceOp>,
    hazards: Vec<String>,
    failure: Option<(&'static str, usize)>,
}

impl HeadlessBackend {
    /// Create an empty headless backend
    pub fn new() -> Self {
        Self {
            next_id: 1,
            next_address: 0x1000_0000,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            structures: HashMap::new(),
            signals: HashSet::new(),
            images: HashMap::new(),
            submissions: HashMap::new(),
            in_flight: Vec::new(),
            frame_sequence: 0,
            ops: Vec::new(),
            hazards: Vec::new(),
            failure: None,
        }
    }

    /// All operations recorded so far
    pub fn ops(&self) -> &[DeviceOp] {
        &self.ops
    }

    /// Forget recorded operations (resources stay alive)
    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Count recorded operations matching a predicate
    pub fn count_ops(&self, predicate: impl Fn(&DeviceOp) -> bool) -> usize {
        self.ops.iter().filter(|op| predicate(op)).count()
    }

    /// Resource-in-use violations detected so far
    pub fn hazards(&self) -> &[String] {
        &self.hazards
    }

    /// Number of live structures at a level
    pub fn live_structures(&self, level: StructureLevel) -> usize {
        self.structures.values().filter(|s| s.level == level).count()
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live textures
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Number of frames submitted but not yet awaited
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Contents of a buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.data.as_slice())
    }

    /// Storage size of a structure
    pub fn structure_size(&self, structure: StructureHandle) -> Option<u64> {
        self.structures.get(&structure.0).map(|s| s.size)
    }

    /// Primitive count of the last build of a structure
    pub fn structure_primitive_count(&self, structure: StructureHandle) -> Option<u32> {
        self.structures
            .get(&structure.0)
            .and_then(|s| s.built)
            .map(|built| built.primitive_count)
    }

    /// Make the next device call named `operation` fail
    ///
    /// Names match the `operation` strings of [`DeviceError::OperationFailed`],
    /// e.g. `"create_buffer"` or `"build_structures"`.
    pub fn fail_next(&mut self, operation: &'static str) {
        self.fail_nth(operation, 0);
    }

    /// Let `skip` calls named `operation` succeed, then fail the next one
    pub fn fail_nth(&mut self, operation: &'static str, skip: usize) {
        self.failure = Some((operation, skip));
    }

    fn check_failure(&mut self, operation: &'static str) -> DeviceResult<()> {
        match self.failure {
            Some((name, 0)) if name == operation => {
                self.failure = None;
                Err(DeviceError::operation(operation, "injected failure"))
            }
            Some((name, skip)) if name == operation => {
                self.failure = Some((name, skip - 1));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn allocate_address(&mut self, size: u64) -> DeviceAddress {
        let address = self.next_address;
        let span = size.max(1).div_ceil(ADDRESS_ALIGNMENT) * ADDRESS_ALIGNMENT;
        self.next_address += span;
        address
    }

    fn check_not_in_flight(&mut self, id: u64, action: &str) {
        if self.in_flight.iter().any(|frame| frame.resources.contains(&id)) {
            let message = format!("{} resource {} while a frame referencing it is in flight", action, id);
            log::error!("[headless] {}", message);
            self.hazards.push(message);
        }
    }

    fn structure_by_address(&self, address: DeviceAddress) -> Option<u64> {
        self.structures
            .iter()
            .find(|(_, s)| s.address == address)
            .map(|(id, _)| *id)
    }

    fn buffer_by_address(&self, address: DeviceAddress) -> Option<u64> {
        self.buffers
            .iter()
            .find(|(_, b)| b.address == address)
            .map(|(id, _)| *id)
    }

    fn simulated_sizes(input: &BuildInput) -> BuildSizes {
        let count = u64::from(input.primitive_count());
        match input {
            BuildInput::Triangles(_) => BuildSizes {
                structure_size: STRUCTURE_BASE_SIZE + count * 64,
                build_scratch_size: 128 + count * 32,
                update_scratch_size: 64 + count * 16,
            },
            BuildInput::Instances(_) => BuildSizes {
                structure_size: STRUCTURE_BASE_SIZE + count * 128,
                build_scratch_size: 128 + count * 64,
                update_scratch_size: 64 + count * 32,
            },
        }
    }

    fn simulated_compacted_size(size: u64) -> u64 {
        let compacted = (size * 3 / 5).div_ceil(ADDRESS_ALIGNMENT) * ADDRESS_ALIGNMENT;
        compacted.clamp(STRUCTURE_BASE_SIZE.min(size), size)
    }

    /// Resolve the per-object structures referenced by an instance buffer
    fn instance_references(&self, input: &super::InstanceInput) -> DeviceResult<Vec<u64>> {
        let buffer_id = self.buffer_by_address(input.instance_address).ok_or_else(|| {
            DeviceError::operation("build_structures", format!(
                "instance address {:#x} does not match a live buffer",
                input.instance_address
            ))
        })?;
        let data = &self.buffers[&buffer_id].data;
        let record_size = std::mem::size_of::<EncodedInstance>();
        let needed = input.instance_count as usize * record_size;
        if data.len() < needed {
            return Err(DeviceError::operation("build_structures", format!(
                "instance buffer holds {} bytes, {} instances need {}",
                data.len(), input.instance_count, needed
            )));
        }

        let mut references = Vec::with_capacity(input.instance_count as usize);
        for (index, chunk) in data[..needed].chunks_exact(record_size).enumerate() {
            let record: EncodedInstance = bytemuck::pod_read_unaligned(chunk);
            let target = self
                .structure_by_address(record.structure_reference)
                .filter(|id| self.structures[id].level == StructureLevel::PerObject)
                .ok_or_else(|| DeviceError::operation("build_structures", format!(
                    "instance {} references unknown per-object index at {:#x}",
                    index, record.structure_reference
                )))?;
            if self.structures[&target].built.is_none() {
                return Err(DeviceError::operation("build_structures", format!(
                    "instance {} references per-object index {} before it was built",
                    index, target
                )));
            }
            references.push(target);
        }
        Ok(references)
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>, contents: Option<&[u8]>) -> DeviceResult<BufferHandle> {
        self.check_failure("create_buffer")?;
        if let Some(bytes) = contents {
            if bytes.len() as u64 > desc.size {
                return Err(DeviceError::operation("create_buffer", format!(
                    "{} bytes of contents exceed buffer '{}' of {} bytes",
                    bytes.len(), desc.label, desc.size
                )));
            }
        }

        let id = self.allocate_id();
        let address = self.allocate_address(desc.size);
        let mut data = vec![0u8; desc.size as usize];
        if let Some(bytes) = contents {
            data[..bytes.len()].copy_from_slice(bytes);
        }
        self.buffers.insert(id, HostBuffer {
            label: desc.label.to_string(),
            usage: desc.usage,
            data,
            address,
        });
        self.ops.push(DeviceOp::CreateBuffer { id, label: desc.label.to_string(), size: desc.size });
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> DeviceResult<()> {
        self.check_failure("write_buffer")?;
        self.check_not_in_flight(buffer.0, "Rewrote");
        let host = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(DeviceError::UnknownHandle { kind: "buffer", id: buffer.0 })?;
        if !host.usage.contains(BufferUsage::HOST_WRITE) {
            return Err(DeviceError::operation("write_buffer", format!(
                "buffer '{}' is not host-writable", host.label
            )));
        }
        let start = offset as usize;
        let end = start + bytes.len();
        if end > host.data.len() {
            return Err(DeviceError::operation("write_buffer", format!(
                "write of {} bytes at {} overflows buffer '{}' of {} bytes",
                bytes.len(), offset, host.label, host.data.len()
            )));
        }
        host.data[start..end].copy_from_slice(bytes);
        self.ops.push(DeviceOp::WriteBuffer { id: buffer.0, bytes: bytes.len() as u64 });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.check_not_in_flight(buffer.0, "Destroyed");
        if self.buffers.remove(&buffer.0).is_some() {
            self.ops.push(DeviceOp::DestroyBuffer { id: buffer.0 });
        } else {
            log::warn!("[headless] destroy of unknown buffer {}", buffer.0);
        }
    }

    fn buffer_address(&self, buffer: BufferHandle) -> DeviceResult<DeviceAddress> {
        self.buffers
            .get(&buffer.0)
            .map(|b| b.address)
            .ok_or(DeviceError::UnknownHandle { kind: "buffer", id: buffer.0 })
    }

    fn create_texture(&mut self, label: &str, image: &ImageData) -> DeviceResult<TextureHandle> {
        self.check_failure("create_texture")?;
        if image.data.len() != (image.width * image.height * 4) as usize {
            return Err(DeviceError::operation("create_texture", format!(
                "texture '{}' has {} bytes for {}x{} RGBA pixels",
                label, image.data.len(), image.width, image.height
            )));
        }
        let id = self.allocate_id();
        self.textures.insert(id, (image.width, image.height));
        self.ops.push(DeviceOp::CreateTexture { id, label: label.to_string() });
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.check_not_in_flight(texture.0, "Destroyed");
        if self.textures.remove(&texture.0).is_some() {
            self.ops.push(DeviceOp::DestroyTexture { id: texture.0 });
        }
    }

    fn structure_build_sizes(&self, input: &BuildInput, _flags: BuildFlags) -> DeviceResult<BuildSizes> {
        Ok(Self::simulated_sizes(input))
    }

    fn create_structure(&mut self, level: StructureLevel, size: u64, label: &str) -> DeviceResult<StructureHandle> {
        self.check_failure("create_structure")?;
        if size == 0 {
            return Err(DeviceError::operation("create_structure", format!("structure '{}' has zero size", label)));
        }
        let id = self.allocate_id();
        let address = self.allocate_address(size);
        self.structures.insert(id, HostStructure {
            level,
            size,
            address,
            built: None,
            references: Vec::new(),
        });
        self.ops.push(DeviceOp::CreateStructure { id, level, size });
        Ok(StructureHandle(id))
    }

    fn destroy_structure(&mut self, structure: StructureHandle) {
        self.check_not_in_flight(structure.0, "Destroyed");
        if let Some(removed) = self.structures.remove(&structure.0) {
            self.ops.push(DeviceOp::DestroyStructure { id: structure.0, level: removed.level });
        } else {
            log::warn!("[headless] destroy of unknown structure {}", structure.0);
        }
    }

    fn structure_address(&self, structure: StructureHandle) -> DeviceResult<DeviceAddress> {
        self.structures
            .get(&structure.0)
            .map(|s| s.address)
            .ok_or(DeviceError::UnknownHandle { kind: "structure", id: structure.0 })
    }

    fn build_structures(&mut self, builds: &[StructureBuild], query_compacted_sizes: bool) -> DeviceResult<SubmissionTicket> {
        self.check_failure("build_structures")?;

        let mut resolved = Vec::with_capacity(builds.len());
        for build in builds {
            let destination = self
                .structures
                .get(&build.destination.0)
                .ok_or(DeviceError::UnknownHandle { kind: "structure", id: build.destination.0 })?;
            if destination.level != build.input.level() {
                return Err(DeviceError::operation("build_structures", format!(
                    "structure {} is {:?} but the input is {:?}",
                    build.destination.0, destination.level, build.input.level()
                )));
            }
            let sizes = Self::simulated_sizes(&build.input);
            if destination.size < sizes.structure_size {
                return Err(DeviceError::operation("build_structures", format!(
                    "structure {} holds {} bytes, build needs {}",
                    build.destination.0, destination.size, sizes.structure_size
                )));
            }

            let scratch = self
                .buffers
                .get(&build.scratch.0)
                .ok_or(DeviceError::UnknownHandle { kind: "buffer", id: build.scratch.0 })?;
            let required_scratch = if build.source.is_some() {
                sizes.update_scratch_size
            } else {
                sizes.build_scratch_size
            };
            if (scratch.data.len() as u64) < required_scratch {
                return Err(DeviceError::operation("build_structures", format!(
                    "scratch buffer holds {} bytes, build needs {}",
                    scratch.data.len(), required_scratch
                )));
            }

            if let Some(source) = build.source {
                let previous = self
                    .structures
                    .get(&source.0)
                    .and_then(|s| s.built)
                    .ok_or_else(|| DeviceError::operation("build_structures", format!(
                        "update source {} was never built", source.0
                    )))?;
                if !previous.flags.contains(BuildFlags::ALLOW_UPDATE) {
                    return Err(DeviceError::operation("build_structures", format!(
                        "update source {} was not built with ALLOW_UPDATE", source.0
                    )));
                }
                if previous.primitive_count != build.input.primitive_count() {
                    return Err(DeviceError::operation("build_structures", format!(
                        "update changes primitive count from {} to {}",
                        previous.primitive_count, build.input.primitive_count()
                    )));
                }
            }

            let references = match &build.input {
                BuildInput::Instances(instances) => self.instance_references(instances)?,
                BuildInput::Triangles(_) => Vec::new(),
            };
            resolved.push((build.destination.0, references));
        }

        for build in builds {
            self.check_not_in_flight(build.destination.0, "Rebuilt");
        }

        let mut compacted = Vec::with_capacity(builds.len());
        for (build, (destination, references)) in builds.iter().zip(resolved) {
            if let Some(structure) = self.structures.get_mut(&destination) {
                structure.built = Some(BuiltState {
                    flags: build.flags,
                    primitive_count: build.input.primitive_count(),
                });
                structure.references = references;
                compacted.push(Self::simulated_compacted_size(structure.size));
            }
        }

        let ticket = self.allocate_id();
        self.submissions.insert(ticket, HostSubmission {
            compacted_sizes: query_compacted_sizes.then_some(compacted),
        });
        self.ops.push(DeviceOp::BuildStructures {
            per_object: builds.iter().filter(|b| b.input.level() == StructureLevel::PerObject).count(),
            scene: builds.iter().filter(|b| b.input.level() == StructureLevel::Scene).count(),
            updates: builds.iter().filter(|b| b.source.is_some()).count(),
            queried: query_compacted_sizes,
        });
        Ok(SubmissionTicket(ticket))
    }

    fn compacted_sizes(&mut self, ticket: SubmissionTicket) -> DeviceResult<Vec<u64>> {
        self.check_failure("compacted_sizes")?;
        self.submissions
            .get(&ticket.0)
            .ok_or(DeviceError::UnknownHandle { kind: "submission", id: ticket.0 })?
            .compacted_sizes
            .clone()
            .ok_or_else(|| DeviceError::operation("compacted_sizes", "submission did not query compacted sizes"))
    }

    fn compact_structures(&mut self, copies: &[CompactionCopy]) -> DeviceResult<SubmissionTicket> {
        self.check_failure("compact_structures")?;
        for copy in copies {
            let built = self
                .structures
                .get(&copy.source.0)
                .and_then(|s| s.built)
                .ok_or_else(|| DeviceError::operation("compact_structures", format!(
                    "compaction source {} was never built", copy.source.0
                )))?;
            if !built.flags.contains(BuildFlags::ALLOW_COMPACTION) {
                return Err(DeviceError::operation("compact_structures", format!(
                    "structure {} was not built with ALLOW_COMPACTION", copy.source.0
                )));
            }
            let destination = self
                .structures
                .get_mut(&copy.destination.0)
                .ok_or(DeviceError::UnknownHandle { kind: "structure", id: copy.destination.0 })?;
            destination.built = Some(built);
        }

        let ticket = self.allocate_id();
        self.submissions.insert(ticket, HostSubmission { compacted_sizes: None });
        self.ops.push(DeviceOp::CompactStructures { count: copies.len() });
        Ok(SubmissionTicket(ticket))
    }

    fn wait_submission(&mut self, ticket: SubmissionTicket) -> DeviceResult<()> {
        if !self.submissions.contains_key(&ticket.0) {
            return Err(DeviceError::UnknownHandle { kind: "submission", id: ticket.0 });
        }
        self.ops.push(DeviceOp::WaitSubmission { ticket: ticket.0 });
        Ok(())
    }

    fn create_signal(&mut self) -> DeviceResult<SignalHandle> {
        self.check_failure("create_signal")?;
        let id = self.allocate_id();
        self.signals.insert(id);
        Ok(SignalHandle(id))
    }

    fn destroy_signal(&mut self, signal: SignalHandle) {
        self.signals.remove(&signal.0);
    }

    fn wait_signal(&mut self, signal: SignalHandle) -> DeviceResult<()> {
        if !self.signals.contains(&signal.0) {
            return Err(DeviceError::UnknownHandle { kind: "signal", id: signal.0 });
        }
        // One queue: a frame retiring implies every earlier frame retired
        if let Some(sequence) = self
            .in_flight
            .iter()
            .filter(|frame| frame.signal == signal.0)
            .map(|frame| frame.sequence)
            .max()
        {
            self.in_flight.retain(|frame| frame.sequence > sequence);
        }
        self.ops.push(DeviceOp::WaitSignal { signal: signal.0 });
        Ok(())
    }

    fn signal_status(&self, signal: SignalHandle) -> DeviceResult<bool> {
        if !self.signals.contains(&signal.0) {
            return Err(DeviceError::UnknownHandle { kind: "signal", id: signal.0 });
        }
        Ok(!self.in_flight.iter().any(|frame| frame.signal == signal.0))
    }

    fn submit_frame(&mut self, submission: &FrameSubmission<'_>) -> DeviceResult<()> {
        self.check_failure("submit_frame")?;
        if !self.signals.contains(&submission.signal.0) {
            return Err(DeviceError::UnknownHandle { kind: "signal", id: submission.signal.0 });
        }
        if self.in_flight.iter().any(|frame| frame.signal == submission.signal.0) {
            return Err(DeviceError::operation("submit_frame", format!(
                "signal {} reused before the frame raising it was awaited",
                submission.signal.0
            )));
        }
        if !self.images.contains_key(&submission.output.0) {
            return Err(DeviceError::UnknownHandle { kind: "image", id: submission.output.0 });
        }

        let bindings = submission.bindings;
        let mut resources = HashSet::new();
        resources.insert(submission.output.0);
        resources.insert(submission.uniforms.0);
        if let Some(scene_index) = bindings.scene_index {
            resources.insert(scene_index.0);
            if let Some(structure) = self.structures.get(&scene_index.0) {
                resources.extend(structure.references.iter().copied());
            }
        }
        resources.extend(bindings.buffers().map(|b| b.0));
        resources.extend(bindings.textures.iter().map(|t| t.0));
        if let Some(environment) = bindings.environment {
            resources.insert(environment.0);
        }

        self.frame_sequence += 1;
        self.in_flight.push(InFlightFrame {
            signal: submission.signal.0,
            sequence: self.frame_sequence,
            resources,
        });
        self.ops.push(DeviceOp::SubmitFrame {
            slot: submission.slot,
            frame_number: submission.frame_number,
            waited_on: submission.wait_for.map(|s| s.0),
            signal: submission.signal.0,
        });
        Ok(())
    }

    fn create_output_image(&mut self, width: u32, height: u32) -> DeviceResult<ImageHandle> {
        self.check_failure("create_output_image")?;
        let id = self.allocate_id();
        self.images.insert(id, (width, height));
        self.ops.push(DeviceOp::CreateOutputImage { width, height });
        Ok(ImageHandle(id))
    }

    fn destroy_output_image(&mut self, image: ImageHandle) {
        self.check_not_in_flight(image.0, "Destroyed");
        if self.images.remove(&image.0).is_some() {
            self.ops.push(DeviceOp::DestroyOutputImage { id: image.0 });
        }
    }

    fn wait_idle(&mut self) -> DeviceResult<()> {
        self.in_flight.clear();
        self.ops.push(DeviceOp::WaitIdle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::scene_index::InstanceFlags;
    use crate::device::{InstanceInput, TriangleInput};
    use crate::scene::bindings::SceneBindings;

    fn triangle_input(backend: &mut HeadlessBackend, triangles: u32) -> BuildInput {
        let vertices = backend
            .create_buffer(&BufferDesc::new("vertices", 1024, BufferUsage::BUILD_INPUT), None)
            .unwrap();
        let indices = backend
            .create_buffer(&BufferDesc::new("indices", 1024, BufferUsage::BUILD_INPUT), None)
            .unwrap();
        BuildInput::Triangles(TriangleInput {
            vertex_address: backend.buffer_address(vertices).unwrap(),
            vertex_stride: 32,
            max_vertex: 2,
            index_address: backend.buffer_address(indices).unwrap(),
            triangle_count: triangles,
            opaque: true,
        })
    }

    fn build_one(backend: &mut HeadlessBackend, input: BuildInput, flags: BuildFlags) -> StructureHandle {
        let sizes = backend.structure_build_sizes(&input, flags).unwrap();
        let structure = backend
            .create_structure(input.level(), sizes.structure_size, "test")
            .unwrap();
        let scratch = backend
            .create_buffer(&BufferDesc::new("scratch", sizes.build_scratch_size, BufferUsage::SCRATCH), None)
            .unwrap();
        let ticket = backend
            .build_structures(&[StructureBuild { input, flags, destination: structure, source: None, scratch }], false)
            .unwrap();
        backend.wait_submission(ticket).unwrap();
        structure
    }

    #[test]
    fn test_addresses_are_unique_and_aligned() {
        let mut backend = HeadlessBackend::new();
        let a = backend.create_buffer(&BufferDesc::new("a", 10, BufferUsage::STORAGE), None).unwrap();
        let b = backend.create_buffer(&BufferDesc::new("b", 300, BufferUsage::STORAGE), None).unwrap();
        let addr_a = backend.buffer_address(a).unwrap();
        let addr_b = backend.buffer_address(b).unwrap();

        assert_ne!(addr_a, addr_b);
        assert_eq!(addr_a % ADDRESS_ALIGNMENT, 0);
        assert_eq!(addr_b % ADDRESS_ALIGNMENT, 0);
    }

    #[test]
    fn test_update_requires_same_primitive_count() {
        let mut backend = HeadlessBackend::new();
        let input = triangle_input(&mut backend, 4);
        let structure = build_one(&mut backend, input, BuildFlags::ALLOW_UPDATE);

        let changed = triangle_input(&mut backend, 5);
        let scratch = backend
            .create_buffer(&BufferDesc::new("scratch", 4096, BufferUsage::SCRATCH), None)
            .unwrap();
        let result = backend.build_structures(&[StructureBuild {
            input: changed,
            flags: BuildFlags::ALLOW_UPDATE,
            destination: structure,
            source: Some(structure),
            scratch,
        }], false);

        assert!(result.is_err());
    }

    #[test]
    fn test_scene_build_rejects_unknown_per_object_reference() {
        let mut backend = HeadlessBackend::new();
        let record = EncodedInstance::new([0.0; 12], 0, 0xFF, InstanceFlags::empty(), 0xDEAD_0000);
        let instances = backend
            .create_buffer(
                &BufferDesc::new("instances", 64, BufferUsage::BUILD_INPUT),
                Some(bytemuck::bytes_of(&record)),
            )
            .unwrap();
        let input = BuildInput::Instances(InstanceInput {
            instance_address: backend.buffer_address(instances).unwrap(),
            instance_count: 1,
        });
        let sizes = backend.structure_build_sizes(&input, BuildFlags::empty()).unwrap();
        let scene = backend.create_structure(StructureLevel::Scene, sizes.structure_size, "scene").unwrap();
        let scratch = backend
            .create_buffer(&BufferDesc::new("scratch", sizes.build_scratch_size, BufferUsage::SCRATCH), None)
            .unwrap();

        let result = backend.build_structures(&[StructureBuild {
            input,
            flags: BuildFlags::empty(),
            destination: scene,
            source: None,
            scratch,
        }], false);
        assert!(result.is_err());
    }

    #[test]
    fn test_destroying_in_flight_resource_is_a_hazard() {
        let mut backend = HeadlessBackend::new();
        let signal = backend.create_signal().unwrap();
        let output = backend.create_output_image(4, 4).unwrap();
        let uniforms = backend
            .create_buffer(&BufferDesc::new("uniforms", 64, BufferUsage::UNIFORM | BufferUsage::HOST_WRITE), None)
            .unwrap();
        let bindings = SceneBindings::default();

        backend.submit_frame(&FrameSubmission {
            slot: 0,
            frame_number: 0,
            wait_for: None,
            signal,
            output,
            extent: (4, 4),
            uniforms,
            bindings: &bindings,
        }).unwrap();

        backend.write_buffer(uniforms, 0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.hazards().len(), 1);

        assert!(!backend.signal_status(signal).unwrap());
        backend.wait_signal(signal).unwrap();
        assert!(backend.signal_status(signal).unwrap());
        backend.write_buffer(uniforms, 0, &[5, 6, 7, 8]).unwrap();
        assert_eq!(backend.hazards().len(), 1);
        assert_eq!(backend.frames_in_flight(), 0);
    }

    #[test]
    fn test_compacted_sizes_never_exceed_original() {
        for size in [256u64, 320, 1000, 64_000] {
            let compacted = HeadlessBackend::simulated_compacted_size(size);
            assert!(compacted <= size);
            assert!(compacted > 0);
        }
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let mut backend = HeadlessBackend::new();
        backend.fail_next("create_buffer");
        assert!(backend.create_buffer(&BufferDesc::new("x", 4, BufferUsage::STORAGE), None).is_err());
        assert!(backend.create_buffer(&BufferDesc::new("x", 4, BufferUsage::STORAGE), None).is_ok());
    }

    #[test]
    fn test_injected_failure_can_skip_calls() {
        let mut backend = HeadlessBackend::new();
        backend.fail_nth("create_buffer", 1);
        assert!(backend.create_buffer(&BufferDesc::new("x", 4, BufferUsage::STORAGE), None).is_ok());
        assert!(backend.create_buffer(&BufferDesc::new("x", 4, BufferUsage::STORAGE), None).is_err());
        assert!(backend.create_buffer(&BufferDesc::new("x", 4, BufferUsage::STORAGE), None).is_ok());
    }
}
