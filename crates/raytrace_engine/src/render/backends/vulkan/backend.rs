//! [`DeviceBackend`] implementation over Vulkan
//!
//! Every handle handed out is a key into one of the backend's resource maps.
//! Structure builds and compaction copies run as one-time submissions guarded
//! by a fence; frames use a command buffer, fence and semaphore per signal.

use std::collections::HashMap;

use ash::{vk, Device};

use super::acceleration::{self, CompactionQuery, Structure};
use super::buffer::Buffer;
use super::commands::{structure_write_barrier, CommandPool};
use super::context::{VulkanContext, VulkanError, VulkanResult};
use super::sync::{CompletionSignal, Fence};
use super::texture::{StorageImage, Texture};
use crate::core::config::RendererConfig;
use crate::device::{
    BufferDesc, BufferHandle, BufferUsage, BuildFlags, BuildInput, BuildSizes, CompactionCopy, DeviceAddress,
    DeviceBackend, DeviceError, DeviceResult, FrameSubmission, ImageHandle, SignalHandle, StructureBuild,
    StructureHandle, StructureLevel, SubmissionTicket, TextureHandle,
};
use crate::scene::{ImageData, SceneBindings};

/// Fence timeout for frame and build waits
const FENCE_TIMEOUT_NS: u64 = 5_000_000_000;

/// Resolved Vulkan handles of one frame, passed to the [`TraceRecorder`]
pub struct TraceFrame<'a> {
    /// Monotonic frame number
    pub frame_number: u64,
    /// Ring slot
    pub slot: usize,
    /// Storage image in `GENERAL` layout
    pub output_image: vk::Image,
    /// View of the storage image
    pub output_view: vk::ImageView,
    /// Output extent
    pub extent: vk::Extent2D,
    /// Per-slot frame uniforms
    pub uniforms: vk::Buffer,
    /// Scene-wide index, absent before the first resolution
    pub scene_index: Option<vk::AccelerationStructureKHR>,
    /// Geometry record buffer
    pub geometry_records: Option<vk::Buffer>,
    /// Material buffer
    pub materials: Option<vk::Buffer>,
    /// Material textures in index order
    pub textures: Vec<(vk::ImageView, vk::Sampler)>,
    /// Environment texture
    pub environment: Option<(vk::ImageView, vk::Sampler)>,
    /// Backend-neutral snapshot the handles were resolved from
    pub bindings: &'a SceneBindings,
}

/// Records the trace dispatch of a frame
///
/// The recorder owns the ray tracing pipeline, its descriptor sets and shader
/// binding table. It records into a command buffer already in the recording
/// state; the backend submits it.
pub trait TraceRecorder {
    /// Record the trace commands for `frame`
    fn record(&mut self, device: &Device, command_buffer: vk::CommandBuffer, frame: &TraceFrame<'_>) -> VulkanResult<()>;

    /// Called after the output image was (re)created
    fn output_recreated(&mut self, _view: vk::ImageView, _extent: vk::Extent2D) {}
}

/// Recorder that clears the output to a constant color
///
/// Used when no trace pipeline is installed.
#[derive(Debug, Clone, Copy)]
pub struct ClearRecorder {
    /// Clear color in linear RGBA
    pub color: [f32; 4],
}

impl Default for ClearRecorder {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl TraceRecorder for ClearRecorder {
    fn record(&mut self, device: &Device, command_buffer: vk::CommandBuffer, frame: &TraceFrame<'_>) -> VulkanResult<()> {
        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe {
            device.cmd_clear_color_image(
                command_buffer,
                frame.output_image,
                vk::ImageLayout::GENERAL,
                &vk::ClearColorValue { float32: self.color },
                &[range],
            );
        }
        Ok(())
    }
}

/// One-time structure submission
struct StructureSubmission {
    command_buffer: vk::CommandBuffer,
    /// Present until the submission was awaited
    fence: Option<Fence>,
    /// Compacted-size queries, present until read
    query: Option<CompactionQuery>,
}

fn unknown(kind: &'static str, id: u64) -> DeviceError {
    DeviceError::UnknownHandle { kind, id }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

/// Production backend over `VK_KHR_acceleration_structure`
pub struct VulkanBackend {
    recorder: Box<dyn TraceRecorder>,
    buffers: HashMap<u64, Buffer>,
    textures: HashMap<u64, Texture>,
    structures: HashMap<u64, Structure>,
    signals: HashMap<u64, CompletionSignal>,
    images: HashMap<u64, StorageImage>,
    submissions: HashMap<u64, StructureSubmission>,
    next_id: u64,
    pool: CommandPool,
    // Dropped last
    context: VulkanContext,
}

impl VulkanBackend {
    /// Create a backend that clears the output instead of tracing
    pub fn new(config: &RendererConfig) -> DeviceResult<Self> {
        Self::with_recorder(config, Box::new(ClearRecorder::default()))
    }

    /// Create a backend with a trace recorder
    pub fn with_recorder(config: &RendererConfig, recorder: Box<dyn TraceRecorder>) -> DeviceResult<Self> {
        let context = VulkanContext::new(
            &config.application_name,
            config.application_version,
            config.validation_enabled(),
        )
        .map_err(|e| e.during("create_context"))?;
        let pool = CommandPool::new(context.raw_device().clone(), context.queue_family())
            .map_err(|e| e.during("create_command_pool"))?;

        log::info!(
            "Vulkan backend ready (scratch alignment {} bytes)",
            context.scratch_alignment()
        );

        Ok(Self {
            recorder,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            structures: HashMap::new(),
            signals: HashMap::new(),
            images: HashMap::new(),
            submissions: HashMap::new(),
            next_id: 1,
            pool,
            context,
        })
    }

    /// Replace the trace recorder
    pub fn set_recorder(&mut self, recorder: Box<dyn TraceRecorder>) {
        self.recorder = recorder;
        for image in self.images.values() {
            self.recorder.output_recreated(image.view(), image.extent());
        }
    }

    /// The underlying context
    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn structure(&self, handle: StructureHandle) -> DeviceResult<&Structure> {
        self.structures.get(&handle.0).ok_or_else(|| unknown("structure", handle.0))
    }

    fn buffer(&self, handle: BufferHandle) -> DeviceResult<&Buffer> {
        self.buffers.get(&handle.0).ok_or_else(|| unknown("buffer", handle.0))
    }

    fn texture_binding(&self, handle: TextureHandle) -> DeviceResult<(vk::ImageView, vk::Sampler)> {
        self.textures
            .get(&handle.0)
            .map(|texture| (texture.view(), texture.sampler()))
            .ok_or_else(|| unknown("texture", handle.0))
    }

    fn allocate_command_buffer(&self) -> VulkanResult<vk::CommandBuffer> {
        self.pool
            .allocate_command_buffers(1)?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "Command pool returned no buffer".to_string(),
            })
    }

    /// Record and submit a structure batch guarded by a fence
    fn submit_batch<F>(&self, record: F) -> VulkanResult<(vk::CommandBuffer, Fence)>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let device = self.context.raw_device();
        let command_buffer = self.allocate_command_buffer()?;

        let submitted: VulkanResult<Fence> = (|| {
            let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe {
                device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(VulkanError::Api)?;
            }
            record(device, command_buffer);
            unsafe { device.end_command_buffer(command_buffer).map_err(VulkanError::Api)? };

            let fence = Fence::new(device.clone(), false)?;
            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
            unsafe {
                device
                    .queue_submit(self.context.queue(), &[submit_info], fence.handle())
                    .map_err(VulkanError::Api)?;
            }
            Ok(fence)
        })();

        match submitted {
            Ok(fence) => Ok((command_buffer, fence)),
            Err(e) => {
                self.pool.free_command_buffers(&[command_buffer]);
                Err(e)
            }
        }
    }

    fn track_submission(&mut self, command_buffer: vk::CommandBuffer, fence: Fence, query: Option<CompactionQuery>) -> SubmissionTicket {
        let id = self.allocate_id();
        self.submissions.insert(
            id,
            StructureSubmission {
                command_buffer,
                fence: Some(fence),
                query,
            },
        );
        SubmissionTicket(id)
    }

    /// Wait for a structure submission and free its command buffer
    fn finish_submission(&mut self, id: u64) -> DeviceResult<()> {
        let submission = self.submissions.get_mut(&id).ok_or_else(|| unknown("submission", id))?;
        if let Some(fence) = submission.fence.take() {
            fence.wait(FENCE_TIMEOUT_NS).map_err(|e| e.during("wait_submission"))?;
            self.pool.free_command_buffers(&[submission.command_buffer]);
        }
        if submission.query.is_none() {
            self.submissions.remove(&id);
        }
        Ok(())
    }

    /// Resolve scene bindings into Vulkan handles
    fn resolve_frame<'a>(&self, submission: &FrameSubmission<'a>) -> DeviceResult<TraceFrame<'a>> {
        let output = self
            .images
            .get(&submission.output.0)
            .ok_or_else(|| unknown("image", submission.output.0))?;
        let bindings = submission.bindings;

        let scene_index = bindings
            .scene_index
            .map(|handle| self.structure(handle).map(Structure::handle))
            .transpose()?;
        let geometry_records = bindings
            .geometry_records
            .map(|handle| self.buffer(handle).map(Buffer::handle))
            .transpose()?;
        let materials = bindings
            .materials
            .map(|handle| self.buffer(handle).map(Buffer::handle))
            .transpose()?;
        let textures = bindings
            .textures
            .iter()
            .map(|&texture| self.texture_binding(texture))
            .collect::<DeviceResult<Vec<_>>>()?;
        let environment = bindings.environment.map(|texture| self.texture_binding(texture)).transpose()?;

        Ok(TraceFrame {
            frame_number: submission.frame_number,
            slot: submission.slot,
            output_image: output.image(),
            output_view: output.view(),
            extent: vk::Extent2D {
                width: submission.extent.0.min(output.extent().width),
                height: submission.extent.1.min(output.extent().height),
            },
            uniforms: self.buffer(submission.uniforms)?.handle(),
            scene_index,
            geometry_records,
            materials,
            textures,
            environment,
            bindings,
        })
    }
}

impl DeviceBackend for VulkanBackend {
    fn name(&self) -> &str {
        "vulkan"
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>, contents: Option<&[u8]>) -> DeviceResult<BufferHandle> {
        // Scratch addresses are aligned up at build time
        let size = if desc.usage.contains(BufferUsage::SCRATCH) {
            desc.size + self.context.scratch_alignment()
        } else {
            desc.size
        };
        let buffer = Buffer::new(&self.context, size, desc.usage).map_err(|e| match e {
            VulkanError::OutOfMemory { requested } => DeviceError::OutOfMemory {
                label: desc.label.to_string(),
                requested,
            },
            other => other.during("create_buffer"),
        })?;
        if let Some(bytes) = contents {
            buffer.write_data(0, bytes).map_err(|e| e.during("write_buffer"))?;
        }

        let id = self.allocate_id();
        log::trace!("Created buffer {} '{}' ({} bytes)", id, desc.label, size);
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, bytes: &[u8]) -> DeviceResult<()> {
        self.buffer(buffer)?
            .write_data(offset, bytes)
            .map_err(|e| e.during("write_buffer"))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            log::warn!("Destroying unknown buffer {}", buffer.0);
        }
    }

    fn buffer_address(&self, buffer: BufferHandle) -> DeviceResult<DeviceAddress> {
        Ok(self.buffer(buffer)?.address())
    }

    fn create_texture(&mut self, label: &str, image: &ImageData) -> DeviceResult<TextureHandle> {
        let texture = Texture::from_image_data(&self.context, &self.pool, image).map_err(|e| e.during("create_texture"))?;
        let id = self.allocate_id();
        log::debug!("Uploaded texture {} '{}' ({}x{})", id, label, image.width, image.height);
        self.textures.insert(id, texture);
        Ok(TextureHandle(id))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_none() {
            log::warn!("Destroying unknown texture {}", texture.0);
        }
    }

    fn structure_build_sizes(&self, input: &BuildInput, flags: BuildFlags) -> DeviceResult<BuildSizes> {
        let sizes = acceleration::build_sizes(self.context.acceleration(), input, flags);
        Ok(BuildSizes {
            structure_size: sizes.acceleration_structure_size,
            build_scratch_size: sizes.build_scratch_size,
            update_scratch_size: sizes.update_scratch_size,
        })
    }

    fn create_structure(&mut self, level: StructureLevel, size: u64, label: &str) -> DeviceResult<StructureHandle> {
        let structure = Structure::new(&self.context, level, size).map_err(|e| e.during("create_structure"))?;
        let id = self.allocate_id();
        log::trace!("Created {:?} structure {} '{}' ({} bytes)", level, id, label, size);
        self.structures.insert(id, structure);
        Ok(StructureHandle(id))
    }

    fn destroy_structure(&mut self, structure: StructureHandle) {
        if self.structures.remove(&structure.0).is_none() {
            log::warn!("Destroying unknown structure {}", structure.0);
        }
    }

    fn structure_address(&self, structure: StructureHandle) -> DeviceResult<DeviceAddress> {
        Ok(self.structure(structure)?.address())
    }

    fn build_structures(&mut self, builds: &[StructureBuild], query_compacted_sizes: bool) -> DeviceResult<SubmissionTicket> {
        let alignment = self.context.scratch_alignment();

        let mut geometries = Vec::with_capacity(builds.len());
        let mut ranges = Vec::with_capacity(builds.len());
        let mut targets = Vec::with_capacity(builds.len());
        for build in builds {
            let destination = self.structure(build.destination)?;
            if destination.level() != build.input.level() {
                return Err(DeviceError::operation(
                    "build_structures",
                    format!("structure {} has level {:?}", build.destination.0, destination.level()),
                ));
            }
            let source = build.source.map(|source| self.structure(source).map(Structure::handle)).transpose()?;
            let scratch = align_up(self.buffer(build.scratch)?.address(), alignment);
            let (geometry, range) = acceleration::geometry(&build.input);
            geometries.push([geometry]);
            ranges.push([range]);
            targets.push((destination.handle(), source, scratch));
        }

        let infos: Vec<vk::AccelerationStructureBuildGeometryInfoKHR> = builds
            .iter()
            .zip(&geometries)
            .zip(&targets)
            .map(|((build, geometry), &(destination, source, scratch))| {
                let mode = if source.is_some() {
                    vk::BuildAccelerationStructureModeKHR::UPDATE
                } else {
                    vk::BuildAccelerationStructureModeKHR::BUILD
                };
                vk::AccelerationStructureBuildGeometryInfoKHR::builder()
                    .ty(acceleration::structure_type(build.input.level()))
                    .flags(acceleration::build_flags(build.flags))
                    .mode(mode)
                    .src_acceleration_structure(source.unwrap_or_else(vk::AccelerationStructureKHR::null))
                    .dst_acceleration_structure(destination)
                    .geometries(geometry)
                    .scratch_data(vk::DeviceOrHostAddressKHR { device_address: scratch })
                    .build()
            })
            .collect();

        // Per-object structures must be complete before scene structures read them
        let phase = |level: StructureLevel| -> (Vec<vk::AccelerationStructureBuildGeometryInfoKHR>, Vec<&[vk::AccelerationStructureBuildRangeInfoKHR]>) {
            builds
                .iter()
                .enumerate()
                .filter(|(_, build)| build.input.level() == level)
                .map(|(i, _)| (infos[i], &ranges[i][..]))
                .unzip()
        };
        let phases = [phase(StructureLevel::PerObject), phase(StructureLevel::Scene)];

        let query = if query_compacted_sizes {
            // Unread queries of earlier batches are superseded
            self.submissions.retain(|_, submission| submission.fence.is_some());
            Some(
                CompactionQuery::new(self.context.raw_device().clone(), builds.len() as u32)
                    .map_err(|e| e.during("build_structures"))?,
            )
        } else {
            None
        };
        let destinations: Vec<_> = targets.iter().map(|(destination, _, _)| *destination).collect();

        let loader = self.context.acceleration();
        let (command_buffer, fence) = self
            .submit_batch(|device, command_buffer| {
                for (phase_infos, phase_ranges) in &phases {
                    if phase_infos.is_empty() {
                        continue;
                    }
                    unsafe { loader.cmd_build_acceleration_structures(command_buffer, phase_infos, phase_ranges) };
                    structure_write_barrier(device, command_buffer);
                }
                if let Some(query) = &query {
                    query.record(loader, command_buffer, &destinations);
                }
            })
            .map_err(|e| e.during("build_structures"))?;

        log::trace!(
            "Submitted {} structure builds{}",
            builds.len(),
            if query_compacted_sizes { " with compaction queries" } else { "" }
        );
        Ok(self.track_submission(command_buffer, fence, query))
    }

    fn compacted_sizes(&mut self, ticket: SubmissionTicket) -> DeviceResult<Vec<u64>> {
        self.finish_submission(ticket.0)?;
        let query = self
            .submissions
            .remove(&ticket.0)
            .and_then(|submission| submission.query)
            .ok_or_else(|| DeviceError::operation("compacted_sizes", "submission did not query compacted sizes"))?;
        query.results().map_err(|e| e.during("compacted_sizes"))
    }

    fn compact_structures(&mut self, copies: &[CompactionCopy]) -> DeviceResult<SubmissionTicket> {
        let infos = copies
            .iter()
            .map(|copy| {
                Ok(vk::CopyAccelerationStructureInfoKHR::builder()
                    .src(self.structure(copy.source)?.handle())
                    .dst(self.structure(copy.destination)?.handle())
                    .mode(vk::CopyAccelerationStructureModeKHR::COMPACT)
                    .build())
            })
            .collect::<DeviceResult<Vec<_>>>()?;

        let loader = self.context.acceleration();
        let (command_buffer, fence) = self
            .submit_batch(|device, command_buffer| {
                for info in &infos {
                    unsafe { loader.cmd_copy_acceleration_structure(command_buffer, info) };
                }
                structure_write_barrier(device, command_buffer);
            })
            .map_err(|e| e.during("compact_structures"))?;

        Ok(self.track_submission(command_buffer, fence, None))
    }

    fn wait_submission(&mut self, ticket: SubmissionTicket) -> DeviceResult<()> {
        self.finish_submission(ticket.0)
    }

    fn create_signal(&mut self) -> DeviceResult<SignalHandle> {
        let command_buffer = self.allocate_command_buffer().map_err(|e| e.during("create_signal"))?;
        let signal = match CompletionSignal::new(self.context.raw_device(), command_buffer) {
            Ok(signal) => signal,
            Err(e) => {
                self.pool.free_command_buffers(&[command_buffer]);
                return Err(e.during("create_signal"));
            }
        };
        let id = self.allocate_id();
        self.signals.insert(id, signal);
        Ok(SignalHandle(id))
    }

    fn destroy_signal(&mut self, signal: SignalHandle) {
        if let Some(removed) = self.signals.remove(&signal.0) {
            self.pool.free_command_buffers(&[removed.command_buffer]);
        }
    }

    fn wait_signal(&mut self, signal: SignalHandle) -> DeviceResult<()> {
        self.signals
            .get_mut(&signal.0)
            .ok_or_else(|| unknown("signal", signal.0))?
            .wait(FENCE_TIMEOUT_NS)
            .map_err(|e| e.during("wait_signal"))
    }

    fn signal_status(&self, signal: SignalHandle) -> DeviceResult<bool> {
        let completion = self.signals.get(&signal.0).ok_or_else(|| unknown("signal", signal.0))?;
        if !completion.pending {
            return Ok(true);
        }
        unsafe {
            self.context
                .raw_device()
                .get_fence_status(completion.fence.handle())
                .map_err(|e| VulkanError::Api(e).during("signal_status"))
        }
    }

    fn submit_frame(&mut self, submission: &FrameSubmission<'_>) -> DeviceResult<()> {
        let frame = self.resolve_frame(submission)?;
        let signal = self
            .signals
            .get(&submission.signal.0)
            .ok_or_else(|| unknown("signal", submission.signal.0))?;
        if signal.pending {
            return Err(DeviceError::operation(
                "submit_frame",
                format!("signal {} reused before the frame raising it was awaited", submission.signal.0),
            ));
        }
        let wait_semaphores = match submission.wait_for {
            Some(previous) => vec![self
                .signals
                .get(&previous.0)
                .ok_or_else(|| unknown("signal", previous.0))?
                .semaphore
                .handle()],
            None => Vec::new(),
        };

        let device = self.context.raw_device();
        let command_buffer = signal.command_buffer;
        unsafe {
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .and_then(|_| {
                    let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
                    device.begin_command_buffer(command_buffer, &begin_info)
                })
                .map_err(|e| VulkanError::Api(e).during("submit_frame"))?;
        }
        self.recorder
            .record(device, command_buffer, &frame)
            .map_err(|e| e.during("record_trace"))?;
        unsafe {
            device
                .end_command_buffer(command_buffer)
                .map_err(|e| VulkanError::Api(e).during("submit_frame"))?;
        }

        let wait_stages = vec![vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR | vk::PipelineStageFlags::TRANSFER; wait_semaphores.len()];
        let command_buffers = [command_buffer];
        let signal_semaphores = [signal.semaphore.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe {
            device
                .queue_submit(self.context.queue(), &[submit_info], signal.fence.handle())
                .map_err(|e| VulkanError::Api(e).during("submit_frame"))?;
        }

        if let Some(signal) = self.signals.get_mut(&submission.signal.0) {
            signal.pending = true;
        }
        log::trace!("Submitted frame {} from slot {}", submission.frame_number, submission.slot);
        Ok(())
    }

    fn create_output_image(&mut self, width: u32, height: u32) -> DeviceResult<ImageHandle> {
        let image = StorageImage::new(&self.context, &self.pool, width, height).map_err(|e| e.during("create_output_image"))?;
        self.recorder.output_recreated(image.view(), image.extent());
        let id = self.allocate_id();
        log::debug!("Created output image {} ({}x{})", id, width, height);
        self.images.insert(id, image);
        Ok(ImageHandle(id))
    }

    fn destroy_output_image(&mut self, image: ImageHandle) {
        if self.images.remove(&image.0).is_none() {
            log::warn!("Destroying unknown output image {}", image.0);
        }
    }

    fn wait_idle(&mut self) -> DeviceResult<()> {
        self.context.wait_idle().map_err(|e| e.during("wait_idle"))?;
        for signal in self.signals.values_mut() {
            signal.wait(0).map_err(|e| e.during("wait_idle"))?;
        }
        let completed: Vec<u64> = self.submissions.keys().copied().collect();
        for id in completed {
            self.finish_submission(id)?;
        }
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during cleanup: {}", e);
        }
        self.submissions.clear();
        self.images.clear();
        self.signals.clear();
        self.structures.clear();
        self.textures.clear();
        self.buffers.clear();
        log::debug!("Vulkan backend destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 128), 0);
        assert_eq!(align_up(1, 128), 128);
        assert_eq!(align_up(256, 128), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn test_clear_recorder_defaults_to_opaque_black() {
        assert_eq!(ClearRecorder::default().color, [0.0, 0.0, 0.0, 1.0]);
    }
}
