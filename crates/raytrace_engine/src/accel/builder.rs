//! # Spatial Index Builder
//!
//! Maintains one per-object index per geometry slot and the singleton
//! scene-wide index over all instances.
//!
//! ## Per-object rebuilds
//!
//! A rebuild runs as two explicit stages so that every structure's build is
//! batched before any compaction starts:
//!
//! 1. [`submit_per_object_builds`](SpatialIndexBuilder::submit_per_object_builds)
//!    records all builds into one submission, with a compacted-size query when
//!    compaction is enabled. Each slot is left `AwaitingCompactedSize`.
//! 2. [`complete_per_object_builds`](SpatialIndexBuilder::complete_per_object_builds)
//!    waits for that submission, reads the sizes, copies every structure into
//!    one of exactly that size in a second submission and frees the originals.
//!
//! ## Scene-wide builds
//!
//! The scene-wide index is refit in place whenever it was built against the
//! current per-object generation over the same slot count; otherwise it is
//! rebuilt from a fresh size query. Instance records are padded to a fixed
//! capacity with inactive entries (mask 0), so the primitive count seen by the
//! device never changes between refits and instances can come and go freely.

use super::per_object::{PerObjectDescriptor, PerObjectSlot, SlotState};
use super::scene_index::{EncodedInstance, SceneBuildMode, SceneInstance};
use crate::device::{
    BufferDesc, BufferHandle, BufferUsage, BuildFlags, BuildInput, CompactionCopy, DeviceAddress,
    DeviceBackend, DeviceError, DeviceResult, InstanceInput, StructureBuild, StructureHandle,
    StructureLevel, SubmissionTicket,
};

/// Builder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderStats {
    /// Per-object structures built since creation
    pub per_object_built: u64,
    /// Full per-object rebuilds since creation
    pub per_object_rebuilds: u64,
    /// Bytes saved by compaction since creation
    pub compacted_bytes_saved: u64,
    /// Scene-wide full builds
    pub scene_full_builds: u64,
    /// Scene-wide refits
    pub scene_refits: u64,
    /// Mode of the most recent scene-wide build
    pub last_scene_mode: Option<SceneBuildMode>,
}

/// Stage-one result of a per-object rebuild
#[derive(Debug)]
#[must_use = "per-object builds must be completed"]
pub struct PendingPerObjectBuild {
    ticket: SubmissionTicket,
    scratch: Vec<BufferHandle>,
    compaction: bool,
}

#[derive(Debug, Clone, Copy)]
struct SceneIndexState {
    structure: StructureHandle,
    address: DeviceAddress,
    scratch: BufferHandle,
    flags: BuildFlags,
    capacity: u32,
    generation: u64,
    slot_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct InstanceStorage {
    buffer: BufferHandle,
    capacity: u64,
}

/// Owner of every per-object and scene-wide index
#[derive(Debug)]
pub struct SpatialIndexBuilder {
    slots: Vec<PerObjectSlot>,
    generation: u64,
    compaction: bool,
    instance_capacity: usize,
    scene: Option<SceneIndexState>,
    instances: Option<InstanceStorage>,
    stats: BuilderStats,
}

impl SpatialIndexBuilder {
    /// Create an empty builder
    ///
    /// `instance_capacity` is the padded length of the instance array; a
    /// larger instance list grows it on the next full build.
    pub fn new(compaction: bool, instance_capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            generation: 0,
            compaction,
            instance_capacity: instance_capacity.max(1),
            scene: None,
            instances: None,
            stats: BuilderStats::default(),
        }
    }

    /// Occupied per-object slots in `geometry_index` order
    pub fn slots(&self) -> &[PerObjectSlot] {
        &self.slots
    }

    /// Number of per-object indices
    pub fn per_object_count(&self) -> usize {
        self.slots.len()
    }

    /// Generation of the per-object set, bumped on every rebuild
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Counters
    pub fn stats(&self) -> BuilderStats {
        self.stats
    }

    /// Current scene-wide index and its device address
    pub fn scene_index(&self) -> Option<(StructureHandle, DeviceAddress)> {
        self.scene.map(|s| (s.structure, s.address))
    }

    /// Rebuild every per-object index from `descriptors`
    ///
    /// `descriptors[i]` must describe slot `i`. Prior structures are freed
    /// first; the caller has already waited for any frame reading them.
    pub fn rebuild_all_per_object_indices<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
        descriptors: &[PerObjectDescriptor],
    ) -> DeviceResult<()> {
        self.destroy_per_object(backend);
        self.generation += 1;
        self.stats.per_object_rebuilds += 1;

        if descriptors.is_empty() {
            log::debug!("Per-object set is empty after rebuild");
            return Ok(());
        }

        let pending = self.submit_per_object_builds(backend, descriptors)?;
        self.complete_per_object_builds(backend, pending)
    }

    /// Stage one: create and batch-build every per-object structure
    pub fn submit_per_object_builds<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
        descriptors: &[PerObjectDescriptor],
    ) -> DeviceResult<PendingPerObjectBuild> {
        let mut flags = BuildFlags::PREFER_FAST_TRACE;
        if self.compaction {
            flags |= BuildFlags::ALLOW_COMPACTION;
        }

        let mut scratch = Vec::with_capacity(descriptors.len());
        let mut builds = Vec::with_capacity(descriptors.len());
        let result = self.create_per_object_structures(backend, descriptors, flags, &mut scratch, &mut builds);
        if let Err(e) = result {
            release_buffers(backend, &mut scratch);
            return Err(e);
        }

        let ticket = match backend.build_structures(&builds, self.compaction) {
            Ok(ticket) => ticket,
            Err(e) => {
                log::error!("Per-object build submission of {} structures failed: {}", builds.len(), e);
                release_buffers(backend, &mut scratch);
                return Err(e);
            }
        };

        if self.compaction {
            for (query, slot) in self.slots.iter_mut().enumerate() {
                slot.state = SlotState::AwaitingCompactedSize { ticket, query };
            }
        }
        self.stats.per_object_built += builds.len() as u64;
        log::info!(
            "Submitted {} per-object index builds (generation {})",
            builds.len(),
            self.generation
        );

        Ok(PendingPerObjectBuild {
            ticket,
            scratch,
            compaction: self.compaction,
        })
    }

    fn create_per_object_structures<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
        descriptors: &[PerObjectDescriptor],
        flags: BuildFlags,
        scratch: &mut Vec<BufferHandle>,
        builds: &mut Vec<StructureBuild>,
    ) -> DeviceResult<()> {
        for (slot_index, descriptor) in descriptors.iter().enumerate() {
            if descriptor.geometry_index as usize != slot_index {
                return Err(DeviceError::operation(
                    "submit_per_object_builds",
                    format!("descriptor {} fills slot {}", slot_index, descriptor.geometry_index),
                ));
            }

            let input = BuildInput::Triangles(descriptor.input);
            let sizes = backend.structure_build_sizes(&input, flags)?;
            let structure = backend
                .create_structure(StructureLevel::PerObject, sizes.structure_size, &descriptor.label)
                .map_err(|e| {
                    log::error!("Failed to create {}: {}", descriptor.label, e);
                    e
                })?;
            self.slots.push(PerObjectSlot {
                structure,
                address: 0,
                size: sizes.structure_size,
                primitive_count: descriptor.input.triangle_count,
                state: SlotState::Built,
            });

            let scratch_buffer = backend.create_buffer(
                &BufferDesc::new("blas scratch", sizes.build_scratch_size.max(1), BufferUsage::SCRATCH),
                None,
            )?;
            scratch.push(scratch_buffer);

            builds.push(StructureBuild {
                input,
                flags,
                destination: structure,
                source: None,
                scratch: scratch_buffer,
            });
        }
        Ok(())
    }

    /// Stage two: wait for the builds, then compact when enabled
    pub fn complete_per_object_builds<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
        pending: PendingPerObjectBuild,
    ) -> DeviceResult<()> {
        let PendingPerObjectBuild { ticket, mut scratch, compaction } = pending;
        let waited = backend.wait_submission(ticket);
        release_buffers(backend, &mut scratch);
        waited?;

        if compaction {
            self.compact(backend, ticket)?;
        }
        self.refresh_addresses(backend)
    }

    fn compact<B: DeviceBackend>(&mut self, backend: &mut B, ticket: SubmissionTicket) -> DeviceResult<()> {
        let sizes = backend.compacted_sizes(ticket).map_err(|e| {
            log::error!("Compacted size query failed: {}", e);
            e
        })?;

        let mut copies = Vec::new();
        let mut targets = Vec::new();
        for (slot_index, slot) in self.slots.iter().enumerate() {
            let SlotState::AwaitingCompactedSize { ticket: slot_ticket, query } = slot.state else {
                continue;
            };
            if slot_ticket != ticket {
                continue;
            }
            let compacted = sizes.get(query).copied().unwrap_or(0);
            if compacted == 0 || compacted > slot.size {
                return Err(DeviceError::operation(
                    "compact_per_object",
                    format!("slot {} reported compacted size {} for {} bytes", slot_index, compacted, slot.size),
                ));
            }
            let destination = backend.create_structure(
                StructureLevel::PerObject,
                compacted,
                &format!("blas[{}] compacted", slot_index),
            )?;
            copies.push(CompactionCopy { source: slot.structure, destination });
            targets.push((slot_index, compacted));
        }

        if copies.is_empty() {
            return Ok(());
        }

        let copy_ticket = match backend.compact_structures(&copies) {
            Ok(t) => t,
            Err(e) => {
                log::error!("Compaction submission of {} structures failed: {}", copies.len(), e);
                for copy in &copies {
                    backend.destroy_structure(copy.destination);
                }
                return Err(e);
            }
        };
        backend.wait_submission(copy_ticket)?;

        let mut saved = 0;
        for (copy, (slot_index, compacted)) in copies.iter().zip(targets) {
            let slot = &mut self.slots[slot_index];
            backend.destroy_structure(copy.source);
            saved += slot.size - compacted;
            slot.structure = copy.destination;
            slot.size = compacted;
            slot.state = SlotState::Compacted;
        }
        self.stats.compacted_bytes_saved += saved;
        log::info!("Compacted {} per-object indices, saved {} bytes", copies.len(), saved);
        Ok(())
    }

    fn refresh_addresses<B: DeviceBackend>(&mut self, backend: &B) -> DeviceResult<()> {
        for slot in &mut self.slots {
            slot.address = backend.structure_address(slot.structure)?;
        }
        Ok(())
    }

    /// Mode the next scene-wide build over `instance_count` instances would use
    pub fn scene_build_mode(&self, instance_count: usize) -> SceneBuildMode {
        match &self.scene {
            Some(scene)
                if scene.generation == self.generation
                    && scene.slot_count == self.slots.len()
                    && instance_count <= scene.capacity as usize =>
            {
                SceneBuildMode::Refit
            }
            _ => SceneBuildMode::FullBuild,
        }
    }

    /// Encode `instances` and build or refit the scene-wide index
    pub fn build_scene_index<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
        instances: &[SceneInstance],
    ) -> DeviceResult<SceneBuildMode> {
        if instances.is_empty() {
            return Err(DeviceError::operation("build_scene_index", "instance list is empty"));
        }

        let mode = self.scene_build_mode(instances.len());
        let capacity = match (mode, self.scene) {
            (SceneBuildMode::Refit, Some(scene)) => scene.capacity as usize,
            _ => self.instance_capacity.max(instances.len()),
        };
        let mut records = self.encode_instances(instances)?;
        let inactive = EncodedInstance::inactive(records[0].structure_reference);
        records.resize(capacity, inactive);

        let instance_address = self.upload_instances(backend, &records)?;
        let input = BuildInput::Instances(InstanceInput {
            instance_address,
            instance_count: records.len() as u32,
        });

        let state = match (mode, self.scene) {
            (SceneBuildMode::Refit, Some(scene)) => {
                let build = StructureBuild {
                    input,
                    flags: scene.flags,
                    destination: scene.structure,
                    source: Some(scene.structure),
                    scratch: scene.scratch,
                };
                let ticket = backend.build_structures(&[build], false)?;
                backend.wait_submission(ticket)?;
                scene
            }
            _ => self.full_scene_build(backend, input)?,
        };

        self.scene = Some(SceneIndexState {
            capacity: records.len() as u32,
            generation: self.generation,
            slot_count: self.slots.len(),
            ..state
        });
        match mode {
            SceneBuildMode::FullBuild => self.stats.scene_full_builds += 1,
            SceneBuildMode::Refit => self.stats.scene_refits += 1,
        }
        self.stats.last_scene_mode = Some(mode);
        log::debug!("Scene index {:?} over {} of {} instance records", mode, instances.len(), records.len());
        Ok(mode)
    }

    fn encode_instances(&self, instances: &[SceneInstance]) -> DeviceResult<Vec<EncodedInstance>> {
        instances
            .iter()
            .map(|instance| {
                let slot = self.slots.get(instance.geometry_index as usize).ok_or_else(|| {
                    DeviceError::operation(
                        "build_scene_index",
                        format!("instance references missing per-object slot {}", instance.geometry_index),
                    )
                })?;
                Ok(instance.encode(slot.address))
            })
            .collect()
    }

    fn upload_instances<B: DeviceBackend>(&mut self, backend: &mut B, records: &[EncodedInstance]) -> DeviceResult<DeviceAddress> {
        let bytes: &[u8] = bytemuck::cast_slice(records);
        let needed = bytes.len() as u64;

        let storage = match self.instances.filter(|s| s.capacity >= needed) {
            Some(storage) => storage,
            None => {
                if let Some(old) = self.instances.take() {
                    backend.destroy_buffer(old.buffer);
                }
                let capacity = needed.next_power_of_two();
                let buffer = backend.create_buffer(
                    &BufferDesc::new("scene instances", capacity, BufferUsage::BUILD_INPUT | BufferUsage::HOST_WRITE),
                    None,
                )?;
                let storage = InstanceStorage { buffer, capacity };
                self.instances = Some(storage);
                storage
            }
        };

        backend.write_buffer(storage.buffer, 0, bytes)?;
        backend.buffer_address(storage.buffer)
    }

    fn full_scene_build<B: DeviceBackend>(&mut self, backend: &mut B, input: BuildInput) -> DeviceResult<SceneIndexState> {
        self.destroy_scene_index(backend);

        let flags = BuildFlags::ALLOW_UPDATE | BuildFlags::PREFER_FAST_TRACE;
        let sizes = backend.structure_build_sizes(&input, flags)?;
        let structure = backend.create_structure(StructureLevel::Scene, sizes.structure_size, "tlas")?;
        let scratch_size = sizes.build_scratch_size.max(sizes.update_scratch_size).max(1);
        let scratch = match backend.create_buffer(&BufferDesc::new("tlas scratch", scratch_size, BufferUsage::SCRATCH), None) {
            Ok(buffer) => buffer,
            Err(e) => {
                backend.destroy_structure(structure);
                return Err(e);
            }
        };

        let build = StructureBuild {
            input,
            flags,
            destination: structure,
            source: None,
            scratch,
        };
        let built = backend
            .build_structures(&[build], false)
            .and_then(|ticket| backend.wait_submission(ticket))
            .and_then(|()| backend.structure_address(structure));
        let address = match built {
            Ok(address) => address,
            Err(e) => {
                log::error!("Scene index build over {} instances failed: {}", input.primitive_count(), e);
                backend.destroy_structure(structure);
                backend.destroy_buffer(scratch);
                return Err(e);
            }
        };

        Ok(SceneIndexState {
            structure,
            address,
            scratch,
            flags,
            capacity: input.primitive_count(),
            generation: self.generation,
            slot_count: self.slots.len(),
        })
    }

    /// Free the scene-wide index
    pub fn destroy_scene_index<B: DeviceBackend>(&mut self, backend: &mut B) {
        if let Some(scene) = self.scene.take() {
            backend.destroy_structure(scene.structure);
            backend.destroy_buffer(scene.scratch);
        }
    }

    /// Free every per-object index
    pub fn destroy_per_object<B: DeviceBackend>(&mut self, backend: &mut B) {
        for slot in self.slots.drain(..) {
            backend.destroy_structure(slot.structure);
        }
    }

    /// Free everything: scene-wide index, per-object indices, instance buffer
    pub fn destroy_all<B: DeviceBackend>(&mut self, backend: &mut B) {
        self.destroy_scene_index(backend);
        self.destroy_per_object(backend);
        if let Some(storage) = self.instances.take() {
            backend.destroy_buffer(storage.buffer);
        }
    }
}

fn release_buffers<B: DeviceBackend>(backend: &mut B, buffers: &mut Vec<BufferHandle>) {
    for buffer in buffers.drain(..) {
        backend.destroy_buffer(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceOp, HeadlessBackend, TriangleInput};
    use crate::foundation::math::Mat4;

    fn descriptors(backend: &mut HeadlessBackend, counts: &[u32]) -> Vec<PerObjectDescriptor> {
        counts
            .iter()
            .enumerate()
            .map(|(i, &triangles)| {
                let vertices = backend
                    .create_buffer(&BufferDesc::new("v", 4096, BufferUsage::BUILD_INPUT), None)
                    .unwrap();
                let indices = backend
                    .create_buffer(&BufferDesc::new("i", 4096, BufferUsage::BUILD_INPUT), None)
                    .unwrap();
                PerObjectDescriptor {
                    geometry_index: i as u32,
                    input: TriangleInput {
                        vertex_address: backend.buffer_address(vertices).unwrap(),
                        vertex_stride: 32,
                        max_vertex: 2,
                        index_address: backend.buffer_address(indices).unwrap(),
                        triangle_count: triangles,
                        opaque: true,
                    },
                    label: format!("test {}", i),
                }
            })
            .collect()
    }

    fn instances(count: usize) -> Vec<SceneInstance> {
        (0..count)
            .map(|i| SceneInstance {
                geometry_index: (i % 2) as u32,
                transform: Mat4::identity(),
                mask: 0xFF,
                opaque: true,
            })
            .collect()
    }

    #[test]
    fn test_rebuild_batches_builds_then_compacts() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[12, 40, 0]);
        let mut builder = SpatialIndexBuilder::new(true, 4);
        backend.clear_ops();

        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();

        let builds: Vec<_> = backend
            .ops()
            .iter()
            .filter(|op| matches!(op, DeviceOp::BuildStructures { .. }))
            .collect();
        assert_eq!(builds.len(), 1);
        assert_eq!(
            builds[0],
            &DeviceOp::BuildStructures { per_object: 3, scene: 0, updates: 0, queried: true }
        );
        assert_eq!(backend.count_ops(|op| matches!(op, DeviceOp::CompactStructures { count: 3 })), 1);

        assert_eq!(builder.per_object_count(), 3);
        assert!(builder.slots().iter().all(|s| s.state == SlotState::Compacted));
        assert!(builder.stats().compacted_bytes_saved > 0);
        assert_eq!(backend.live_structures(StructureLevel::PerObject), 3);
    }

    #[test]
    fn test_two_stage_pipeline_leaves_slots_awaiting_query() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[4, 4]);
        let mut builder = SpatialIndexBuilder::new(true, 4);

        let pending = builder.submit_per_object_builds(&mut backend, &descriptors).unwrap();
        assert!(builder
            .slots()
            .iter()
            .all(|s| matches!(s.state, SlotState::AwaitingCompactedSize { .. })));

        builder.complete_per_object_builds(&mut backend, pending).unwrap();
        assert!(builder.slots().iter().all(|s| s.state == SlotState::Compacted));
        assert!(builder.slots().iter().all(|s| s.address != 0));
    }

    #[test]
    fn test_without_compaction_slots_stay_built() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8]);
        let mut builder = SpatialIndexBuilder::new(false, 4);

        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();

        assert_eq!(builder.slots()[0].state, SlotState::Built);
        assert_eq!(backend.count_ops(|op| matches!(op, DeviceOp::CompactStructures { .. })), 0);
    }

    #[test]
    fn test_rebuild_frees_previous_structures() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8, 8]);
        let mut builder = SpatialIndexBuilder::new(true, 4);

        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();
        builder.rebuild_all_per_object_indices(&mut backend, &descriptors[..1]).unwrap();

        assert_eq!(builder.per_object_count(), 1);
        assert_eq!(backend.live_structures(StructureLevel::PerObject), 1);
        assert_eq!(builder.generation(), 2);
    }

    #[test]
    fn test_scene_mode_full_then_refit() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8, 8]);
        let mut builder = SpatialIndexBuilder::new(true, 4);
        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();

        assert_eq!(builder.build_scene_index(&mut backend, &instances(3)).unwrap(), SceneBuildMode::FullBuild);
        assert_eq!(builder.build_scene_index(&mut backend, &instances(3)).unwrap(), SceneBuildMode::Refit);
        assert_eq!(backend.live_structures(StructureLevel::Scene), 1);
    }

    #[test]
    fn test_instance_count_change_within_capacity_refits() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8, 8]);
        let mut builder = SpatialIndexBuilder::new(false, 4);
        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();

        builder.build_scene_index(&mut backend, &instances(2)).unwrap();
        let (structure, _) = builder.scene_index().unwrap();
        assert_eq!(backend.structure_primitive_count(structure), Some(4));

        assert_eq!(builder.scene_build_mode(3), SceneBuildMode::Refit);
        assert_eq!(builder.build_scene_index(&mut backend, &instances(3)).unwrap(), SceneBuildMode::Refit);
        assert_eq!(builder.build_scene_index(&mut backend, &instances(1)).unwrap(), SceneBuildMode::Refit);
        assert_eq!(builder.scene_index().unwrap().0, structure);
        assert_eq!(backend.structure_primitive_count(structure), Some(4));
        assert_eq!(backend.live_structures(StructureLevel::Scene), 1);
    }

    #[test]
    fn test_growing_past_capacity_forces_full_build() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8, 8]);
        let mut builder = SpatialIndexBuilder::new(false, 2);
        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();

        builder.build_scene_index(&mut backend, &instances(2)).unwrap();
        assert_eq!(builder.scene_build_mode(3), SceneBuildMode::FullBuild);
        assert_eq!(builder.build_scene_index(&mut backend, &instances(3)).unwrap(), SceneBuildMode::FullBuild);
        let (structure, _) = builder.scene_index().unwrap();
        assert_eq!(backend.structure_primitive_count(structure), Some(3));
        assert_eq!(builder.build_scene_index(&mut backend, &instances(2)).unwrap(), SceneBuildMode::Refit);
        assert_eq!(backend.live_structures(StructureLevel::Scene), 1);
    }

    #[test]
    fn test_per_object_rebuild_forces_full_scene_build() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8, 8]);
        let mut builder = SpatialIndexBuilder::new(false, 4);
        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();
        builder.build_scene_index(&mut backend, &instances(2)).unwrap();

        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();
        assert_eq!(builder.scene_build_mode(2), SceneBuildMode::FullBuild);
        assert_eq!(builder.build_scene_index(&mut backend, &instances(2)).unwrap(), SceneBuildMode::FullBuild);
    }

    #[test]
    fn test_instance_referencing_missing_slot_is_rejected() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8]);
        let mut builder = SpatialIndexBuilder::new(false, 4);
        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();

        let result = builder.build_scene_index(&mut backend, &instances(2));
        assert!(result.is_err());
    }

    #[test]
    fn test_failed_build_submission_releases_scratch() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8, 8]);
        let mut builder = SpatialIndexBuilder::new(true, 4);
        let buffers_before = backend.live_buffers();

        backend.fail_next("build_structures");
        assert!(builder.rebuild_all_per_object_indices(&mut backend, &descriptors).is_err());
        assert_eq!(backend.live_buffers(), buffers_before);

        builder.destroy_all(&mut backend);
        assert_eq!(backend.live_structures(StructureLevel::PerObject), 0);
    }

    #[test]
    fn test_destroy_all_frees_everything() {
        let mut backend = HeadlessBackend::new();
        let descriptors = descriptors(&mut backend, &[8, 8]);
        let buffers_before = backend.live_buffers();
        let mut builder = SpatialIndexBuilder::new(true, 4);
        builder.rebuild_all_per_object_indices(&mut backend, &descriptors).unwrap();
        builder.build_scene_index(&mut backend, &instances(2)).unwrap();

        builder.destroy_all(&mut backend);

        assert_eq!(backend.live_structures(StructureLevel::PerObject), 0);
        assert_eq!(backend.live_structures(StructureLevel::Scene), 0);
        assert_eq!(backend.live_buffers(), buffers_before);
        assert!(builder.scene_index().is_none());
    }
}
