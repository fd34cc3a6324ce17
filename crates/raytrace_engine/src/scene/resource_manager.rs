//! # Scene Resource Manager
//!
//! Single source of truth for scene contents and the gatekeeper for device
//! uploads. Every public mutation only edits host state and sets dirty flags;
//! device work happens in [`SceneResourceManager::resolve`], which the frame
//! loop calls after the previous frame's completion signal was awaited.
//!
//! ## Dirty flags
//!
//! - `geometries_dirty`: geometry set or visibility changed. Resolution uploads
//!   new geometry buffers, textures and materials, rebuilds every per-object
//!   index and rewrites the geometry records.
//! - `instances_dirty`: instance set or a transform changed. Resolution
//!   re-encodes all instances and builds or refits the scene-wide index.
//! - `environment_dirty`: environment map changed.
//!
//! Each flag is cleared only once its work succeeded, and geometry work always
//! runs before instance work in the same resolution.
//!
//! ## Empty scenes
//!
//! While the user has no instances, the instance list holds exactly one
//! placeholder instance (see [`degenerate`](super::degenerate)). It is
//! injected and removed as part of the mutation that empties or populates the
//! list, so the list is never empty and never mixes the placeholder with user
//! instances.

use slotmap::SlotMap;

use super::bindings::{GpuGeometryRecord, SceneBindings};
use super::camera::Camera;
use super::degenerate::{placeholder_mesh, placeholder_transform, DegenerateState, PLACEHOLDER_MASK};
use super::environment::{EnvironmentMap, ImageData};
use super::error::{ResourceKind, SceneError, SceneResult};
use super::geometry::{Geometry, GeometryBuffers, GeometryFlags, GeometryKey, MeshData, Submesh};
use super::instance::{GeometryInstance, InstanceKey};
use super::lights::{ActiveLight, DirectionalLight, Light, LightSet, PointLight};
use super::material::{GpuMaterial, Material, MaterialTable, TextureTable};
use super::release::ReleaseQueue;
use crate::accel::{describe_per_object, SceneBuildMode, SceneInstance, SpatialIndexBuilder};
use crate::core::{RendererConfig, SceneLimits};
use crate::device::{BufferDesc, BufferHandle, BufferUsage, DeviceBackend, DeviceResult, TextureHandle};
use crate::foundation::math::Mat4;

/// Placeholder geometry and instance while the scene is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placeholder {
    geometry: GeometryKey,
    instance: InstanceKey,
}

/// What one resolution did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Per-object indices were rebuilt
    pub geometries_rebuilt: bool,
    /// Number of per-object indices after the pass
    pub per_object_indices: usize,
    /// Mode of the scene-wide build, if one ran
    pub scene_mode: Option<SceneBuildMode>,
    /// Environment texture was replaced or removed
    pub environment_updated: bool,
    /// Deferred resources freed
    pub released: usize,
}

impl ResolveReport {
    /// Whether any device state changed
    pub fn changed_scene(&self) -> bool {
        self.geometries_rebuilt || self.scene_mode.is_some() || self.environment_updated
    }
}

/// Scene counters for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneStats {
    /// User geometries
    pub geometries: usize,
    /// User instances
    pub instances: usize,
    /// Unique materials
    pub materials: usize,
    /// Unique textures
    pub textures: usize,
    /// Point lights
    pub point_lights: usize,
    /// Projector lights
    pub active_lights: usize,
    /// Per-object indices currently built (placeholder included)
    pub per_object_indices: usize,
    /// Bytes saved by per-object compaction
    pub compacted_bytes_saved: u64,
    /// Mode of the last scene-wide build
    pub last_scene_mode: Option<SceneBuildMode>,
    /// Degenerate-scene state
    pub degenerate: DegenerateState,
}

/// Owner of scene state and its device resources
#[derive(Debug)]
pub struct SceneResourceManager {
    limits: SceneLimits,
    geometries: Vec<Geometry>,
    geometry_slots: SlotMap<GeometryKey, u32>,
    geometry_indices: super::allocator::SequenceAllocator,
    instances: SlotMap<InstanceKey, GeometryInstance>,
    materials: MaterialTable,
    textures: TextureTable,
    lights: LightSet,
    environment: Option<EnvironmentMap>,
    environment_texture: Option<TextureHandle>,
    camera: Camera,
    placeholder: Option<Placeholder>,
    geometries_dirty: bool,
    instances_dirty: bool,
    environment_dirty: bool,
    builder: SpatialIndexBuilder,
    geometry_records: Option<BufferHandle>,
    material_buffer: Option<BufferHandle>,
    release_queue: ReleaseQueue,
    bindings: SceneBindings,
    revision: u64,
}

impl SceneResourceManager {
    /// Create an empty scene (holding the placeholder instance)
    pub fn new(config: &RendererConfig) -> Self {
        let limits = config.limits;
        let mut manager = Self {
            limits,
            geometries: Vec::new(),
            geometry_slots: SlotMap::with_key(),
            geometry_indices: super::allocator::SequenceAllocator::new(),
            instances: SlotMap::with_key(),
            materials: MaterialTable::new(limits.max_materials),
            textures: TextureTable::new(limits.max_textures),
            lights: LightSet::new(limits.max_point_lights, limits.max_active_lights),
            environment: None,
            environment_texture: None,
            camera: Camera::default(),
            placeholder: None,
            geometries_dirty: false,
            instances_dirty: false,
            environment_dirty: false,
            builder: SpatialIndexBuilder::new(config.compact_per_object_indices, limits.max_instances),
            geometry_records: None,
            material_buffer: None,
            release_queue: ReleaseQueue::new(),
            bindings: SceneBindings::default(),
            revision: 0,
        };
        manager.reconcile_degenerate_state();
        manager
    }

    // === Geometry ===

    /// Submit a parsed mesh
    ///
    /// Materials are deduplicated against the global table and diffuse
    /// textures are loaded once per unique path. Nothing is applied when any
    /// capacity is exceeded or a texture fails to load.
    pub fn submit_geometry(&mut self, mesh: MeshData, flags: GeometryFlags) -> SceneResult<GeometryKey> {
        mesh.validate()?;
        if self.user_geometry_count() >= self.limits.max_geometries {
            return Err(SceneError::CapacityExceeded {
                resource: ResourceKind::Geometry,
                limit: self.limits.max_geometries,
            });
        }

        let submeshes = if mesh.submeshes.is_empty() {
            vec![Submesh {
                index_start: 0,
                index_count: mesh.indices.len(),
                material: Material::default(),
            }]
        } else {
            mesh.submeshes.clone()
        };
        let material_ids = self.intern_materials(&submeshes)?;

        let mut mat_index = Vec::with_capacity(mesh.triangle_count());
        for (submesh, &material) in submeshes.iter().zip(&material_ids) {
            mat_index.extend(std::iter::repeat(material).take(submesh.index_count / 3));
        }

        let key = self.push_geometry(mesh, mat_index, flags, false);
        log::debug!(
            "Geometry {:?} submitted as index {} ({} materials)",
            key,
            self.geometry_slots[key],
            material_ids.len()
        );
        Ok(key)
    }

    fn intern_materials(&mut self, submeshes: &[Submesh]) -> SceneResult<Vec<u32>> {
        let new_materials = self.materials.count_new(submeshes.iter().map(|s| &s.material));
        self.materials.check_capacity(new_materials)?;

        let mut new_paths = Vec::new();
        for submesh in submeshes {
            if self.materials.find(&submesh.material).is_some() {
                continue;
            }
            if let Some(path) = &submesh.material.diffuse_texture {
                if self.textures.find(path).is_none() && !new_paths.contains(path) {
                    new_paths.push(path.clone());
                }
            }
        }
        self.textures.check_capacity(new_paths.len())?;

        // Decode everything before committing anything
        let images = new_paths
            .into_iter()
            .map(|path| ImageData::from_file(&path).map(|image| (path, image)))
            .collect::<SceneResult<Vec<_>>>()?;
        for (path, image) in images {
            self.textures.insert(path, image)?;
        }

        submeshes
            .iter()
            .map(|submesh| {
                let texture = submesh
                    .material
                    .diffuse_texture
                    .as_deref()
                    .and_then(|path| self.textures.find(path));
                self.materials.intern(&submesh.material, texture)
            })
            .collect()
    }

    fn push_geometry(&mut self, mesh: MeshData, mat_index: Vec<u32>, flags: GeometryFlags, degenerate: bool) -> GeometryKey {
        let geometry_index = self.geometry_indices.allocate_index();
        let key = self.geometry_slots.insert(geometry_index);
        self.geometries.push(Geometry {
            key,
            geometry_index,
            name: mesh.name,
            vertices: mesh.vertices,
            indices: mesh.indices,
            mat_index,
            flags,
            initialized: false,
            buffers: None,
            degenerate,
        });
        self.geometries_dirty = true;
        self.bump_revision();
        key
    }

    /// Remove a geometry and every instance referencing it
    ///
    /// Geometries above it move down one index.
    pub fn remove_geometry(&mut self, key: GeometryKey) -> SceneResult<()> {
        self.check_user_geometry(key)?;
        let removed = self.remove_geometry_internal(key);
        log::debug!("Geometry {:?} removed with {} instances", key, removed);
        self.reconcile_degenerate_state();
        Ok(())
    }

    fn remove_geometry_internal(&mut self, key: GeometryKey) -> usize {
        let Some(index) = self.geometry_slots.remove(key) else {
            return 0;
        };

        let doomed: Vec<InstanceKey> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.geometry == key)
            .map(|(instance_key, _)| instance_key)
            .collect();
        for instance_key in &doomed {
            self.instances.remove(*instance_key);
        }

        let geometry = self.geometries.remove(index as usize);
        if let Some(buffers) = geometry.buffers {
            self.release_queue.defer_buffers(buffers.handles());
        }
        for moved in &mut self.geometries[index as usize..] {
            moved.geometry_index -= 1;
            if let Some(slot) = self.geometry_slots.get_mut(moved.key) {
                *slot = moved.geometry_index;
            }
        }
        self.geometry_indices.release_range(index..index + 1);

        self.geometries_dirty = true;
        if !doomed.is_empty() {
            self.instances_dirty = true;
        }
        self.bump_revision();
        doomed.len()
    }

    /// Hide or show a geometry without removing it
    pub fn set_geometry_hidden(&mut self, key: GeometryKey, hidden: bool) -> SceneResult<()> {
        let index = self.check_user_geometry(key)?;
        let geometry = &mut self.geometries[index as usize];
        if geometry.is_hidden() != hidden {
            geometry.flags.set(GeometryFlags::HIDE_RENDER, hidden);
            self.geometries_dirty = true;
            self.bump_revision();
        }
        Ok(())
    }

    fn check_user_geometry(&self, key: GeometryKey) -> SceneResult<u32> {
        let index = self
            .geometry_slots
            .get(key)
            .copied()
            .ok_or_else(|| SceneError::InvalidReference(format!("unknown geometry {:?}", key)))?;
        if self.placeholder.is_some_and(|p| p.geometry == key) {
            return Err(SceneError::InvalidReference("placeholder geometry is not user-owned".to_string()));
        }
        Ok(index)
    }

    // === Instances ===

    /// Add an instance of a geometry
    pub fn submit_instance(&mut self, geometry: GeometryKey, transform: Mat4) -> SceneResult<InstanceKey> {
        self.check_user_geometry(geometry)?;
        if self.user_instance_count() >= self.limits.max_instances {
            return Err(SceneError::CapacityExceeded {
                resource: ResourceKind::Instance,
                limit: self.limits.max_instances,
            });
        }

        let key = self.instances.insert(GeometryInstance::new(geometry, transform));
        self.instances_dirty = true;
        self.bump_revision();
        self.reconcile_degenerate_state();
        Ok(key)
    }

    /// Remove an instance
    pub fn remove_instance(&mut self, key: InstanceKey) -> SceneResult<()> {
        self.check_user_instance(key)?;
        self.instances.remove(key);
        self.instances_dirty = true;
        self.bump_revision();
        self.reconcile_degenerate_state();
        Ok(())
    }

    /// Replace every user instance
    ///
    /// The whole list is validated first; on error nothing changes.
    pub fn set_instances(&mut self, instances: &[(GeometryKey, Mat4)]) -> SceneResult<Vec<InstanceKey>> {
        for (geometry, _) in instances {
            self.check_user_geometry(*geometry)?;
        }
        if instances.len() > self.limits.max_instances {
            return Err(SceneError::CapacityExceeded {
                resource: ResourceKind::Instance,
                limit: self.limits.max_instances,
            });
        }

        let placeholder_instance = self.placeholder.map(|p| p.instance);
        self.instances.retain(|key, _| Some(key) == placeholder_instance);
        let keys = instances
            .iter()
            .map(|(geometry, transform)| self.instances.insert(GeometryInstance::new(*geometry, *transform)))
            .collect();

        self.instances_dirty = true;
        self.bump_revision();
        self.reconcile_degenerate_state();
        Ok(keys)
    }

    /// Move an instance
    pub fn set_instance_transform(&mut self, key: InstanceKey, transform: Mat4) -> SceneResult<()> {
        self.check_user_instance(key)?;
        if let Some(instance) = self.instances.get_mut(key) {
            instance.transform = transform;
        }
        self.instances_dirty = true;
        self.bump_revision();
        Ok(())
    }

    fn check_user_instance(&self, key: InstanceKey) -> SceneResult<()> {
        if !self.instances.contains_key(key) {
            return Err(SceneError::InvalidReference(format!("unknown instance {:?}", key)));
        }
        if self.placeholder.is_some_and(|p| p.instance == key) {
            return Err(SceneError::InvalidReference("placeholder instance is not user-owned".to_string()));
        }
        Ok(())
    }

    // === Empty-scene placeholder ===

    /// Inject or remove the placeholder to match the user instance count
    pub fn reconcile_degenerate_state(&mut self) {
        match (self.placeholder, self.user_instance_count()) {
            (None, 0) => self.inject_placeholder(),
            (Some(placeholder), n) if n > 0 => {
                self.placeholder = None;
                self.remove_geometry_internal(placeholder.geometry);
                log::info!("Placeholder instance removed; scene holds {} instances", n);
            }
            _ => {}
        }
    }

    fn inject_placeholder(&mut self) {
        let mesh = placeholder_mesh();
        // Never hit (empty mask), so it needs no material slot
        let mat_index = vec![0; mesh.triangle_count()];
        let geometry = self.push_geometry(mesh, mat_index, GeometryFlags::OPAQUE, true);
        let instance = self.instances.insert(GeometryInstance {
            geometry,
            transform: placeholder_transform(&self.camera),
            mask: PLACEHOLDER_MASK,
        });
        self.placeholder = Some(Placeholder { geometry, instance });
        self.instances_dirty = true;
        log::info!("Scene is empty; placeholder instance injected");
    }

    /// Per-frame update: track the camera and keep the placeholder behind it
    pub fn prepare_frame(&mut self, camera: &Camera) {
        let moved = camera.moved_from(&self.camera);
        self.camera = *camera;
        self.reconcile_degenerate_state();

        if !moved {
            return;
        }
        if let Some(placeholder) = self.placeholder {
            if let Some(instance) = self.instances.get_mut(placeholder.instance) {
                instance.transform = placeholder_transform(camera);
                self.instances_dirty = true;
            }
        }
    }

    // === Lights ===

    /// Set or clear the directional light
    pub fn set_directional_light(&mut self, light: Option<DirectionalLight>) {
        self.lights.set_directional(light);
        self.bump_revision();
    }

    /// Add a point light
    pub fn add_point_light(&mut self, light: PointLight) -> SceneResult<usize> {
        let slot = self.lights.add_point(light)?;
        self.bump_revision();
        Ok(slot)
    }

    /// Add a projector light
    pub fn add_active_light(&mut self, light: ActiveLight) -> SceneResult<usize> {
        let slot = self.lights.add_active(light)?;
        self.bump_revision();
        Ok(slot)
    }

    /// Add any light
    pub fn add_light(&mut self, light: Light) -> SceneResult<()> {
        self.lights.add(light)?;
        self.bump_revision();
        Ok(())
    }

    /// Remove every light
    pub fn clear_lights(&mut self) {
        self.lights.clear();
        self.bump_revision();
    }

    // === Environment ===

    /// Replace the environment map
    pub fn set_environment_map(&mut self, environment: EnvironmentMap) {
        log::debug!("Environment map set from {}", environment.source);
        self.environment = Some(environment);
        self.environment_dirty = true;
        self.bump_revision();
    }

    /// Load and set an environment map from disk
    pub fn load_environment_map(&mut self, path: impl AsRef<std::path::Path>) -> SceneResult<()> {
        let environment = EnvironmentMap::from_file(path)?;
        self.set_environment_map(environment);
        Ok(())
    }

    /// Remove the environment map; returns whether one was set
    pub fn remove_environment_map(&mut self) -> bool {
        if self.environment.take().is_none() {
            return false;
        }
        self.environment_dirty = true;
        self.bump_revision();
        true
    }

    // === Whole scene ===

    /// Remove every geometry, instance, material and texture
    pub fn clear_scene(&mut self) {
        self.placeholder = None;
        for geometry in self.geometries.drain(..) {
            if let Some(buffers) = geometry.buffers {
                self.release_queue.defer_buffers(buffers.handles());
            }
        }
        self.geometry_slots.clear();
        self.instances.clear();
        self.geometry_indices.release_all();
        self.materials.clear();
        let textures = self.textures.clear();
        self.release_queue.defer_textures(textures);

        self.geometries_dirty = true;
        self.instances_dirty = true;
        self.bump_revision();
        log::info!("Scene cleared");
        self.reconcile_degenerate_state();
    }

    /// Whether [`resolve`](Self::resolve) has device work to do
    pub fn needs_device_sync(&self) -> bool {
        self.geometries_dirty || self.instances_dirty || self.environment_dirty || !self.release_queue.is_empty()
    }

    /// Apply all pending changes to the device
    ///
    /// The caller must have awaited the completion signal of every frame
    /// that may read scene resources. Device errors are fatal and leave the
    /// unfinished flags set.
    pub fn resolve<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<ResolveReport> {
        self.reconcile_degenerate_state();

        let mut report = ResolveReport {
            released: self.release_queue.flush(backend),
            ..Default::default()
        };

        if self.geometries_dirty {
            self.upload_geometries(backend)?;
            self.upload_textures(backend)?;
            self.upload_materials(backend)?;

            let descriptors = self
                .geometries
                .iter()
                .map(|geometry| describe_per_object(&*backend, geometry))
                .collect::<DeviceResult<Vec<_>>>()?;
            self.builder.rebuild_all_per_object_indices(backend, &descriptors)?;
            self.upload_geometry_records(backend)?;

            self.geometries_dirty = false;
            // Every instance now points at a new per-object set
            self.instances_dirty = true;
            report.geometries_rebuilt = true;
            log::info!("Rebuilt {} per-object indices", descriptors.len());
        }
        report.per_object_indices = self.builder.per_object_count();

        if self.environment_dirty {
            self.upload_environment(backend)?;
            self.environment_dirty = false;
            report.environment_updated = true;
        }

        if self.instances_dirty {
            let instances = self.scene_instances();
            let mode = self.builder.build_scene_index(backend, &instances)?;
            self.instances_dirty = false;
            report.scene_mode = Some(mode);
        }

        if report.changed_scene() {
            self.publish_bindings();
        }
        Ok(report)
    }

    fn upload_geometries<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<()> {
        for geometry in self.geometries.iter_mut().filter(|g| !g.initialized) {
            let buffers = upload_geometry(backend, geometry).map_err(|e| {
                log::error!("Upload of geometry {} ('{}') failed: {}", geometry.geometry_index, geometry.name, e);
                e
            })?;
            geometry.buffers = Some(buffers);
            geometry.initialized = true;
        }
        Ok(())
    }

    fn upload_textures<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<()> {
        let mut uploaded = Vec::new();
        for (index, label, image) in self.textures.pending_uploads() {
            match backend.create_texture(&label, image) {
                Ok(handle) => uploaded.push((index, handle)),
                Err(e) => {
                    log::error!("Upload of texture '{}' failed: {}", label, e);
                    for (_, handle) in uploaded {
                        backend.destroy_texture(handle);
                    }
                    return Err(e);
                }
            }
        }
        for (index, handle) in uploaded {
            self.textures.set_handle(index, handle);
        }
        Ok(())
    }

    fn upload_materials<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<()> {
        if !self.materials.is_dirty() && self.material_buffer.is_some() {
            return Ok(());
        }
        if let Some(old) = self.material_buffer.take() {
            backend.destroy_buffer(old);
        }

        let records = self.materials.records();
        let placeholder = [<GpuMaterial as bytemuck::Zeroable>::zeroed()];
        let records = if records.is_empty() { &placeholder[..] } else { records };
        let bytes: &[u8] = bytemuck::cast_slice(records);
        let buffer = backend.create_buffer(
            &BufferDesc::new("materials", bytes.len() as u64, BufferUsage::STORAGE),
            Some(bytes),
        )?;
        self.material_buffer = Some(buffer);
        self.materials.mark_uploaded();
        Ok(())
    }

    fn upload_geometry_records<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<()> {
        if let Some(old) = self.geometry_records.take() {
            backend.destroy_buffer(old);
        }

        let mut records = Vec::with_capacity(self.geometries.len().max(1));
        for geometry in &self.geometries {
            let Some(buffers) = geometry.buffers else {
                continue;
            };
            records.push(GpuGeometryRecord {
                vertex_address: backend.buffer_address(buffers.vertices)?,
                index_address: backend.buffer_address(buffers.indices)?,
                material_index_address: backend.buffer_address(buffers.material_indices)?,
                triangle_count: geometry.triangle_count(),
                flags: geometry.flags.bits(),
            });
        }
        if records.is_empty() {
            records.push(bytemuck::Zeroable::zeroed());
        }

        let bytes: &[u8] = bytemuck::cast_slice(&records);
        let buffer = backend.create_buffer(
            &BufferDesc::new("geometry records", bytes.len() as u64, BufferUsage::STORAGE),
            Some(bytes),
        )?;
        self.geometry_records = Some(buffer);
        Ok(())
    }

    fn upload_environment<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<()> {
        if let Some(old) = self.environment_texture.take() {
            backend.destroy_texture(old);
        }
        if let Some(environment) = &self.environment {
            let texture = backend.create_texture(&format!("environment {}", environment.source), &environment.image)?;
            self.environment_texture = Some(texture);
            log::info!("Environment map uploaded from {}", environment.source);
        }
        Ok(())
    }

    fn scene_instances(&self) -> Vec<SceneInstance> {
        self.instances
            .values()
            .filter_map(|instance| {
                let geometry_index = *self.geometry_slots.get(instance.geometry)?;
                let geometry = &self.geometries[geometry_index as usize];
                Some(SceneInstance {
                    geometry_index,
                    transform: instance.transform,
                    mask: instance.mask,
                    opaque: geometry.is_opaque(),
                })
            })
            .collect()
    }

    fn publish_bindings(&mut self) {
        let (scene_index, scene_index_address) = match self.builder.scene_index() {
            Some((structure, address)) => (Some(structure), address),
            None => (None, 0),
        };
        self.bindings = SceneBindings {
            scene_index,
            scene_index_address,
            geometry_records: self.geometry_records,
            materials: self.material_buffer,
            textures: self.textures.handles(),
            environment: self.environment_texture,
            instance_count: self.instances.len() as u32,
            revision: self.bindings.revision + 1,
        };
    }

    /// Free every device resource
    ///
    /// Order: scene-wide index, per-object indices, instance buffer, geometry
    /// buffers, then material, texture and environment resources. The caller
    /// has waited for the device to go idle.
    pub fn shutdown<B: DeviceBackend>(&mut self, backend: &mut B) {
        self.builder.destroy_all(backend);
        for geometry in &mut self.geometries {
            if let Some(buffers) = geometry.buffers.take() {
                for buffer in buffers.handles() {
                    backend.destroy_buffer(buffer);
                }
            }
            geometry.initialized = false;
        }
        if let Some(buffer) = self.geometry_records.take() {
            backend.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.material_buffer.take() {
            backend.destroy_buffer(buffer);
        }
        for texture in self.textures.clear() {
            backend.destroy_texture(texture);
        }
        if let Some(texture) = self.environment_texture.take() {
            backend.destroy_texture(texture);
        }
        self.release_queue.flush(backend);
        self.bindings = SceneBindings::default();
        log::info!("Scene resources released");
    }

    // === Queries ===

    fn user_geometry_count(&self) -> usize {
        self.geometries.len() - usize::from(self.placeholder.is_some())
    }

    fn user_instance_count(&self) -> usize {
        self.instances.len() - usize::from(self.placeholder.is_some())
    }

    fn bump_revision(&mut self) {
        self.revision += 1;
    }

    /// Geometries in `geometry_index` order (placeholder included)
    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    /// Geometry by key
    pub fn geometry(&self, key: GeometryKey) -> Option<&Geometry> {
        let index = *self.geometry_slots.get(key)?;
        self.geometries.get(index as usize)
    }

    /// Current dense index of a geometry
    pub fn geometry_index(&self, key: GeometryKey) -> Option<u32> {
        self.geometry_slots.get(key).copied()
    }

    /// Instance by key
    pub fn instance(&self, key: InstanceKey) -> Option<&GeometryInstance> {
        self.instances.get(key)
    }

    /// All instances (placeholder included)
    pub fn instances(&self) -> impl Iterator<Item = (InstanceKey, &GeometryInstance)> {
        self.instances.iter()
    }

    /// Geometry index an instance resolves to
    pub fn instance_geometry_index(&self, key: InstanceKey) -> Option<u32> {
        let instance = self.instances.get(key)?;
        self.geometry_index(instance.geometry)
    }

    /// Key of the placeholder instance while injected
    pub fn placeholder_instance(&self) -> Option<InstanceKey> {
        self.placeholder.map(|p| p.instance)
    }

    /// Degenerate-scene state
    pub fn degenerate_state(&self) -> DegenerateState {
        if self.placeholder.is_some() {
            DegenerateState::DummyInjected
        } else {
            DegenerateState::Populated
        }
    }

    /// Whether geometry work is pending
    pub fn geometries_dirty(&self) -> bool {
        self.geometries_dirty
    }

    /// Whether instance work is pending
    pub fn instances_dirty(&self) -> bool {
        self.instances_dirty
    }

    /// Whether environment work is pending
    pub fn environment_dirty(&self) -> bool {
        self.environment_dirty
    }

    /// Device resources published by the last resolution
    pub fn bindings(&self) -> &SceneBindings {
        &self.bindings
    }

    /// Lights
    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    /// Current environment map
    pub fn environment(&self) -> Option<&EnvironmentMap> {
        self.environment.as_ref()
    }

    /// Camera of the last prepared frame
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Material table
    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    /// Index builder (read-only)
    pub fn builder(&self) -> &SpatialIndexBuilder {
        &self.builder
    }

    /// Counter bumped by every user-visible scene change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Scene counters
    pub fn stats(&self) -> SceneStats {
        let builder = self.builder.stats();
        SceneStats {
            geometries: self.user_geometry_count(),
            instances: self.user_instance_count(),
            materials: self.materials.len(),
            textures: self.textures.len(),
            point_lights: self.lights.point_lights().len(),
            active_lights: self.lights.active_lights().len(),
            per_object_indices: self.builder.per_object_count(),
            compacted_bytes_saved: builder.compacted_bytes_saved,
            last_scene_mode: builder.last_scene_mode,
            degenerate: self.degenerate_state(),
        }
    }
}

fn upload_geometry<B: DeviceBackend>(backend: &mut B, geometry: &Geometry) -> DeviceResult<GeometryBuffers> {
    let usage = BufferUsage::STORAGE | BufferUsage::BUILD_INPUT;
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&geometry.vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&geometry.indices);
    let material_bytes: &[u8] = bytemuck::cast_slice(&geometry.mat_index);

    let vertices = backend.create_buffer(
        &BufferDesc::new(&format!("{} vertices", geometry.name), vertex_bytes.len() as u64, usage),
        Some(vertex_bytes),
    )?;
    let indices = match backend.create_buffer(
        &BufferDesc::new(&format!("{} indices", geometry.name), index_bytes.len() as u64, usage),
        Some(index_bytes),
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            backend.destroy_buffer(vertices);
            return Err(e);
        }
    };
    let material_indices = match backend.create_buffer(
        &BufferDesc::new(&format!("{} material indices", geometry.name), material_bytes.len() as u64, BufferUsage::STORAGE),
        Some(material_bytes),
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            backend.destroy_buffer(vertices);
            backend.destroy_buffer(indices);
            return Err(e);
        }
    };

    Ok(GeometryBuffers {
        vertices,
        indices,
        material_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessBackend;
    use crate::foundation::math::Vec3;

    fn manager() -> SceneResourceManager {
        SceneResourceManager::new(&RendererConfig::default())
    }

    fn cube(r: f32) -> MeshData {
        MeshData::cube(Material::diffuse(r, 0.5, 0.5))
    }

    #[test]
    fn test_new_scene_holds_only_the_placeholder() {
        let scene = manager();
        assert_eq!(scene.degenerate_state(), DegenerateState::DummyInjected);
        assert_eq!(scene.instances().count(), 1);
        assert_eq!(scene.stats().instances, 0);
        assert_eq!(scene.stats().geometries, 0);
    }

    #[test]
    fn test_material_index_covers_every_triangle() {
        let mut scene = manager();
        let key = scene.submit_geometry(cube(1.0), GeometryFlags::OPAQUE).unwrap();
        let geometry = scene.geometry(key).unwrap();
        assert_eq!(geometry.mat_index.len(), geometry.indices.len() / 3);
    }

    #[test]
    fn test_submeshes_map_to_deduplicated_materials() {
        let mut scene = manager();
        let red = Material::diffuse(1.0, 0.0, 0.0);
        let blue = Material::diffuse(0.0, 0.0, 1.0);
        let mut mesh = MeshData::cube(red.clone());
        mesh.submeshes = vec![
            Submesh { index_start: 0, index_count: 12, material: red.clone() },
            Submesh { index_start: 12, index_count: 12, material: blue },
            Submesh { index_start: 24, index_count: 12, material: red },
        ];

        let key = scene.submit_geometry(mesh, GeometryFlags::empty()).unwrap();
        let geometry = scene.geometry(key).unwrap();

        assert_eq!(scene.materials().len(), 2);
        assert_eq!(&geometry.mat_index[..4], &[0, 0, 0, 0]);
        assert_eq!(&geometry.mat_index[4..8], &[1, 1, 1, 1]);
        assert_eq!(&geometry.mat_index[8..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_geometry_capacity_leaves_state_unchanged() {
        let mut limits = SceneLimits::default();
        limits.max_geometries = 2;
        let mut scene = SceneResourceManager::new(&RendererConfig::default().with_limits(limits));
        scene.submit_geometry(cube(0.1), GeometryFlags::empty()).unwrap();
        scene.submit_geometry(cube(0.2), GeometryFlags::empty()).unwrap();
        let revision = scene.revision();

        let result = scene.submit_geometry(cube(0.3), GeometryFlags::empty());

        assert!(matches!(
            result,
            Err(SceneError::CapacityExceeded { resource: ResourceKind::Geometry, limit: 2 })
        ));
        assert_eq!(scene.stats().geometries, 2);
        assert_eq!(scene.materials().len(), 2);
        assert_eq!(scene.revision(), revision);
    }

    #[test]
    fn test_material_capacity_rejects_whole_geometry() {
        let mut limits = SceneLimits::default();
        limits.max_materials = 1;
        let mut scene = SceneResourceManager::new(&RendererConfig::default().with_limits(limits));
        scene.submit_geometry(cube(0.1), GeometryFlags::empty()).unwrap();

        let result = scene.submit_geometry(cube(0.9), GeometryFlags::empty());
        assert!(matches!(
            result,
            Err(SceneError::CapacityExceeded { resource: ResourceKind::Material, .. })
        ));
        assert_eq!(scene.stats().geometries, 1);

        // A geometry reusing the existing material still fits
        assert!(scene.submit_geometry(cube(0.1), GeometryFlags::empty()).is_ok());
    }

    #[test]
    fn test_instance_capacity() {
        let mut limits = SceneLimits::default();
        limits.max_instances = 1;
        let mut scene = SceneResourceManager::new(&RendererConfig::default().with_limits(limits));
        let geometry = scene.submit_geometry(cube(0.1), GeometryFlags::empty()).unwrap();
        scene.submit_instance(geometry, Mat4::identity()).unwrap();

        let result = scene.submit_instance(geometry, Mat4::identity());
        assert!(matches!(
            result,
            Err(SceneError::CapacityExceeded { resource: ResourceKind::Instance, limit: 1 })
        ));
        assert_eq!(scene.stats().instances, 1);
    }

    #[test]
    fn test_placeholder_cannot_be_removed_by_user() {
        let mut scene = manager();
        let placeholder = scene.placeholder_instance().unwrap();
        assert!(matches!(scene.remove_instance(placeholder), Err(SceneError::InvalidReference(_))));
        assert!(matches!(
            scene.set_instance_transform(placeholder, Mat4::identity()),
            Err(SceneError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_unknown_geometry_is_invalid_reference() {
        let mut scene = manager();
        let geometry = scene.submit_geometry(cube(0.1), GeometryFlags::empty()).unwrap();
        scene.remove_geometry(geometry).unwrap();

        assert!(matches!(scene.remove_geometry(geometry), Err(SceneError::InvalidReference(_))));
        assert!(matches!(
            scene.submit_instance(geometry, Mat4::identity()),
            Err(SceneError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_set_instances_validates_before_applying() {
        let mut scene = manager();
        let geometry = scene.submit_geometry(cube(0.1), GeometryFlags::empty()).unwrap();
        let first = scene.submit_instance(geometry, Mat4::identity()).unwrap();
        let stale = scene.submit_geometry(cube(0.2), GeometryFlags::empty()).unwrap();
        scene.remove_geometry(stale).unwrap();

        let result = scene.set_instances(&[(geometry, Mat4::identity()), (stale, Mat4::identity())]);
        assert!(result.is_err());
        assert!(scene.instance(first).is_some());
    }

    #[test]
    fn test_set_instances_to_empty_injects_placeholder() {
        let mut scene = manager();
        let geometry = scene.submit_geometry(cube(0.1), GeometryFlags::empty()).unwrap();
        scene.set_instances(&[(geometry, Mat4::identity()), (geometry, Mat4::identity())]).unwrap();
        assert_eq!(scene.degenerate_state(), DegenerateState::Populated);

        scene.set_instances(&[]).unwrap();
        assert_eq!(scene.degenerate_state(), DegenerateState::DummyInjected);
        assert_eq!(scene.instances().count(), 1);
    }

    #[test]
    fn test_hidden_toggle_marks_geometry_dirty_once() {
        let mut scene = manager();
        let mut backend = HeadlessBackend::new();
        let geometry = scene.submit_geometry(cube(0.1), GeometryFlags::empty()).unwrap();
        scene.submit_instance(geometry, Mat4::identity()).unwrap();
        scene.resolve(&mut backend).unwrap();

        scene.set_geometry_hidden(geometry, false).unwrap();
        assert!(!scene.geometries_dirty());

        scene.set_geometry_hidden(geometry, true).unwrap();
        assert!(scene.geometries_dirty());
        scene.resolve(&mut backend).unwrap();
        assert_eq!(scene.builder().slots()[0].primitive_count, 0);
    }

    #[test]
    fn test_camera_motion_moves_only_the_placeholder() {
        let mut scene = manager();
        let mut backend = HeadlessBackend::new();
        scene.resolve(&mut backend).unwrap();

        let camera = Camera::look_at(Vec3::new(3.0, 1.0, 4.0), Vec3::zeros(), 60.0);
        scene.prepare_frame(&camera);
        assert!(scene.instances_dirty());
        assert!(!scene.geometries_dirty());

        let report = scene.resolve(&mut backend).unwrap();
        assert!(!report.geometries_rebuilt);
        assert_eq!(report.scene_mode, Some(SceneBuildMode::Refit));

        scene.prepare_frame(&camera);
        assert!(!scene.instances_dirty());
    }

    #[test]
    fn test_lights_are_capacity_bounded() {
        let mut limits = SceneLimits::default();
        limits.max_active_lights = 1;
        let mut scene = SceneResourceManager::new(&RendererConfig::default().with_limits(limits));
        let light = ActiveLight {
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            cone_angle: 0.5,
        };
        scene.add_active_light(light).unwrap();
        assert!(scene.add_light(Light::Active(light)).is_err());
        assert_eq!(scene.stats().active_lights, 1);
    }

    #[test]
    fn test_environment_replacement_releases_old_texture() {
        let mut scene = manager();
        let mut backend = HeadlessBackend::new();
        scene.set_environment_map(EnvironmentMap::new("sky", ImageData::solid_color(4, 2, [10, 20, 30, 255])));
        let report = scene.resolve(&mut backend).unwrap();
        assert!(report.environment_updated);
        let first = scene.bindings().environment.unwrap();

        scene.set_environment_map(EnvironmentMap::new("dusk", ImageData::solid_color(4, 2, [90, 20, 30, 255])));
        scene.resolve(&mut backend).unwrap();
        assert_ne!(scene.bindings().environment, Some(first));
        assert_eq!(backend.live_textures(), 1);

        assert!(scene.remove_environment_map());
        scene.resolve(&mut backend).unwrap();
        assert_eq!(scene.bindings().environment, None);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut scene = manager();
        let mut backend = HeadlessBackend::new();
        let geometry = scene.submit_geometry(cube(0.4), GeometryFlags::OPAQUE).unwrap();
        scene.submit_instance(geometry, Mat4::identity()).unwrap();
        scene.set_environment_map(EnvironmentMap::new("sky", ImageData::solid_color(2, 2, [0, 0, 0, 255])));
        scene.resolve(&mut backend).unwrap();

        scene.shutdown(&mut backend);

        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_textures(), 0);
        assert_eq!(backend.live_structures(crate::device::StructureLevel::PerObject), 0);
        assert_eq!(backend.live_structures(crate::device::StructureLevel::Scene), 0);
    }
}
