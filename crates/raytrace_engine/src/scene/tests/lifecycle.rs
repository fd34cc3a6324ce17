//! Geometry and instance lifecycle through repeated resolutions

use crate::accel::SceneBuildMode;
use crate::core::RendererConfig;
use crate::device::{DeviceOp, HeadlessBackend, StructureLevel};
use crate::foundation::logging;
use crate::foundation::math::{Mat4, Vec3};
use crate::scene::{
    Camera, DegenerateState, GeometryFlags, GeometryKey, Material, MeshData, SceneResourceManager,
};

fn scene_with_geometries(count: usize) -> (SceneResourceManager, Vec<GeometryKey>) {
    logging::init_for_tests();
    let mut scene = SceneResourceManager::new(&RendererConfig::default());
    let keys = (0..count)
        .map(|i| {
            let material = Material::diffuse(0.2 * i as f32, 0.5, 0.5);
            scene.submit_geometry(MeshData::cube(material), GeometryFlags::OPAQUE).unwrap()
        })
        .collect();
    (scene, keys)
}

fn per_object_builds(backend: &HeadlessBackend) -> usize {
    backend.count_ops(|op| matches!(op, DeviceOp::BuildStructures { per_object, .. } if *per_object > 0))
}

#[test]
fn test_transform_change_refits_without_touching_per_object_indices() {
    let (mut scene, geometries) = scene_with_geometries(3);
    let mut backend = HeadlessBackend::new();
    let instances: Vec<_> = geometries
        .iter()
        .enumerate()
        .map(|(i, &g)| {
            let offset = Mat4::new_translation(&Vec3::new(i as f32 * 2.0, 0.0, 0.0));
            scene.submit_instance(g, offset).unwrap()
        })
        .collect();

    let first = scene.resolve(&mut backend).unwrap();
    assert!(first.geometries_rebuilt);
    assert_eq!(first.per_object_indices, 3);
    assert_eq!(first.scene_mode, Some(SceneBuildMode::FullBuild));
    assert!(scene.bindings().is_traceable());
    assert_eq!(scene.bindings().instance_count, 3);

    backend.clear_ops();
    scene
        .set_instance_transform(instances[1], Mat4::new_translation(&Vec3::new(0.0, 4.0, 0.0)))
        .unwrap();
    let second = scene.resolve(&mut backend).unwrap();

    assert!(!second.geometries_rebuilt);
    assert_eq!(second.scene_mode, Some(SceneBuildMode::Refit));
    assert_eq!(per_object_builds(&backend), 0);
    assert_eq!(
        backend.count_ops(|op| matches!(op, DeviceOp::BuildStructures { scene: 1, updates: 1, .. })),
        1
    );
    assert!(backend.hazards().is_empty());
}

#[test]
fn test_adding_and_removing_instances_over_same_geometries_refits() {
    let (mut scene, geometries) = scene_with_geometries(2);
    let mut backend = HeadlessBackend::new();
    for &geometry in &geometries {
        scene.submit_instance(geometry, Mat4::identity()).unwrap();
    }
    let first = scene.resolve(&mut backend).unwrap();
    assert_eq!(first.scene_mode, Some(SceneBuildMode::FullBuild));

    let extra = scene
        .submit_instance(geometries[0], Mat4::new_translation(&Vec3::new(3.0, 0.0, 0.0)))
        .unwrap();
    let added = scene.resolve(&mut backend).unwrap();
    assert!(!added.geometries_rebuilt);
    assert_eq!(added.per_object_indices, 2);
    assert_eq!(added.scene_mode, Some(SceneBuildMode::Refit));
    assert_eq!(scene.bindings().instance_count, 3);

    scene.remove_instance(extra).unwrap();
    let removed = scene.resolve(&mut backend).unwrap();
    assert_eq!(removed.scene_mode, Some(SceneBuildMode::Refit));
    assert_eq!(scene.bindings().instance_count, 2);
    assert!(backend.hazards().is_empty());
}

#[test]
fn test_clean_scene_resolves_without_device_work() {
    let (mut scene, geometries) = scene_with_geometries(1);
    let mut backend = HeadlessBackend::new();
    scene.submit_instance(geometries[0], Mat4::identity()).unwrap();
    scene.resolve(&mut backend).unwrap();
    assert!(!scene.needs_device_sync());

    backend.clear_ops();
    let report = scene.resolve(&mut backend).unwrap();

    assert!(!report.changed_scene());
    assert!(backend.ops().is_empty());
}

#[test]
fn test_placeholder_lifecycle() {
    let (mut scene, geometries) = scene_with_geometries(1);
    let mut backend = HeadlessBackend::new();

    // Geometry alone keeps the scene degenerate
    let report = scene.resolve(&mut backend).unwrap();
    assert_eq!(scene.degenerate_state(), DegenerateState::DummyInjected);
    assert_eq!(report.per_object_indices, 2);
    assert_eq!(scene.bindings().instance_count, 1);

    let instance = scene.submit_instance(geometries[0], Mat4::identity()).unwrap();
    assert_eq!(scene.degenerate_state(), DegenerateState::Populated);
    assert_eq!(scene.placeholder_instance(), None);
    assert_eq!(scene.geometry_index(geometries[0]), Some(0));

    let report = scene.resolve(&mut backend).unwrap();
    assert_eq!(report.per_object_indices, 1);
    assert_eq!(scene.bindings().instance_count, 1);

    scene.remove_instance(instance).unwrap();
    assert_eq!(scene.degenerate_state(), DegenerateState::DummyInjected);
    let placeholder = scene.placeholder_instance().unwrap();
    assert_eq!(scene.instance(placeholder).unwrap().mask, 0);

    let report = scene.resolve(&mut backend).unwrap();
    assert_eq!(report.scene_mode, Some(SceneBuildMode::FullBuild));
    assert_eq!(scene.bindings().instance_count, 1);
    assert!(backend.hazards().is_empty());
}

#[test]
fn test_placeholder_follows_camera() {
    let mut scene = SceneResourceManager::new(&RendererConfig::default());
    let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), 45.0);
    scene.prepare_frame(&camera);

    let placeholder = scene.placeholder_instance().unwrap();
    let transform = scene.instance(placeholder).unwrap().transform;
    let position = Vec3::new(transform[(0, 3)], transform[(1, 3)], transform[(2, 3)]);

    // Behind the camera along its view axis
    assert!((position - camera.position).dot(&camera.forward) < 0.0);
}

#[test]
fn test_removing_geometry_cascades_and_reindexes() {
    let (mut scene, geometries) = scene_with_geometries(3);
    let mut backend = HeadlessBackend::new();
    let first = scene.submit_instance(geometries[0], Mat4::identity()).unwrap();
    let doomed = scene.submit_instance(geometries[1], Mat4::identity()).unwrap();
    let doomed_too = scene.submit_instance(geometries[1], Mat4::identity()).unwrap();
    let last = scene.submit_instance(geometries[2], Mat4::identity()).unwrap();
    scene.resolve(&mut backend).unwrap();

    scene.remove_geometry(geometries[1]).unwrap();

    assert!(scene.instance(doomed).is_none());
    assert!(scene.instance(doomed_too).is_none());
    assert_eq!(scene.geometry_index(geometries[2]), Some(1));
    assert_eq!(scene.instance_geometry_index(first), Some(0));
    assert_eq!(scene.instance_geometry_index(last), Some(1));
    for (index, geometry) in scene.geometries().iter().enumerate() {
        assert_eq!(geometry.geometry_index as usize, index);
    }

    let report = scene.resolve(&mut backend).unwrap();
    assert_eq!(report.per_object_indices, 2);
    assert_eq!(report.released, 3);
    assert_eq!(report.scene_mode, Some(SceneBuildMode::FullBuild));
    assert_eq!(scene.bindings().instance_count, 2);
    assert_eq!(backend.live_structures(StructureLevel::PerObject), 2);
}

#[test]
fn test_removing_last_geometry_restores_placeholder() {
    let (mut scene, geometries) = scene_with_geometries(1);
    let mut backend = HeadlessBackend::new();
    scene.submit_instance(geometries[0], Mat4::identity()).unwrap();
    scene.resolve(&mut backend).unwrap();

    scene.remove_geometry(geometries[0]).unwrap();

    assert_eq!(scene.degenerate_state(), DegenerateState::DummyInjected);
    let report = scene.resolve(&mut backend).unwrap();
    assert_eq!(report.per_object_indices, 1);
    assert!(scene.bindings().is_traceable());
}

#[test]
fn test_hidden_geometry_keeps_its_slot() {
    let (mut scene, geometries) = scene_with_geometries(2);
    let mut backend = HeadlessBackend::new();
    let hidden_instance = scene.submit_instance(geometries[0], Mat4::identity()).unwrap();
    scene.submit_instance(geometries[1], Mat4::identity()).unwrap();
    scene.resolve(&mut backend).unwrap();

    scene.set_geometry_hidden(geometries[0], true).unwrap();
    let report = scene.resolve(&mut backend).unwrap();

    assert!(report.geometries_rebuilt);
    assert_eq!(report.per_object_indices, 2);
    assert_eq!(scene.instance_geometry_index(hidden_instance), Some(0));
    let slot = &scene.builder().slots()[0];
    assert_eq!(backend.structure_primitive_count(slot.structure), Some(0));

    scene.set_geometry_hidden(geometries[0], false).unwrap();
    scene.resolve(&mut backend).unwrap();
    let slot = &scene.builder().slots()[0];
    assert_eq!(backend.structure_primitive_count(slot.structure), Some(12));
}

#[test]
fn test_failed_upload_keeps_geometry_dirty() {
    let (mut scene, geometries) = scene_with_geometries(1);
    let mut backend = HeadlessBackend::new();
    scene.submit_instance(geometries[0], Mat4::identity()).unwrap();

    backend.fail_next("build_structures");
    assert!(scene.resolve(&mut backend).is_err());
    assert!(scene.geometries_dirty());
    assert!(!scene.bindings().is_traceable());

    let report = scene.resolve(&mut backend).unwrap();
    assert!(report.geometries_rebuilt);
    assert!(scene.bindings().is_traceable());
    assert!(!scene.needs_device_sync());
}

#[test]
fn test_clear_scene_frees_user_resources() {
    let (mut scene, geometries) = scene_with_geometries(2);
    let mut backend = HeadlessBackend::new();
    for &g in &geometries {
        scene.submit_instance(g, Mat4::identity()).unwrap();
    }
    scene.resolve(&mut backend).unwrap();

    scene.clear_scene();
    assert_eq!(scene.stats().geometries, 0);
    assert_eq!(scene.stats().materials, 0);
    assert_eq!(scene.degenerate_state(), DegenerateState::DummyInjected);

    let report = scene.resolve(&mut backend).unwrap();
    assert_eq!(report.released, 6);
    assert_eq!(report.per_object_indices, 1);
    assert!(backend.hazards().is_empty());
}
