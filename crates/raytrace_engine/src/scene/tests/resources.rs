//! Material and texture sharing, capacity and load failures

use std::path::PathBuf;

use crate::core::{RendererConfig, SceneLimits};
use crate::device::{DeviceOp, HeadlessBackend};
use crate::foundation::math::Mat4;
use crate::scene::{GeometryFlags, Material, MeshData, ResourceKind, SceneError, SceneResourceManager};

fn write_texture(name: &str, color: [u8; 4]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("raytrace_engine_{}_{}.png", name, std::process::id()));
    image::RgbaImage::from_pixel(4, 4, image::Rgba(color))
        .save(&path)
        .expect("write test texture");
    path
}

#[test]
fn test_shared_texture_is_loaded_once() {
    let texture = write_texture("shared", [200, 40, 40, 255]);
    let mut scene = SceneResourceManager::new(&RendererConfig::default());
    let mut backend = HeadlessBackend::new();

    let rough = Material::diffuse(1.0, 1.0, 1.0).with_texture(&texture);
    let shiny = rough.clone().with_metallic_roughness(0.9, 0.1);
    let a = scene.submit_geometry(MeshData::cube(rough.clone()), GeometryFlags::empty()).unwrap();
    let b = scene.submit_geometry(MeshData::cube(shiny), GeometryFlags::empty()).unwrap();
    let c = scene.submit_geometry(MeshData::plane(2.0, rough), GeometryFlags::empty()).unwrap();
    for key in [a, b, c] {
        scene.submit_instance(key, Mat4::identity()).unwrap();
    }

    let stats = scene.stats();
    assert_eq!(stats.materials, 2);
    assert_eq!(stats.textures, 1);

    scene.resolve(&mut backend).unwrap();
    assert_eq!(backend.count_ops(|op| matches!(op, DeviceOp::CreateTexture { .. })), 1);
    assert_eq!(scene.bindings().textures.len(), 1);

    let records = scene.materials().records();
    assert_eq!(records[0].diffuse_texture, 0);
    assert_eq!(records[1].diffuse_texture, 0);

    let _ = std::fs::remove_file(texture);
}

#[test]
fn test_missing_texture_rejects_geometry() {
    let mut scene = SceneResourceManager::new(&RendererConfig::default());
    let material = Material::diffuse(1.0, 1.0, 1.0).with_texture("/nonexistent/raytrace_engine/albedo.png");

    let result = scene.submit_geometry(MeshData::cube(material), GeometryFlags::empty());

    assert!(matches!(result, Err(SceneError::TextureLoad { .. })));
    assert_eq!(scene.stats().geometries, 0);
    assert_eq!(scene.stats().materials, 0);
    assert_eq!(scene.stats().textures, 0);
    // Only the placeholder remains pending
    assert!(scene.geometries_dirty());
}

#[test]
fn test_texture_capacity_leaves_state_unchanged() {
    let first = write_texture("capacity_a", [10, 10, 10, 255]);
    let second = write_texture("capacity_b", [90, 90, 90, 255]);
    let mut limits = SceneLimits::default();
    limits.max_textures = 1;
    let mut scene = SceneResourceManager::new(&RendererConfig::default().with_limits(limits));

    scene
        .submit_geometry(MeshData::cube(Material::default().with_texture(&first)), GeometryFlags::empty())
        .unwrap();
    let result = scene.submit_geometry(
        MeshData::cube(Material::diffuse(0.3, 0.3, 0.3).with_texture(&second)),
        GeometryFlags::empty(),
    );

    assert!(matches!(
        result,
        Err(SceneError::CapacityExceeded { resource: ResourceKind::Texture, limit: 1 })
    ));
    assert_eq!(scene.stats().geometries, 1);
    assert_eq!(scene.stats().materials, 1);
    assert_eq!(scene.stats().textures, 1);

    let _ = std::fs::remove_file(first);
    let _ = std::fs::remove_file(second);
}

#[test]
fn test_failed_texture_upload_frees_partial_uploads() {
    let first = write_texture("partial_a", [30, 60, 90, 255]);
    let second = write_texture("partial_b", [90, 60, 30, 255]);
    let mut scene = SceneResourceManager::new(&RendererConfig::default());
    let mut backend = HeadlessBackend::new();
    let a = scene
        .submit_geometry(MeshData::cube(Material::default().with_texture(&first)), GeometryFlags::OPAQUE)
        .unwrap();
    let b = scene
        .submit_geometry(MeshData::cube(Material::diffuse(0.5, 0.5, 0.5).with_texture(&second)), GeometryFlags::OPAQUE)
        .unwrap();
    scene.submit_instance(a, Mat4::identity()).unwrap();
    scene.submit_instance(b, Mat4::identity()).unwrap();

    backend.fail_nth("create_texture", 1);
    assert!(scene.resolve(&mut backend).is_err());
    assert_eq!(backend.live_textures(), 0);
    assert!(scene.geometries_dirty());

    scene.resolve(&mut backend).unwrap();
    assert_eq!(backend.live_textures(), 2);
    assert_eq!(scene.bindings().textures.len(), 2);

    let _ = std::fs::remove_file(first);
    let _ = std::fs::remove_file(second);
}

#[test]
fn test_material_slots_outlive_geometry_until_clear() {
    let mut limits = SceneLimits::default();
    limits.max_materials = 1;
    let mut scene = SceneResourceManager::new(&RendererConfig::default().with_limits(limits));

    let red = scene
        .submit_geometry(MeshData::cube(Material::diffuse(1.0, 0.0, 0.0)), GeometryFlags::empty())
        .unwrap();
    scene.remove_geometry(red).unwrap();

    let blue = MeshData::cube(Material::diffuse(0.0, 0.0, 1.0));
    let result = scene.submit_geometry(blue.clone(), GeometryFlags::empty());
    assert!(matches!(
        result,
        Err(SceneError::CapacityExceeded { resource: ResourceKind::Material, limit: 1 })
    ));

    scene.clear_scene();
    assert!(scene.submit_geometry(blue, GeometryFlags::empty()).is_ok());
    assert_eq!(scene.stats().materials, 1);
}

#[test]
fn test_untextured_materials_use_no_texture_sentinel() {
    let mut scene = SceneResourceManager::new(&RendererConfig::default());
    scene
        .submit_geometry(MeshData::cube(Material::diffuse(0.1, 0.2, 0.3)), GeometryFlags::empty())
        .unwrap();

    assert_eq!(scene.materials().records()[0].diffuse_texture, -1);
}
