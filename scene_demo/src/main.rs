//! Scene lifecycle demo
//!
//! Builds a field of spinning cubes, then adds and removes geometry while
//! frames are in flight. Runs on the headless backend unless `--vulkan` is
//! passed.
//!
//! Usage: `scene_demo [--vulkan] [--frames N] [--config renderer.toml]`

use rand::Rng;
use raytrace_engine::core::{Config, ConfigError, RendererConfig};
use raytrace_engine::device::{DeviceBackend, DeviceError, HeadlessBackend};
use raytrace_engine::foundation::logging;
use raytrace_engine::foundation::math::{Mat4, Vec3};
use raytrace_engine::render::{OffscreenTarget, RenderError, Renderer, VulkanBackend};
use raytrace_engine::scene::{
    Camera, DirectionalLight, GeometryFlags, GeometryKey, InstanceKey, Material, MeshData, PointLight, SceneError,
};
use thiserror::Error;

#[derive(Error, Debug)]
enum DemoError {
    #[error("Invalid arguments: {0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

struct Options {
    vulkan: bool,
    frames: u64,
    config: Option<String>,
}

impl Options {
    fn parse() -> Result<Self, DemoError> {
        let mut options = Self {
            vulkan: false,
            frames: 60,
            config: None,
        };
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--vulkan" => options.vulkan = true,
                "--frames" => {
                    let value = args.next().ok_or_else(|| DemoError::Usage("--frames needs a value".to_string()))?;
                    options.frames = value
                        .parse()
                        .map_err(|_| DemoError::Usage(format!("'{}' is not a frame count", value)))?;
                }
                "--config" => {
                    options.config =
                        Some(args.next().ok_or_else(|| DemoError::Usage("--config needs a path".to_string()))?);
                }
                other => return Err(DemoError::Usage(format!("unknown argument '{}'", other))),
            }
        }
        Ok(options)
    }
}

/// Spinning cube instance
struct Spinner {
    key: InstanceKey,
    position: Vec3,
    speed: f32,
}

impl Spinner {
    fn transform(&self, time: f32) -> Mat4 {
        Mat4::new_translation(&self.position) * Mat4::new_rotation(Vec3::y() * (time * self.speed))
    }
}

struct DemoScene {
    cube: GeometryKey,
    spinners: Vec<Spinner>,
    extra: Option<GeometryKey>,
}

fn build_scene<B: DeviceBackend>(renderer: &mut Renderer<B, OffscreenTarget>) -> Result<DemoScene, DemoError> {
    let mut rng = rand::thread_rng();
    let scene = renderer.scene_mut();

    let ground = scene.submit_geometry(MeshData::plane(40.0, Material::diffuse(0.6, 0.6, 0.6)), GeometryFlags::OPAQUE)?;
    scene.submit_instance(ground, Mat4::identity())?;

    let cube_material = Material::diffuse(0.8, 0.3, 0.2).with_metallic_roughness(0.1, 0.4);
    let cube = scene.submit_geometry(MeshData::cube(cube_material), GeometryFlags::OPAQUE | GeometryFlags::DYNAMIC)?;

    let mut spinners = Vec::new();
    for x in -3..=3 {
        for z in -3..=3 {
            let position = Vec3::new(x as f32 * 3.0, 1.0 + rng.gen_range(0.0..1.5), z as f32 * 3.0);
            let spinner = Spinner {
                key: scene.submit_instance(cube, Mat4::new_translation(&position))?,
                position,
                speed: rng.gen_range(0.5..2.0),
            };
            spinners.push(spinner);
        }
    }

    scene.set_directional_light(Some(DirectionalLight {
        direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
        color: Vec3::new(1.0, 0.95, 0.9),
        intensity: 2.0,
    }));
    for i in 0..4 {
        let angle = i as f32 * std::f32::consts::FRAC_PI_2;
        scene.add_point_light(PointLight {
            position: Vec3::new(angle.cos() * 8.0, 4.0, angle.sin() * 8.0),
            color: Vec3::new(rng.gen_range(0.5..1.0), rng.gen_range(0.5..1.0), rng.gen_range(0.5..1.0)),
            intensity: 20.0,
            radius: 0.25,
        })?;
    }

    log::info!("Scene built: {} spinning cubes", spinners.len());
    Ok(DemoScene {
        cube,
        spinners,
        extra: None,
    })
}

fn run<B: DeviceBackend>(config: &RendererConfig, backend: B, frames: u64) -> Result<(), DemoError> {
    let target = OffscreenTarget::new(config.output_extent.width, config.output_extent.height);
    let mut renderer = Renderer::new(config, backend, target)?;
    log::info!("Rendering {} frames on the {} backend", frames, renderer.backend().name());

    let mut demo = build_scene(&mut renderer)?;
    let camera = Camera::look_at(Vec3::new(0.0, 12.0, 24.0), Vec3::zeros(), 50.0);

    for frame in 0..frames {
        let time = frame as f32 / 60.0;
        for spinner in &demo.spinners {
            renderer.scene_mut().set_instance_transform(spinner.key, spinner.transform(time))?;
        }

        // Exercise full rebuilds and deferred release alongside refits
        if frame == frames / 3 {
            let tower = MeshData::cube(Material::diffuse(0.2, 0.4, 0.9).with_emission([0.5, 0.5, 1.0]));
            let key = renderer.scene_mut().submit_geometry(tower, GeometryFlags::OPAQUE)?;
            renderer
                .scene_mut()
                .submit_instance(key, Mat4::new_translation(&Vec3::new(0.0, 3.0, 0.0)) * Mat4::new_scaling(2.0))?;
            demo.extra = Some(key);
        } else if frame == 2 * frames / 3 {
            if let Some(key) = demo.extra.take() {
                renderer.scene_mut().remove_geometry(key)?;
            }
        }

        if frame == frames / 2 {
            renderer.target_mut().resize(
                config.output_extent.width / 2,
                config.output_extent.height / 2,
            );
        }

        let report = renderer.render_frame(&camera)?;
        if report.resolve.geometries_rebuilt || report.refreshed {
            log::info!(
                "Frame {}: rebuilt={} scene={:?} released={} refreshed={}",
                report.frame_number,
                report.resolve.geometries_rebuilt,
                report.resolve.scene_mode,
                report.resolve.released,
                report.refreshed
            );
        } else {
            log::debug!(
                "Frame {} slot {}: scene={:?} accumulated={}",
                report.frame_number,
                report.slot,
                report.resolve.scene_mode,
                report.accumulated_frames
            );
        }
    }

    let stats = renderer.scene().stats();
    log::info!(
        "Done: {} geometries, {} instances, {} per-object indices, {} bytes saved by compaction",
        stats.geometries,
        stats.instances,
        stats.per_object_indices,
        stats.compacted_bytes_saved
    );
    log::info!(
        "Cube geometry index {:?}, {} presented frames",
        renderer.scene().geometry_index(demo.cube),
        renderer.target().presented_frames().len()
    );

    renderer.shutdown()?;
    Ok(())
}

fn main() {
    logging::init();

    let result = Options::parse().and_then(|options| {
        let config = match &options.config {
            Some(path) => RendererConfig::load_from_file(path)?,
            None => RendererConfig::default(),
        };
        if options.vulkan {
            let backend = VulkanBackend::new(&config)?;
            run(&config, backend, options.frames)
        } else {
            run(&config, HeadlessBackend::new(), options.frames)
        }
    });

    if let Err(e) = result {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}
