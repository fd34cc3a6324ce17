//! Scene lights
//!
//! Lights are tagged variants with one fixed-capacity array per kind. The
//! arrays are copied into the per-slot frame uniforms every frame, so light
//! changes never touch buffers a frame in flight may still read.

use super::error::{ResourceKind, SceneError, SceneResult};
use crate::foundation::math::Vec3;

/// Size of the point light array in the frame uniforms
pub const MAX_POINT_LIGHTS: usize = 32;

/// Size of the projector light array in the frame uniforms
pub const MAX_ACTIVE_LIGHTS: usize = 8;

/// Sun-like light at infinity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in
    pub direction: Vec3,
    /// Linear colour
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
}

/// Omnidirectional light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// World position
    pub position: Vec3,
    /// Linear colour
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Emitter radius for soft shadows
    pub radius: f32,
}

/// Projector-style spot light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveLight {
    /// World position
    pub position: Vec3,
    /// Projection direction
    pub direction: Vec3,
    /// Linear colour
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Half-angle of the projection cone in radians
    pub cone_angle: f32,
}

/// Any light
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    /// Directional light (at most one)
    Directional(DirectionalLight),
    /// Point light
    Point(PointLight),
    /// Projector light
    Active(ActiveLight),
}

/// Directional light record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuDirectionalLight {
    /// xyz direction, w = 1 when enabled
    pub direction: [f32; 4],
    /// rgb colour, w = intensity
    pub color: [f32; 4],
}

/// Point light record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuPointLight {
    /// xyz position, w = radius
    pub position: [f32; 4],
    /// rgb colour, w = intensity
    pub color: [f32; 4],
}

/// Projector light record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuActiveLight {
    /// xyz position, w = cone angle
    pub position: [f32; 4],
    /// xyz direction, w unused
    pub direction: [f32; 4],
    /// rgb colour, w = intensity
    pub color: [f32; 4],
}

/// Light arrays as laid out in the frame uniforms
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuLightBlock {
    /// Directional light
    pub directional: GpuDirectionalLight,
    /// Point lights, `counts[0]` valid
    pub point: [GpuPointLight; MAX_POINT_LIGHTS],
    /// Projector lights, `counts[1]` valid
    pub active: [GpuActiveLight; MAX_ACTIVE_LIGHTS],
    /// Point count, active count, padding
    pub counts: [u32; 4],
}

unsafe impl bytemuck::Pod for GpuDirectionalLight {}
unsafe impl bytemuck::Zeroable for GpuDirectionalLight {}
unsafe impl bytemuck::Pod for GpuPointLight {}
unsafe impl bytemuck::Zeroable for GpuPointLight {}
unsafe impl bytemuck::Pod for GpuActiveLight {}
unsafe impl bytemuck::Zeroable for GpuActiveLight {}
unsafe impl bytemuck::Pod for GpuLightBlock {}
unsafe impl bytemuck::Zeroable for GpuLightBlock {}

/// Capacity-bounded light collection
#[derive(Debug, Clone)]
pub struct LightSet {
    directional: Option<DirectionalLight>,
    point: Vec<PointLight>,
    active: Vec<ActiveLight>,
    max_point: usize,
    max_active: usize,
}

impl LightSet {
    /// Create an empty set with the given capacities (clamped to the array sizes)
    pub fn new(max_point: usize, max_active: usize) -> Self {
        Self {
            directional: None,
            point: Vec::new(),
            active: Vec::new(),
            max_point: max_point.min(MAX_POINT_LIGHTS),
            max_active: max_active.min(MAX_ACTIVE_LIGHTS),
        }
    }

    /// Set or clear the directional light
    pub fn set_directional(&mut self, light: Option<DirectionalLight>) {
        self.directional = light;
    }

    /// Add a point light, returning its slot
    pub fn add_point(&mut self, light: PointLight) -> SceneResult<usize> {
        if self.point.len() >= self.max_point {
            return Err(SceneError::CapacityExceeded {
                resource: ResourceKind::PointLight,
                limit: self.max_point,
            });
        }
        self.point.push(light);
        Ok(self.point.len() - 1)
    }

    /// Add a projector light, returning its slot
    pub fn add_active(&mut self, light: ActiveLight) -> SceneResult<usize> {
        if self.active.len() >= self.max_active {
            return Err(SceneError::CapacityExceeded {
                resource: ResourceKind::ActiveLight,
                limit: self.max_active,
            });
        }
        self.active.push(light);
        Ok(self.active.len() - 1)
    }

    /// Add any light; a directional light replaces the current one
    pub fn add(&mut self, light: Light) -> SceneResult<()> {
        match light {
            Light::Directional(directional) => self.set_directional(Some(directional)),
            Light::Point(point) => {
                self.add_point(point)?;
            }
            Light::Active(active) => {
                self.add_active(active)?;
            }
        }
        Ok(())
    }

    /// Remove every light
    pub fn clear(&mut self) {
        self.directional = None;
        self.point.clear();
        self.active.clear();
    }

    /// Directional light
    pub fn directional(&self) -> Option<&DirectionalLight> {
        self.directional.as_ref()
    }

    /// Point lights
    pub fn point_lights(&self) -> &[PointLight] {
        &self.point
    }

    /// Projector lights
    pub fn active_lights(&self) -> &[ActiveLight] {
        &self.active
    }

    /// Pack into the uniform layout
    pub fn to_gpu(&self) -> GpuLightBlock {
        let mut block: GpuLightBlock = bytemuck::Zeroable::zeroed();

        if let Some(light) = &self.directional {
            let direction = light.direction.try_normalize(f32::EPSILON).unwrap_or(Vec3::new(0.0, -1.0, 0.0));
            block.directional = GpuDirectionalLight {
                direction: [direction.x, direction.y, direction.z, 1.0],
                color: [light.color.x, light.color.y, light.color.z, light.intensity],
            };
        }
        for (slot, light) in block.point.iter_mut().zip(&self.point) {
            *slot = GpuPointLight {
                position: [light.position.x, light.position.y, light.position.z, light.radius],
                color: [light.color.x, light.color.y, light.color.z, light.intensity],
            };
        }
        for (slot, light) in block.active.iter_mut().zip(&self.active) {
            *slot = GpuActiveLight {
                position: [light.position.x, light.position.y, light.position.z, light.cone_angle],
                direction: [light.direction.x, light.direction.y, light.direction.z, 0.0],
                color: [light.color.x, light.color.y, light.color.z, light.intensity],
            };
        }
        block.counts = [self.point.len() as u32, self.active.len() as u32, 0, 0];
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f32) -> PointLight {
        PointLight {
            position: Vec3::new(x, 2.0, 0.0),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 10.0,
            radius: 0.1,
        }
    }

    #[test]
    fn test_point_light_capacity_rejects_overflow() {
        let mut lights = LightSet::new(2, 1);
        lights.add_point(point(0.0)).unwrap();
        lights.add_point(point(1.0)).unwrap();

        let result = lights.add_point(point(2.0));
        assert!(matches!(
            result,
            Err(SceneError::CapacityExceeded { resource: ResourceKind::PointLight, limit: 2 })
        ));
        assert_eq!(lights.point_lights().len(), 2);
    }

    #[test]
    fn test_capacity_clamped_to_array_size() {
        let mut lights = LightSet::new(1000, 1000);
        for i in 0..MAX_POINT_LIGHTS {
            lights.add_point(point(i as f32)).unwrap();
        }
        assert!(lights.add_point(point(-1.0)).is_err());
    }

    #[test]
    fn test_directional_light_replaced() {
        let mut lights = LightSet::new(4, 4);
        let sun = DirectionalLight {
            direction: Vec3::new(0.0, -2.0, 0.0),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 3.0,
        };
        lights.add(Light::Directional(sun)).unwrap();
        lights.add(Light::Directional(DirectionalLight { intensity: 5.0, ..sun })).unwrap();

        let block = lights.to_gpu();
        assert_eq!(block.directional.color[3], 5.0);
        assert_eq!(block.directional.direction, [0.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gpu_block_counts() {
        let mut lights = LightSet::new(4, 4);
        lights.add_point(point(3.0)).unwrap();
        let block = lights.to_gpu();

        assert_eq!(block.counts[0], 1);
        assert_eq!(block.counts[1], 0);
        assert_eq!(block.point[0].position[0], 3.0);
        assert_eq!(block.directional.direction[3], 0.0);
    }
}
