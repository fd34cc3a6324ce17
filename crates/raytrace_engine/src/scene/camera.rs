//! # Camera
//!
//! Pinhole camera consumed by the trace pass through the frame uniforms. The
//! trace generates primary rays from the inverse view and projection
//! matrices, so the camera only needs to produce those two matrices.
//!
//! Uses a right-handed Y-up world with the camera looking along `forward`.

use crate::foundation::math::{utils, Mat4, Point3, Vec3};

/// Tolerance under which two cameras count as the same pose
const POSE_EPSILON: f32 = 1e-5;

/// Perspective camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Position in world space
    pub position: Vec3,
    /// Unit view direction
    pub forward: Vec3,
    /// Up vector used to orient the view
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near plane distance used for the projection matrix
    pub near: f32,
    /// Far plane distance used for the projection matrix
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::zeros(), 60.0)
    }
}

impl Camera {
    /// Camera at `position` looking at `target`
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `target` - Point to look at; must differ from `position`
    /// * `fov_degrees` - Vertical field of view in degrees
    pub fn look_at(position: Vec3, target: Vec3, fov_degrees: f32) -> Self {
        let forward = (target - position)
            .try_normalize(f32::EPSILON)
            .unwrap_or(Vec3::new(0.0, 0.0, -1.0));
        Self {
            position,
            forward,
            up: Vec3::new(0.0, 1.0, 0.0),
            fov_y: utils::deg_to_rad(fov_degrees),
            near: 0.1,
            far: 1000.0,
        }
    }

    /// Move the camera, keeping its direction
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Point the camera at `target`
    pub fn set_target(&mut self, target: Vec3) {
        if let Some(forward) = (target - self.position).try_normalize(f32::EPSILON) {
            self.forward = forward;
        }
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        let eye = Point3::from(self.position);
        let target = Point3::from(self.position + self.forward);
        Mat4::look_at_rh(&eye, &target, &self.up)
    }

    /// View-to-clip matrix for an output of the given aspect ratio
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::new_perspective(aspect.max(f32::EPSILON), self.fov_y, self.near, self.far)
    }

    /// Whether `other` differs from this pose enough to invalidate accumulation
    pub fn moved_from(&self, other: &Camera) -> bool {
        (self.position - other.position).norm() > POSE_EPSILON
            || (self.forward - other.forward).norm() > POSE_EPSILON
            || (self.up - other.up).norm() > POSE_EPSILON
            || (self.fov_y - other.fov_y).abs() > POSE_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_look_at_normalizes_forward() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), 45.0);
        assert_relative_eq!(camera.forward.norm(), 1.0);
        assert_relative_eq!(camera.forward.z, -1.0);
    }

    #[test]
    fn test_view_matrix_maps_position_to_origin() {
        let camera = Camera::look_at(Vec3::new(1.0, 2.0, 3.0), Vec3::zeros(), 45.0);
        let eye = camera.view_matrix().transform_point(&Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(eye.coords.norm(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_moved_from_detects_translation_only_above_epsilon() {
        let camera = Camera::default();
        let mut nudged = camera;
        nudged.position.x += 1e-7;
        assert!(!nudged.moved_from(&camera));

        nudged.set_position(Vec3::new(1.0, 0.0, 5.0));
        assert!(nudged.moved_from(&camera));
    }

    #[test]
    fn test_degenerate_target_keeps_direction() {
        let mut camera = Camera::default();
        let before = camera.forward;
        camera.set_target(camera.position);
        assert_eq!(camera.forward, before);
    }
}
