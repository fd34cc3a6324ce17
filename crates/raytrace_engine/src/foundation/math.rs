//! Math utilities and types
//!
//! Provides the fundamental math types used by the scene model, the camera
//! and the device-side instance encoding.

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Extension trait for Mat4 with conversions needed by the device encoders
pub trait Mat4Ext {
    /// Top three rows in row-major order, the layout expected by
    /// acceleration-structure instance records.
    fn to_row_major_3x4(&self) -> [f32; 12];

    /// Column-major array form for uniform upload
    fn to_cols_array(&self) -> [[f32; 4]; 4];

    /// Translation component of an affine matrix
    fn translation_part(&self) -> Vec3;

    /// Inverse, or identity when the matrix is singular
    fn inverse_or_identity(&self) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn to_row_major_3x4(&self) -> [f32; 12] {
        let mut out = [0.0; 12];
        for row in 0..3 {
            for col in 0..4 {
                out[row * 4 + col] = self[(row, col)];
            }
        }
        out
    }

    fn to_cols_array(&self) -> [[f32; 4]; 4] {
        let mut out = [[0.0; 4]; 4];
        for (col, column) in out.iter_mut().enumerate() {
            for (row, value) in column.iter_mut().enumerate() {
                *value = self[(row, col)];
            }
        }
        out
    }

    fn translation_part(&self) -> Vec3 {
        Vec3::new(self[(0, 3)], self[(1, 3)], self[(2, 3)])
    }

    fn inverse_or_identity(&self) -> Mat4 {
        self.try_inverse().unwrap_or_else(Mat4::identity)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }
}
