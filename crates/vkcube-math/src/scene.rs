// SPDX-License-Identifier: CEPL-1.0
use glam::{Mat4, Vec3, Vec4};

use crate::uniform::CubeUniform;

const EYE: Vec3 = Vec3::new(0.0, 3.0, 5.0);
const ORIGIN: Vec3 = Vec3::ZERO;
const UP: Vec3 = Vec3::Y;

/// Camera and model transforms. The model matrix accumulates one Y rotation
/// per drawn frame.
#[derive(Clone, Copy, Debug)]
pub struct CubeScene {
    projection: Mat4,
    view: Mat4,
    model: Mat4,
}

impl Default for CubeScene {
    fn default() -> Self {
        Self::new()
    }
}

impl CubeScene {
    pub fn new() -> Self {
        let mut projection = Mat4::perspective_rh_gl(45f32.to_radians(), 1.0, 0.1, 100.0);
        // Vulkan clip space has +Y pointing down.
        projection.y_axis.y *= -1.0;
        Self {
            projection,
            view: Mat4::look_at_rh(EYE, ORIGIN, UP),
            model: Mat4::IDENTITY,
        }
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn model(&self) -> Mat4 {
        self.model
    }

    pub fn mvp(&self) -> Mat4 {
        self.projection * self.view * self.model
    }

    /// Rotate the model about Y by `degrees`, re-orthonormalize it and return
    /// the new MVP.
    pub fn spin(&mut self, degrees: f32) -> Mat4 {
        // Positive angles turn +X toward +Z.
        let rotated = self.model * Mat4::from_rotation_y(-degrees.to_radians());
        self.model = orthonormalize(rotated);
        self.mvp()
    }

    /// Full payload written into every uniform buffer at prepare time.
    pub fn initial_uniform(&self) -> CubeUniform {
        CubeUniform::new(self.mvp())
    }
}

/// Gram-Schmidt on the upper 3x3, starting from the Z column. Translation and
/// the W row are left untouched.
pub fn orthonormalize(m: Mat4) -> Mat4 {
    let z = m.z_axis.truncate().normalize();
    let y = m.y_axis.truncate();
    let y = (y - z * y.dot(z)).normalize();
    let x = m.x_axis.truncate();
    let x = (x - y * x.dot(y) - z * x.dot(z)).normalize();
    Mat4::from_cols(
        x.extend(m.x_axis.w),
        y.extend(m.y_axis.w),
        z.extend(m.z_axis.w),
        m.w_axis,
    )
}
