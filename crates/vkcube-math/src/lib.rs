// SPDX-License-Identifier: CEPL-1.0
//! Scene math for the spinning cube: camera matrices, the model rotation and
//! the uniform block the vertex shader reads.
mod mesh;
mod scene;
mod uniform;

pub use mesh::{CUBE_POSITIONS, CUBE_UVS, CUBE_VERTEX_COUNT};
pub use scene::{orthonormalize, CubeScene};
pub use uniform::CubeUniform;

pub use glam::{Mat4, Vec3};
