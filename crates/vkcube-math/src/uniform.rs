// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::mesh::{CUBE_POSITIONS, CUBE_UVS, CUBE_VERTEX_COUNT};

/// Uniform block layout shared with `cube.vert` (std140, vec4-aligned).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CubeUniform {
    pub mvp: [[f32; 4]; 4],
    pub position: [[f32; 4]; CUBE_VERTEX_COUNT],
    pub attr: [[f32; 4]; CUBE_VERTEX_COUNT],
}

impl CubeUniform {
    pub const SIZE: usize = std::mem::size_of::<CubeUniform>();

    pub fn new(mvp: Mat4) -> Self {
        let mut u = Self::zeroed();
        u.mvp = mvp.to_cols_array_2d();
        for (i, (p, uv)) in CUBE_POSITIONS.iter().zip(CUBE_UVS.iter()).enumerate() {
            u.position[i] = [p[0], p[1], p[2], 1.0];
            u.attr[i] = [uv[0], uv[1], 0.0, 0.0];
        }
        u
    }

    /// Only the matrix changes per frame; it sits at offset 0.
    pub fn mvp_bytes(mvp: &Mat4) -> [u8; 64] {
        bytemuck::cast(mvp.to_cols_array())
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
