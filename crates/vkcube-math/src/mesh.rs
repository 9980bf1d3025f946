// SPDX-License-Identifier: CEPL-1.0

/// 12 triangles, 3 vertices each, no index buffer.
pub const CUBE_VERTEX_COUNT: usize = 12 * 3;

#[rustfmt::skip]
pub const CUBE_POSITIONS: [[f32; 3]; CUBE_VERTEX_COUNT] = [
    // -X
    [-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0],
    [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0], [-1.0, -1.0, -1.0],
    // -Z
    [-1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0],
    [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0],
    // -Y
    [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0],
    [-1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0],
    // +Y
    [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0], [ 1.0,  1.0,  1.0],
    [-1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0,  1.0, -1.0],
    // +X
    [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0],
    [ 1.0, -1.0,  1.0], [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0],
    // +Z
    [-1.0,  1.0,  1.0], [-1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0],
    [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0],
];

#[rustfmt::skip]
pub const CUBE_UVS: [[f32; 2]; CUBE_VERTEX_COUNT] = [
    // -X
    [0.0, 1.0], [1.0, 1.0], [1.0, 0.0],
    [1.0, 0.0], [0.0, 0.0], [0.0, 1.0],
    // -Z
    [1.0, 1.0], [0.0, 0.0], [0.0, 1.0],
    [1.0, 1.0], [1.0, 0.0], [0.0, 0.0],
    // -Y
    [1.0, 0.0], [1.0, 1.0], [0.0, 1.0],
    [1.0, 0.0], [0.0, 1.0], [0.0, 0.0],
    // +Y
    [1.0, 0.0], [0.0, 0.0], [0.0, 1.0],
    [1.0, 0.0], [0.0, 1.0], [1.0, 1.0],
    // +X
    [1.0, 0.0], [0.0, 0.0], [0.0, 1.0],
    [0.0, 1.0], [1.0, 1.0], [1.0, 0.0],
    // +Z
    [0.0, 0.0], [0.0, 1.0], [1.0, 0.0],
    [0.0, 1.0], [1.0, 1.0], [1.0, 0.0],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_corner_is_on_the_unit_cube() {
        for p in CUBE_POSITIONS {
            assert!(p.iter().all(|c| c.abs() == 1.0));
        }
    }

    #[test]
    fn each_face_lies_in_one_plane() {
        for face in CUBE_POSITIONS.chunks(6) {
            let shared = (0..3).find(|&axis| face.iter().all(|v| v[axis] == face[0][axis]));
            assert!(shared.is_some(), "face {face:?} is not planar");
        }
    }
}
