//! Per-frame data contracts
//!
//! The caller updates these once per tick before recording; layouts are
//! fixed and shared with the shaders.

use bytemuck::{Pod, Zeroable};
use nalgebra::Matrix4;

/// The global uniform block: `{model, view, projection}`.
///
/// Written every frame through the uniform buffer's persistent mapping.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneUniforms {
    /// Scene-level model transform.
    pub model: [[f32; 4]; 4],
    /// View matrix.
    pub view: [[f32; 4]; 4],
    /// Projection matrix.
    pub proj: [[f32; 4]; 4],
}

impl SceneUniforms {
    /// Pack nalgebra matrices into the shader layout.
    pub fn new(model: &Matrix4<f32>, view: &Matrix4<f32>, proj: &Matrix4<f32>) -> Self {
        Self {
            model: (*model).into(),
            view: (*view).into(),
            proj: (*proj).into(),
        }
    }
}

impl Default for SceneUniforms {
    fn default() -> Self {
        let identity = Matrix4::identity();
        Self::new(&identity, &identity, &identity)
    }
}

/// Per-mesh push-constant block: `{model_matrix}`, 64 bytes, vertex stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MeshPushConstants {
    /// Mesh model transform.
    pub model_matrix: [[f32; 4]; 4],
}

impl MeshPushConstants {
    /// Pack a nalgebra matrix into the shader layout.
    pub fn new(model_matrix: &Matrix4<f32>) -> Self {
        Self {
            model_matrix: (*model_matrix).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn uniform_block_is_three_packed_mat4s() {
        assert_eq!(mem::size_of::<SceneUniforms>(), 3 * 64);
    }

    #[test]
    fn push_constant_block_is_one_mat4() {
        assert_eq!(mem::size_of::<MeshPushConstants>(), 64);
    }

    #[test]
    fn matrices_pack_column_major() {
        let mut m = Matrix4::identity();
        m[(0, 3)] = 5.0; // translation x lives in column 3
        let packed = MeshPushConstants::new(&m);
        assert_eq!(packed.model_matrix[3][0], 5.0);
    }

    #[test]
    fn packing_preserves_every_element() {
        use approx::assert_relative_eq;

        let m = Matrix4::new_rotation(nalgebra::Vector3::new(0.3, -1.2, 0.7))
            .append_translation(&nalgebra::Vector3::new(1.0, 2.0, 3.0));
        let packed = SceneUniforms::new(&m, &m, &m);
        for col in 0..4 {
            for row in 0..4 {
                assert_relative_eq!(packed.view[col][row], m[(row, col)]);
            }
        }
    }
}
