//! Vertex input layout for the forward pipeline

use ash::vk;
use std::mem;

use crate::assets::Vertex;

/// Binding description: one interleaved per-vertex stream.
pub fn binding_description() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

/// Attribute descriptions: position, normal, uv0, uv1 at locations 0-3.
pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
    [
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: 0,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 1,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: (3 * mem::size_of::<f32>()) as u32,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 2,
            format: vk::Format::R32G32_SFLOAT,
            offset: (6 * mem::size_of::<f32>()) as u32,
        },
        vk::VertexInputAttributeDescription {
            binding: 0,
            location: 3,
            format: vk::Format::R32G32_SFLOAT,
            offset: (8 * mem::size_of::<f32>()) as u32,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_offsets_match_struct_layout() {
        let v = Vertex {
            position: [0.0; 3],
            normal: [0.0; 3],
            uv0: [0.0; 2],
            uv1: [0.0; 2],
        };
        let base = std::ptr::addr_of!(v) as usize;

        let attributes = attribute_descriptions();
        assert_eq!(
            attributes[0].offset as usize,
            std::ptr::addr_of!(v.position) as usize - base
        );
        assert_eq!(
            attributes[1].offset as usize,
            std::ptr::addr_of!(v.normal) as usize - base
        );
        assert_eq!(
            attributes[2].offset as usize,
            std::ptr::addr_of!(v.uv0) as usize - base
        );
        assert_eq!(
            attributes[3].offset as usize,
            std::ptr::addr_of!(v.uv1) as usize - base
        );
    }

    #[test]
    fn stride_covers_the_whole_vertex() {
        assert_eq!(binding_description().stride as usize, mem::size_of::<Vertex>());
        assert_eq!(mem::size_of::<Vertex>(), 40);
    }
}
