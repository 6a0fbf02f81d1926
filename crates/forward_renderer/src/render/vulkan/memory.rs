//! GPU memory-type selection
//!
//! Picks a memory type index compatible with both a resource's requirements
//! and the caller's requested property flags.

use ash::vk;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Find a memory type index satisfying both constraints.
///
/// Iterates the adapter's advertised memory types in order and returns the
/// first index whose bit is set in `type_bits` and whose property flags are a
/// superset of `required`. Returns [`VulkanError::NoCompatibleMemoryType`]
/// when nothing matches; that indicates an adapter/requirement mismatch and
/// is not retryable.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    for i in 0..properties.memory_type_count {
        if (type_bits & (1 << i)) != 0
            && properties.memory_types[i as usize]
                .property_flags
                .contains(required)
        {
            return Ok(i);
        }
    }

    Err(VulkanError::NoCompatibleMemoryType)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[(vk::MemoryPropertyFlags, u32)]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &(flags, heap)) in types.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index: heap,
            };
        }
        properties
    }

    #[test]
    fn picks_first_compatible_index() {
        let properties = props(&[
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            (
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                1,
            ),
            (
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                1,
            ),
        ]);

        let index = find_memory_type(
            &properties,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_type_bits_mask() {
        let properties = props(&[
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
        ]);

        // Index 0 has the right flags but the resource only accepts index 1.
        let index =
            find_memory_type(&properties, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn requires_property_superset() {
        let properties = props(&[(vk::MemoryPropertyFlags::HOST_VISIBLE, 0)]);

        // HOST_VISIBLE alone is not a superset of HOST_VISIBLE|HOST_COHERENT.
        let result = find_memory_type(
            &properties,
            0b1,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        assert!(matches!(result, Err(VulkanError::NoCompatibleMemoryType)));
    }

    #[test]
    fn reports_no_compatible_type_for_empty_mask() {
        let properties = props(&[(vk::MemoryPropertyFlags::DEVICE_LOCAL, 0)]);

        let result = find_memory_type(&properties, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert!(matches!(result, Err(VulkanError::NoCompatibleMemoryType)));
    }

    #[test]
    fn selected_index_always_satisfies_both_constraints() {
        // A grab-bag of type layouts; whatever comes back must obey the law.
        let properties = props(&[
            (vk::MemoryPropertyFlags::empty(), 0),
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            (vk::MemoryPropertyFlags::HOST_VISIBLE, 1),
            (
                vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
                0,
            ),
        ]);

        for type_bits in [0b1111, 0b1010, 0b1000] {
            if let Ok(index) =
                find_memory_type(&properties, type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            {
                assert_ne!(type_bits & (1 << index), 0);
                assert!(properties.memory_types[index as usize]
                    .property_flags
                    .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
            }
        }
    }
}
