//! Vertex format of the engine and its Vulkan input layout

use ash::vk;
use std::mem::size_of;

/// Vertex with homogeneous position and RGBA color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Position (x, y, z, w)
    pub pos: [f32; 4],
    /// Color (r, g, b, a)
    pub color: [f32; 4],
}

unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

impl Vertex {
    /// Vertex at (x, y, z) with w = 1
    pub const fn new(x: f32, y: f32, z: f32, color: [f32; 4]) -> Self {
        Self {
            pos: [x, y, z, 1.0],
            color,
        }
    }
}

/// Vulkan vertex layout implementation for [`Vertex`]
pub struct VulkanVertexLayout;

impl VulkanVertexLayout {
    /// One binding, advancing per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position at location 0, color at location 1
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 16, // after 4 position floats
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_matches_struct() {
        let binding = VulkanVertexLayout::binding_description();
        assert_eq!(binding.stride, 32);

        let [pos, color] = VulkanVertexLayout::attribute_descriptions();
        assert_eq!((pos.location, pos.offset), (0, 0));
        assert_eq!((color.location, color.offset), (1, 16));
    }
}
