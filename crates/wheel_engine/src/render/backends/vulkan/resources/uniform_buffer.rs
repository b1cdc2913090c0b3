//! Per-frame uniform buffers holding the model/view/projection transform

use ash::vk;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem::size_of;

use super::buffer::{BufferKind, GpuBuffer};
use super::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
use crate::foundation::math::{self, Mat4};
use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Transform block read by the vertex shader at set 0, binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformUniform {
    /// Model matrix (column-major)
    pub model: [[f32; 4]; 4],
    /// View matrix (column-major)
    pub view: [[f32; 4]; 4],
    /// Projection matrix (column-major)
    pub proj: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for TransformUniform {}
unsafe impl bytemuck::Zeroable for TransformUniform {}

impl TransformUniform {
    /// Transform after `seconds` of animation for a target of `extent`
    pub fn at(seconds: f32, extent: vk::Extent2D) -> Self {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        Self::from_matrices(math::model_at(seconds), math::view(), math::projection(aspect))
    }

    /// Pack three matrices
    pub fn from_matrices(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model: model.into(),
            view: view.into(),
            proj: proj.into(),
        }
    }
}

/// Host-visible uniform buffer kept mapped for its whole life
pub struct UniformBuffer<T: bytemuck::Pod> {
    buffer: GpuBuffer,
    mapped: *mut c_void,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformBuffer<T> {
    /// Create and map a buffer sized for one `T`
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let buffer = GpuBuffer::host_visible(context, size_of::<T>() as vk::DeviceSize, BufferKind::Uniform)?;
        let mapped = buffer.map()?;
        Ok(Self {
            buffer,
            mapped,
            _marker: PhantomData,
        })
    }

    /// Overwrite the contents
    pub fn update(&mut self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped.cast::<u8>(), bytes.len());
        }
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl<T: bytemuck::Pod> Drop for UniformBuffer<T> {
    fn drop(&mut self) {
        self.buffer.unmap();
    }
}

/// One uniform buffer and descriptor set per frame in flight
pub struct FrameUniforms {
    sets: Vec<vk::DescriptorSet>,
    buffers: Vec<UniformBuffer<TransformUniform>>,
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
}

impl FrameUniforms {
    /// Create `frames` buffers and point one descriptor set at each
    pub fn new(context: &VulkanContext, frames: usize) -> VulkanResult<Self> {
        let device = context.device();
        let layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .build(device)?;
        let pool = DescriptorPool::for_uniform_buffers(device.clone(), frames as u32)?;

        let buffers = (0..frames)
            .map(|_| UniformBuffer::new(context))
            .collect::<VulkanResult<Vec<_>>>()?;
        let sets = pool.allocate_descriptor_sets(&vec![layout.handle(); frames])?;

        for (set, buffer) in sets.iter().zip(&buffers) {
            pool.write_uniform_buffer(*set, 0, buffer.handle(), size_of::<TransformUniform>() as vk::DeviceSize);
        }

        Ok(Self {
            sets,
            buffers,
            pool,
            layout,
        })
    }

    /// Write frame `frame`'s transform; the frame's fence must already be waited on
    pub fn update(&mut self, frame: usize, value: &TransformUniform) -> VulkanResult<()> {
        let buffer = self
            .buffers
            .get_mut(frame)
            .ok_or_else(|| VulkanError::invalid(format!("no uniform buffer for frame {frame}")))?;
        buffer.update(value);
        Ok(())
    }

    /// Descriptor set of frame `frame`
    pub fn descriptor_set(&self, frame: usize) -> vk::DescriptorSet {
        self.sets[frame % self.sets.len()]
    }

    /// Layout shared by every set
    pub fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }

    /// Pool the sets came from
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_layout_is_three_matrices() {
        assert_eq!(size_of::<TransformUniform>(), 3 * 64);
    }

    /// Test the packed matrices stay column-major
    #[test]
    fn test_from_matrices_column_major() {
        let model = Mat4::new_translation(&math::Vec3::new(1.0, 2.0, 3.0));
        let packed = TransformUniform::from_matrices(model, Mat4::identity(), Mat4::identity());
        assert_relative_eq!(packed.model[3][0], 1.0);
        assert_relative_eq!(packed.model[3][2], 3.0);
        assert_relative_eq!(packed.view[0][0], 1.0);
    }

    #[test]
    fn test_zero_height_extent_does_not_divide_by_zero() {
        let uniform = TransformUniform::at(0.0, vk::Extent2D { width: 800, height: 0 });
        assert!(uniform.proj.iter().flatten().all(|v| v.is_finite()));
    }
}
