//! GPU memory, buffers, meshes and descriptors

/// Memory type selection and allocation
pub mod allocator;

/// Buffers and staged upload
pub mod buffer;

/// Descriptor set layouts and pools
pub mod descriptor_set;

/// Packed vertex+index meshes
pub mod mesh;

/// Per-frame uniform buffers
pub mod uniform_buffer;

pub use allocator::DeviceAllocator;
pub use buffer::{BufferKind, GpuBuffer, IndexData, IndexWidth};
pub use descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use mesh::Mesh;
pub use uniform_buffer::{FrameUniforms, TransformUniform, UniformBuffer};
