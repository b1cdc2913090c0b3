//! Command recording, shaders and the graphics pipeline

pub mod commands;
pub mod pipeline;
pub mod shader;
pub mod vertex_layout;

pub use commands::{ActiveRendering, CommandPool, CommandRecorder, ImageTransition};
pub use pipeline::{GraphicsPipeline, PipelineBuilder};
pub use shader::ShaderModule;
pub use vertex_layout::{Vertex, VulkanVertexLayout};
