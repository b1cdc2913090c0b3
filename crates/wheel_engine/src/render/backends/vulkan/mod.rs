//! Vulkan 1.3 backend
//!
//! Built bottom-up: [`initialization`] negotiates instance, device and
//! queues; [`resources`] owns memory and buffers; [`rendering`] records
//! commands against one pipeline; [`state`] runs the swapchain and the
//! frame loop. [`VulkanRenderer`] ties them together.

/// Vulkan error type
pub mod error;

/// Instance, physical device selection, logical device and context
pub mod initialization;

/// Memory allocation, buffers, meshes, uniforms and descriptors
pub mod resources;

/// Command pools and recording, shaders, pipeline
pub mod rendering;

/// Swapchain, synchronization and frame pacing
pub mod state;

/// Main Vulkan renderer implementation
pub mod renderer;

pub use error::{VulkanError, VulkanResult};
pub use initialization::context::VulkanContext;
pub use initialization::device::{QueueFamilyIndices, QueueRole};
pub use renderer::VulkanRenderer;
pub use state::frame_scheduler::FrameStatus;
