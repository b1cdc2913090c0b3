//! Rendering: the platform window and the Vulkan backend

pub mod backends;
pub mod window;

pub use backends::vulkan::{FrameStatus, VulkanError, VulkanRenderer, VulkanResult};
pub use window::{GlfwWindow, SurfaceWindow, WindowError};
