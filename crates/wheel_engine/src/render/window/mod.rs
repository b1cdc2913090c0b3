//! Window collaborator
//!
//! The renderer only needs a handful of things from a platform window, so
//! they are gathered in [`SurfaceWindow`]. [`GlfwWindow`] is the production
//! implementation; tests drive the swapchain logic with a scripted one.

mod glfw_window;

pub use glfw_window::GlfwWindow;

use ash::vk;
use thiserror::Error;

use crate::events::EventBus;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The platform refused to create the window
    #[error("Window creation failed")]
    CreationFailed,

    /// The platform reported no Vulkan instance extensions
    #[error("Vulkan is not supported by the windowing system")]
    VulkanUnsupported,

    /// Surface creation returned an error code
    #[error("Failed to create Vulkan surface: {0:?}")]
    SurfaceCreation(vk::Result),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// The window operations the renderer consumes
pub trait SurfaceWindow {
    /// False once the user or the application closed the window
    fn is_open(&self) -> bool;

    /// Pump platform events, translate them and dispatch them on `bus`
    ///
    /// Implementations set their resize flag on framebuffer changes.
    fn poll_events(&mut self, bus: &mut EventBus);

    /// Block until at least one platform event arrives
    fn wait_events(&mut self);

    /// Drawable size in pixels
    fn framebuffer_size(&self) -> (u32, u32);

    /// Return and clear the resize flag
    fn take_resized(&mut self) -> bool;

    /// Request the window to close
    fn close(&mut self);

    /// Instance extensions needed to present to this window
    fn required_instance_extensions(&self) -> WindowResult<Vec<String>>;

    /// Create a presentation surface for `instance`
    fn create_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR>;
}
