//! Vulkan backend error types

use ash::vk;
use thiserror::Error;

use super::initialization::device::QueueRole;
use crate::render::window::WindowError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(#[from] vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No enumerated device passed the selection policy
    #[error("No suitable GPU found ({examined} device(s) examined)")]
    NoSuitableDevice {
        /// How many physical devices were enumerated
        examined: usize,
    },

    /// No queue family can serve a mandatory role
    #[error("No queue family supports the {0} role")]
    QueueFamilyNotFound(QueueRole),

    /// A required instance layer is not installed
    #[error("Required layer not available: {0}")]
    MissingLayer(String),

    /// A required instance or device extension is not available
    #[error("Required extension not available: {0}")]
    MissingExtension(String),

    /// No suitable memory type found for allocation
    #[error("No memory type matches bits {type_bits:#x} with {properties:?}")]
    NoSuitableMemoryType {
        /// Memory types the resource may live in
        type_bits: u32,
        /// Property flags that were requested
        properties: vk::MemoryPropertyFlags,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A bounded fence wait expired
    #[error("Timed out waiting for a frame fence")]
    FenceTimeout,

    /// A shader binary could not be loaded
    #[error("Shader '{path}': {reason}")]
    Shader {
        /// File the shader was loaded from
        path: String,
        /// What went wrong
        reason: String,
    },

    /// The window collaborator failed
    #[error("Window error: {0}")]
    Window(#[from] WindowError),
}

impl VulkanError {
    /// Shorthand for [`VulkanError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
