//! # Wheel Engine
//!
//! A minimal real-time renderer on Vulkan 1.3. It negotiates device and
//! queue families against a window surface, keeps a swapchain alive across
//! resizes and minimization, uploads geometry through staging buffers and
//! paces N frames in flight with fences and per-image semaphores.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wheel_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     logging::init("info");
//!     Engine::run(&EngineConfig::default())
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod events;
pub mod foundation;
pub mod render;

mod engine;

pub use engine::{Engine, EngineError};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, EngineConfig, RendererConfig, ShaderConfig, WindowConfig},
        events::{Event, EventArg, EventBus, EventKind},
        foundation::logging,
        render::{FrameStatus, GlfwWindow, SurfaceWindow, VulkanError, VulkanRenderer},
        Engine, EngineError,
    };
}
