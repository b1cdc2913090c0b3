//! Engine context: window, event bus and renderer with explicit lifecycle

use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::events::{EventBus, EventError, EventKind};
use crate::render::backends::vulkan::resources::mesh;
use crate::render::window::{GlfwWindow, SurfaceWindow, WindowError};
use crate::render::{FrameStatus, VulkanError, VulkanRenderer};

/// Top-level engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Renderer failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Window failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Bad or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Event bus misuse
    #[error("Event error: {0}")]
    Event(#[from] EventError),

    /// Operation after `clean`
    #[error("Engine already shut down")]
    ShutDown,
}

/// Owns everything the frame loop touches
///
/// The renderer is dropped before the window so the surface goes before
/// the platform window it was created for.
pub struct Engine {
    renderer: Option<VulkanRenderer>,
    window: GlfwWindow,
    events: EventBus,
    quit: Rc<Cell<bool>>,
    frames: u64,
}

impl Engine {
    /// Bring up window, renderer and the default quad
    pub fn init(config: &EngineConfig) -> Result<Self, EngineError> {
        log::info!("Initializing engine...");
        config.validate()?;
        config.renderer.shaders.validate()?;

        let mut window = GlfwWindow::new(&config.window)?;

        let mut events = EventBus::new();
        let quit = Rc::new(Cell::new(false));
        {
            let quit = Rc::clone(&quit);
            events.subscribe(EventKind::QUIT, move |_| quit.set(true));
        }
        {
            let quit = Rc::clone(&quit);
            events.subscribe_named("key_released", move |event| {
                if event.key() == Some("Escape") {
                    log::info!("Escape released, quitting");
                    quit.set(true);
                }
            })?;
        }

        let mut renderer = VulkanRenderer::new(&mut window, &config.renderer)?;
        let (vertices, indices) = mesh::quad();
        renderer.add_mesh(&vertices, &indices)?;

        Ok(Self {
            renderer: Some(renderer),
            window,
            events,
            quit,
            frames: 0,
        })
    }

    /// Poll and draw until the window closes or quit is requested
    pub fn run_loop(&mut self) -> Result<(), EngineError> {
        log::info!("Starting main loop...");
        let renderer = self.renderer.as_mut().ok_or(EngineError::ShutDown)?;

        while self.window.is_open() && !self.quit.get() {
            self.window.poll_events(&mut self.events);
            if self.quit.get() {
                break;
            }

            match renderer.draw_frame(&mut self.window)? {
                FrameStatus::WindowClosed => break,
                FrameStatus::Skipped => {}
                FrameStatus::Presented | FrameStatus::Recreated => self.frames += 1,
            }
        }

        log::info!("Main loop finished after {} frames", self.frames);
        Ok(())
    }

    /// Drain the GPU and tear down in reverse creation order
    pub fn clean(&mut self) -> Result<(), EngineError> {
        if let Some(renderer) = self.renderer.take() {
            renderer.wait_idle()?;
            drop(renderer);
        }
        self.events.clear();
        self.window.close();
        log::info!("Engine shutdown complete");
        Ok(())
    }

    /// `init`, `run_loop`, `clean`
    ///
    /// Cleanup runs even when the loop fails; the loop's error wins.
    pub fn run(config: &EngineConfig) -> Result<(), EngineError> {
        let mut engine = Self::init(config)?;
        let looped = engine.run_loop();
        let cleaned = engine.clean();
        looped.and(cleaned)
    }

    /// Frames presented so far
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Event bus, for additional subscriptions
    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// The renderer, until `clean` is called
    pub fn renderer(&mut self) -> Option<&mut VulkanRenderer> {
        self.renderer.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: EngineError = VulkanError::FenceTimeout.into();
        assert!(matches!(err, EngineError::Vulkan(_)));

        let err: EngineError = EventError::UnknownKind("nope".to_string()).into();
        assert_eq!(err.to_string(), "Event error: Unknown event kind: nope");

        let err: EngineError = ConfigError::Invalid("bad".to_string()).into();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
