//! Swapchain lifecycle management
//!
//! Owns the one live [`Swapchain`] and rebuilds it whenever acquire or
//! present reports it no longer matches the surface, or the window reports a
//! resize.
//!
//! # Recreation
//!
//! Rebuilding is destroy-then-create, never an `old_swapchain` handoff:
//!
//! 1. Wait until the window has a nonzero framebuffer. A minimized window
//!    pumps platform events until it is restored; a window closed during
//!    that wait ends recreation without building anything.
//! 2. Wait for the device to go idle, so no submitted frame still reads the
//!    old images or views.
//! 3. Drop the old swapchain and create a new one from fresh surface
//!    queries.
//!
//! If creation fails the manager holds no swapchain and
//! [`SwapchainManager::current`] reports an error instead of handing out a
//! destroyed handle.
//!
//! # What callers rebuild
//!
//! Viewport and scissor are dynamic, so the pipeline survives a resize. Only
//! a changed surface format forces a new pipeline, and only a changed image
//! count forces new present semaphores; both checks belong to the caller.

use super::swapchain::Swapchain;
use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::window::SurfaceWindow;

/// Block until the window has a drawable area
///
/// A minimized window reports a zero size; platform events are pumped until
/// it comes back. Returns `None` if the window closes while waiting.
pub fn wait_for_drawable_size(window: &mut dyn SurfaceWindow) -> Option<(u32, u32)> {
    let mut waited = false;
    loop {
        let (width, height) = window.framebuffer_size();
        if width > 0 && height > 0 {
            if waited {
                log::debug!("Window drawable again at {}x{}", width, height);
            }
            return Some((width, height));
        }
        if !window.is_open() {
            return None;
        }
        if !waited {
            log::debug!("Window minimized, waiting for a nonzero size");
            waited = true;
        }
        window.wait_events();
    }
}

/// Owns the current [`Swapchain`] and rebuilds it when the surface changes
pub struct SwapchainManager {
    swapchain: Option<Swapchain>,
    prefer_mailbox: bool,
    generation: u64,
}

impl SwapchainManager {
    /// Create the first swapchain for `window`
    pub fn new(context: &VulkanContext, window: &mut dyn SurfaceWindow, prefer_mailbox: bool) -> VulkanResult<Self> {
        let size = wait_for_drawable_size(window)
            .ok_or_else(|| VulkanError::InitializationFailed("window closed before first swapchain".to_string()))?;
        let swapchain = Swapchain::new(context, size, prefer_mailbox)?;
        Ok(Self {
            swapchain: Some(swapchain),
            prefer_mailbox,
            generation: 0,
        })
    }

    /// The live swapchain
    pub fn current(&self) -> VulkanResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| VulkanError::invalid("no swapchain; the last recreate failed"))
    }

    /// Wait for a drawable window, drain the device, destroy and rebuild
    ///
    /// Returns `Ok(false)` when the window closed during the wait; nothing
    /// was destroyed in that case.
    pub fn recreate(&mut self, context: &VulkanContext, window: &mut dyn SurfaceWindow) -> VulkanResult<bool> {
        let prefer_mailbox = self.prefer_mailbox;
        let slot = &mut self.swapchain;
        let rebuilt = recreate_when_drawable(window, |size| {
            context.wait_idle()?;
            // The old chain and its views go before the new one is created
            *slot = None;
            *slot = Some(Swapchain::new(context, size, prefer_mailbox)?);
            Ok(())
        })?;
        if rebuilt {
            self.generation += 1;
            log::info!("Swapchain recreated (generation {})", self.generation);
        }
        Ok(rebuilt)
    }
}

fn recreate_when_drawable(
    window: &mut dyn SurfaceWindow,
    rebuild: impl FnOnce((u32, u32)) -> VulkanResult<()>,
) -> VulkanResult<bool> {
    match wait_for_drawable_size(window) {
        Some(size) => rebuild(size).map(|()| true),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use std::collections::VecDeque;

    use crate::events::EventBus;
    use crate::render::window::WindowResult;

    /// Window whose size changes only when events are waited for
    struct ScriptedWindow {
        sizes: VecDeque<(u32, u32)>,
        current: (u32, u32),
        waits: usize,
        open: bool,
        close_after_waits: Option<usize>,
    }

    impl ScriptedWindow {
        fn new(current: (u32, u32), later: &[(u32, u32)]) -> Self {
            Self {
                sizes: later.iter().copied().collect(),
                current,
                waits: 0,
                open: true,
                close_after_waits: None,
            }
        }
    }

    impl SurfaceWindow for ScriptedWindow {
        fn is_open(&self) -> bool {
            self.open
        }

        fn poll_events(&mut self, _bus: &mut EventBus) {}

        fn wait_events(&mut self) {
            self.waits += 1;
            if let Some(size) = self.sizes.pop_front() {
                self.current = size;
            }
            if self.close_after_waits == Some(self.waits) {
                self.open = false;
            }
        }

        fn framebuffer_size(&self) -> (u32, u32) {
            self.current
        }

        fn take_resized(&mut self) -> bool {
            false
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn create_surface(&mut self, _instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
            Ok(vk::SurfaceKHR::null())
        }
    }

    #[test]
    fn test_drawable_size_returns_immediately() {
        let mut window = ScriptedWindow::new((800, 600), &[]);
        assert_eq!(wait_for_drawable_size(&mut window), Some((800, 600)));
        assert_eq!(window.waits, 0);
    }

    /// Either dimension at zero counts as minimized
    #[test]
    fn test_waits_through_zero_sizes() {
        let mut window = ScriptedWindow::new((0, 0), &[(0, 0), (640, 0), (0, 480), (1024, 768)]);
        assert_eq!(wait_for_drawable_size(&mut window), Some((1024, 768)));
        assert_eq!(window.waits, 4);
    }

    #[test]
    fn test_closed_while_minimized() {
        let mut window = ScriptedWindow::new((0, 0), &[(0, 0), (0, 0), (0, 0)]);
        window.close_after_waits = Some(2);
        assert_eq!(wait_for_drawable_size(&mut window), None);
        assert_eq!(window.waits, 2);
    }

    /// Rebuild does not run until the window has a nonzero size
    #[test]
    fn test_recreate_blocks_until_drawable() {
        let mut window = ScriptedWindow::new((0, 0), &[(0, 0), (1280, 720)]);
        let mut rebuilt_with = None;
        let rebuilt = recreate_when_drawable(&mut window, |size| {
            rebuilt_with = Some(size);
            Ok(())
        })
        .unwrap();
        assert!(rebuilt);
        assert_eq!(rebuilt_with, Some((1280, 720)));
        assert_eq!(window.waits, 2);
    }

    #[test]
    fn test_recreate_skipped_when_closed() {
        let mut window = ScriptedWindow::new((0, 0), &[]);
        window.close_after_waits = Some(1);
        let mut called = false;
        let rebuilt = recreate_when_drawable(&mut window, |_| {
            called = true;
            Ok(())
        })
        .unwrap();
        assert!(!rebuilt);
        assert!(!called);
    }

    #[test]
    fn test_recreate_propagates_rebuild_error() {
        let mut window = ScriptedWindow::new((10, 10), &[]);
        let result = recreate_when_drawable(&mut window, |_| Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));
        assert!(result.is_err());
    }
}
