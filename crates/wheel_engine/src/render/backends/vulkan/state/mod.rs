//! Swapchain and per-frame state

pub mod frame;
pub mod frame_scheduler;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;

pub use frame::{AcquireOutcome, FrameCounter, FramePacer, FrameState, PresentOutcome};
pub use frame_scheduler::{FrameScheduler, FrameStatus, FrameTarget};
pub use swapchain::Swapchain;
pub use swapchain_manager::SwapchainManager;
pub use sync::{Fence, FrameSlot, PresentSyncPair, Semaphore};
