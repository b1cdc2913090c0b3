//! Vulkan synchronization primitives
//!
//! Two groups of objects keep the frame loop honest:
//!
//! - [`FrameSlot`], one per frame in flight: a command buffer plus the fence
//!   that tells the CPU when the GPU is done with it.
//! - [`PresentSyncPair`], one per swapchain image: the semaphore the acquire
//!   signals and the one presentation waits on.
//!
//! The two counts differ in general, so the two groups are indexed by
//! separate counters (see [`super::frame::FrameCounter`]).

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Binary semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    /// Wait for the fence; `Ok(false)` if `timeout` elapsed first
    pub fn wait(&self, timeout: u64) -> VulkanResult<bool> {
        match unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    /// Wait according to the configured policy
    ///
    /// Without a timeout the wait is retried until the fence signals; with
    /// one, running out of time is a [`VulkanError::FenceTimeout`].
    pub fn wait_with_policy(&self, timeout_ns: Option<u64>) -> VulkanResult<()> {
        wait_with_policy(timeout_ns, |timeout| self.wait(timeout))
    }

    /// Reset fence to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

fn wait_with_policy(
    timeout_ns: Option<u64>,
    mut wait: impl FnMut(u64) -> VulkanResult<bool>,
) -> VulkanResult<()> {
    match timeout_ns {
        Some(timeout) => {
            if wait(timeout)? {
                Ok(())
            } else {
                Err(VulkanError::FenceTimeout)
            }
        }
        None => {
            while !wait(u64::MAX)? {
                log::warn!("Fence wait returned TIMEOUT with an infinite timeout, retrying");
            }
            Ok(())
        }
    }
}

/// Per-frame-in-flight resources
pub struct FrameSlot {
    /// Primary command buffer, re-recorded every time the slot is used
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when the GPU finished the slot's last submission
    pub in_flight: Fence,
}

impl FrameSlot {
    /// Create a slot around an allocated command buffer
    ///
    /// The fence starts signaled so the first wait on it returns at once.
    pub fn new(device: Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        Ok(Self {
            command_buffer,
            in_flight: Fence::new(device, true)?,
        })
    }
}

/// Per-swapchain-image semaphores
pub struct PresentSyncPair {
    /// Signaled by the acquire, waited on by the submit
    pub image_available: Semaphore,
    /// Signaled by the submit, waited on by the present
    pub render_finished: Semaphore,
}

impl PresentSyncPair {
    /// Create both semaphores
    pub fn new(device: Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device)?,
        })
    }

    /// One pair per swapchain image
    pub fn for_images(device: &Device, image_count: usize) -> VulkanResult<Vec<Self>> {
        (0..image_count).map(|_| Self::new(device.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An infinite wait keeps retrying through spurious timeouts
    #[test]
    fn test_infinite_wait_retries() {
        let mut calls = 0;
        let result = wait_with_policy(None, |timeout| {
            assert_eq!(timeout, u64::MAX);
            calls += 1;
            Ok(calls == 3)
        });
        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    /// A bounded wait that runs out is an error
    #[test]
    fn test_bounded_wait_times_out() {
        let result = wait_with_policy(Some(1_000), |timeout| {
            assert_eq!(timeout, 1_000);
            Ok(false)
        });
        assert!(matches!(result, Err(VulkanError::FenceTimeout)));
    }

    #[test]
    fn test_bounded_wait_succeeds() {
        assert!(wait_with_policy(Some(5), |_| Ok(true)).is_ok());
    }

    #[test]
    fn test_wait_propagates_device_lost() {
        let result = wait_with_policy(None, |_| Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))));
    }
}
