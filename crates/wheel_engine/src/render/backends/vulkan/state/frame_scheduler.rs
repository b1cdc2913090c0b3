//! Frame scheduler: acquire, record, submit, present
//!
//! Drives one frame per [`FrameScheduler::draw`] call on a single thread.
//! The Vulkan calls live here; the ordering rules they follow are checked by
//! [`super::frame::FramePacer`], which this type advances at every step.
//!
//! # Per-frame sequence
//!
//! 1. Wait on the slot fence. This is the only backpressure: a slot is
//!    reused only after its previous submission completed, so at most N
//!    submissions are ever outstanding.
//! 2. Acquire an image, signaling `image_available[s]`. An out-of-date
//!    swapchain drops the frame, rebuilds and returns
//!    [`FrameStatus::Skipped`]. A suboptimal image is still drawn.
//! 3. Reset and record the slot's command buffer: transition to color
//!    attachment, dynamic rendering with the caller's draws, transition to
//!    present.
//! 4. Reset the slot fence and submit. The submit waits on
//!    `image_available[s]` at color-attachment output and signals the fence
//!    and `render_finished[image]`.
//! 5. Present after `render_finished[image]`, then rebuild if the present was
//!    suboptimal, out of date, or the window was resized.
//!
//! # Indexing
//!
//! Slots rotate with the frame counter (N). Acquire semaphores rotate with a
//! separate counter over the image count (M). Render-finished semaphores are
//! picked by the acquired image, since the presentation engine may still
//! hold one until that image comes back.
//!
//! The fence is reset only after recording succeeded. A frame that fails
//! before submit leaves it signaled, so the next wait returns at once.

use ash::{vk, Device};

use super::frame::{classify_acquire, classify_present, AcquireOutcome, FramePacer, PresentOutcome};
use super::swapchain_manager::SwapchainManager;
use super::sync::{FrameSlot, PresentSyncPair};
use crate::render::backends::vulkan::initialization::context::VulkanContext;
use crate::render::backends::vulkan::initialization::device::QueueRole;
use crate::render::backends::vulkan::rendering::commands::{ActiveRendering, CommandRecorder, ImageTransition};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::window::SurfaceWindow;

/// What happened to a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Drawn and presented
    Presented,
    /// Drawn and presented, then the swapchain was rebuilt
    Recreated,
    /// Acquire found the swapchain out of date; it was rebuilt and nothing was drawn
    Skipped,
    /// The window closed while waiting for it to become drawable
    WindowClosed,
}

/// Per-frame data handed to the recording callback
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget {
    /// Frame slot index, for per-frame resources such as uniform buffers
    pub frame: usize,
    /// Acquired swapchain image
    pub image_index: u32,
    /// Extent of the image being rendered
    pub extent: vk::Extent2D,
}

/// Owns the frame slots and present semaphores and runs the frame loop body
pub struct FrameScheduler {
    pacer: FramePacer,
    slots: Vec<FrameSlot>,
    present_sync: Vec<PresentSyncPair>,
    device: Device,
    fence_timeout_ns: Option<u64>,
    clear_color: [f32; 4],
}

impl FrameScheduler {
    /// Allocate `frames_in_flight` slots and one semaphore pair per image
    pub fn new(
        context: &VulkanContext,
        frames_in_flight: usize,
        image_count: usize,
        fence_timeout_ns: Option<u64>,
        clear_color: [f32; 4],
    ) -> VulkanResult<Self> {
        let pacer = FramePacer::new(frames_in_flight, image_count)?;
        let device = context.device().clone();

        let command_buffers = context.graphics_pool().allocate_command_buffers(frames_in_flight as u32)?;
        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| FrameSlot::new(device.clone(), command_buffer))
            .collect::<VulkanResult<Vec<_>>>()?;
        let present_sync = PresentSyncPair::for_images(&device, image_count)?;

        log::debug!(
            "Frame scheduler: {} frames in flight, {} present sync pairs",
            frames_in_flight,
            image_count
        );
        Ok(Self {
            pacer,
            slots,
            present_sync,
            device,
            fence_timeout_ns,
            clear_color,
        })
    }

    /// Run one frame; `record` adds draw commands inside the rendering scope
    ///
    /// Viewport and scissor already cover the image when `record` runs, and
    /// it runs only after this slot's previous submission has completed.
    pub fn draw(
        &mut self,
        context: &VulkanContext,
        swapchains: &mut SwapchainManager,
        window: &mut dyn SurfaceWindow,
        record: impl FnOnce(FrameTarget, &mut ActiveRendering<'_>) -> VulkanResult<()>,
    ) -> VulkanResult<FrameStatus> {
        let frame = self.pacer.counter().frame();
        let slot = slot_at(&self.slots, frame)?;
        slot.in_flight.wait_with_policy(self.fence_timeout_ns)?;
        let (frame, semaphore) = self.pacer.retire()?;

        let image_available = pair_at(&self.present_sync, semaphore)?.image_available.handle();
        let acquired = {
            let swapchain = swapchains.current()?;
            unsafe {
                swapchain
                    .loader()
                    .acquire_next_image(swapchain.handle(), u64::MAX, image_available, vk::Fence::null())
            }
        };
        let image_index = match classify_acquire(acquired)? {
            AcquireOutcome::Image { index, suboptimal } => {
                if suboptimal {
                    log::debug!("Acquired suboptimal image {}", index);
                }
                index
            }
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date on acquire, skipping frame");
                self.pacer.abort()?;
                return self.recreate(context, swapchains, window).map(|rebuilt| {
                    if rebuilt {
                        FrameStatus::Skipped
                    } else {
                        FrameStatus::WindowClosed
                    }
                });
            }
        };

        let swapchain = swapchains.current()?;
        let (image, view) = swapchain.target(image_index)?;
        let extent = swapchain.extent();
        let slot = slot_at(&self.slots, frame)?;
        let render_finished = pair_at(&self.present_sync, image_index as usize)?.render_finished.handle();

        self.pacer.record(image_index)?;
        unsafe {
            self.device
                .reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())?;
        }

        let mut recorder = CommandRecorder::new(slot.command_buffer, self.device.clone());
        recorder.begin()?;
        recorder.transition_image(image, ImageTransition::ToColorAttachment)?;
        {
            let mut rendering = recorder.begin_rendering(view, extent, self.clear_color)?;
            rendering.set_viewport_and_scissor(extent);
            record(
                FrameTarget {
                    frame,
                    image_index,
                    extent,
                },
                &mut rendering,
            )?;
        }
        recorder.transition_image(image, ImageTransition::ToPresent)?;
        let command_buffer = recorder.end()?;

        let wait_semaphores = [vk::SemaphoreSubmitInfo::builder()
            .semaphore(image_available)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .build()];
        let signal_semaphores = [vk::SemaphoreSubmitInfo::builder()
            .semaphore(render_finished)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .build()];
        let command_buffers = [vk::CommandBufferSubmitInfo::builder()
            .command_buffer(command_buffer)
            .build()];
        let submit = vk::SubmitInfo2::builder()
            .wait_semaphore_infos(&wait_semaphores)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signal_semaphores)
            .build();
        // Reset only once recording succeeded, so a failed frame leaves the fence signaled
        slot.in_flight.reset()?;
        unsafe {
            self.device
                .queue_submit2(context.queue(QueueRole::Graphics), &[submit], slot.in_flight.handle())?;
        }
        self.pacer.submit()?;

        let image_index = self.pacer.present()?;
        let present_wait = [render_finished];
        let swapchain_handles = [swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&present_wait)
            .swapchains(&swapchain_handles)
            .image_indices(&image_indices);
        let presented = unsafe {
            swapchain
                .loader()
                .queue_present(context.queue(QueueRole::Present), &present_info)
        };
        let outcome = classify_present(presented, window.take_resized())?;
        self.pacer.finish()?;

        match outcome {
            PresentOutcome::Presented => Ok(FrameStatus::Presented),
            PresentOutcome::Recreate => self.recreate(context, swapchains, window).map(|rebuilt| {
                if rebuilt {
                    FrameStatus::Recreated
                } else {
                    FrameStatus::WindowClosed
                }
            }),
        }
    }

    fn recreate(
        &mut self,
        context: &VulkanContext,
        swapchains: &mut SwapchainManager,
        window: &mut dyn SurfaceWindow,
    ) -> VulkanResult<bool> {
        if !swapchains.recreate(context, window)? {
            return Ok(false);
        }
        // A resize that arrived meanwhile is covered by this rebuild
        window.take_resized();

        // The device is idle after recreate, so the old pairs can go
        let image_count = swapchains.current()?.image_count();
        if image_count != self.present_sync.len() {
            log::debug!(
                "Swapchain image count changed {} -> {}, rebuilding present sync",
                self.present_sync.len(),
                image_count
            );
            self.present_sync = PresentSyncPair::for_images(&self.device, image_count)?;
            self.pacer.set_image_count(image_count)?;
        }
        Ok(true)
    }
}

fn slot_at(slots: &[FrameSlot], frame: usize) -> VulkanResult<&FrameSlot> {
    slots
        .get(frame)
        .ok_or_else(|| VulkanError::invalid(format!("no frame slot {}", frame)))
}

fn pair_at(pairs: &[PresentSyncPair], index: usize) -> VulkanResult<&PresentSyncPair> {
    pairs
        .get(index)
        .ok_or_else(|| VulkanError::invalid(format!("no present sync pair {}", index)))
}
