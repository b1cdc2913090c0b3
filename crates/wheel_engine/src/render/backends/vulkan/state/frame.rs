//! Frame pacing state machine
//!
//! Pure bookkeeping for the frame loop, kept apart from the Vulkan calls in
//! [`super::frame_scheduler`] so the ordering rules can be tested without a
//! device. A frame walks `Idle -> Acquiring -> Recording -> Submitted ->
//! Presenting -> Idle`; an out-of-date acquire drops it back to `Idle`
//! without advancing either counter.

use ash::vk;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Two independently rotating indices
///
/// `frame` selects the [`super::sync::FrameSlot`] (N frames in flight),
/// `semaphore` selects the [`super::sync::PresentSyncPair`] (M swapchain
/// images). Neither is derived from the acquired image index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter {
    frame: usize,
    semaphore: usize,
    frames_in_flight: usize,
    image_count: usize,
}

impl FrameCounter {
    /// Start both indices at zero
    pub fn new(frames_in_flight: usize, image_count: usize) -> VulkanResult<Self> {
        if frames_in_flight == 0 || image_count == 0 {
            return Err(VulkanError::invalid(format!(
                "frame counter needs nonzero counts, got {} frames and {} images",
                frames_in_flight, image_count
            )));
        }
        Ok(Self {
            frame: 0,
            semaphore: 0,
            frames_in_flight,
            image_count,
        })
    }

    /// Current frame slot index
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Current present-sync index
    pub fn semaphore(&self) -> usize {
        self.semaphore
    }

    /// Number of frames in flight
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Number of swapchain images the semaphore index cycles over
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    /// Step both indices after a presented frame
    pub fn advance(&mut self) {
        self.frame = (self.frame + 1) % self.frames_in_flight;
        self.semaphore = (self.semaphore + 1) % self.image_count;
    }

    /// Adopt a new swapchain image count and restart the semaphore index
    pub fn set_image_count(&mut self, image_count: usize) -> VulkanResult<()> {
        if image_count == 0 {
            return Err(VulkanError::invalid("swapchain reported zero images"));
        }
        self.image_count = image_count;
        self.semaphore = 0;
        Ok(())
    }
}

/// Where the current frame is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Between frames
    Idle,
    /// Slot fence waited, swapchain image being acquired
    Acquiring,
    /// Image acquired, commands being recorded
    Recording,
    /// Slot fence reset and commands submitted to the graphics queue
    Submitted,
    /// Present queued
    Presenting,
}

/// Validates the per-frame transitions and tracks which slots the GPU owns
#[derive(Debug)]
pub struct FramePacer {
    counter: FrameCounter,
    state: FrameState,
    in_flight: Vec<bool>,
    image_index: Option<u32>,
}

impl FramePacer {
    /// Pacer for `frames_in_flight` slots over `image_count` images
    pub fn new(frames_in_flight: usize, image_count: usize) -> VulkanResult<Self> {
        Ok(Self {
            counter: FrameCounter::new(frames_in_flight, image_count)?,
            state: FrameState::Idle,
            in_flight: vec![false; frames_in_flight],
            image_index: None,
        })
    }

    /// Current state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Index counters
    pub fn counter(&self) -> &FrameCounter {
        &self.counter
    }

    /// Slots whose fence is currently unsignaled
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.iter().filter(|&&busy| busy).count()
    }

    /// Whether the GPU may still be using `frame`
    pub fn is_in_flight(&self, frame: usize) -> bool {
        self.in_flight.get(frame).copied().unwrap_or(false)
    }

    /// Image acquired for the current frame, if any
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    /// The current slot's fence has been waited; start acquiring
    ///
    /// Returns `(frame, semaphore)` indices for this frame.
    pub fn retire(&mut self) -> VulkanResult<(usize, usize)> {
        self.expect(FrameState::Idle, "retire")?;
        let frame = self.counter.frame();
        self.in_flight[frame] = false;
        self.state = FrameState::Acquiring;
        Ok((frame, self.counter.semaphore()))
    }

    /// The acquire reported out-of-date; drop the frame
    ///
    /// The slot fence was not reset yet, so the next wait on it returns at once.
    pub fn abort(&mut self) -> VulkanResult<()> {
        self.expect(FrameState::Acquiring, "abort")?;
        self.state = FrameState::Idle;
        self.image_index = None;
        Ok(())
    }

    /// `image_index` was acquired; recording starts
    pub fn record(&mut self, image_index: u32) -> VulkanResult<()> {
        self.expect(FrameState::Acquiring, "record")?;
        self.image_index = Some(image_index);
        self.state = FrameState::Recording;
        Ok(())
    }

    /// Commands were handed to the graphics queue with the slot fence
    pub fn submit(&mut self) -> VulkanResult<()> {
        self.expect(FrameState::Recording, "submit")?;
        self.in_flight[self.counter.frame()] = true;
        self.state = FrameState::Submitted;
        Ok(())
    }

    /// Present is being queued; returns the image to present
    pub fn present(&mut self) -> VulkanResult<u32> {
        self.expect(FrameState::Submitted, "present")?;
        let image_index = self
            .image_index
            .ok_or_else(|| VulkanError::invalid("present without an acquired image"))?;
        self.state = FrameState::Presenting;
        Ok(image_index)
    }

    /// Frame done on the CPU side; rotate both indices
    pub fn finish(&mut self) -> VulkanResult<()> {
        self.expect(FrameState::Presenting, "finish")?;
        self.counter.advance();
        self.image_index = None;
        self.state = FrameState::Idle;
        Ok(())
    }

    /// The swapchain was rebuilt with `image_count` images
    pub fn set_image_count(&mut self, image_count: usize) -> VulkanResult<()> {
        self.counter.set_image_count(image_count)
    }

    fn expect(&self, state: FrameState, operation: &str) -> VulkanResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(VulkanError::invalid(format!(
                "{} called in state {:?}, expected {:?}",
                operation, self.state, state
            )))
        }
    }
}

/// Result of `vkAcquireNextImageKHR` as the frame loop sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready; `suboptimal` images are still rendered
    Image {
        /// Swapchain image index
        index: u32,
        /// The surface no longer matches exactly
        suboptimal: bool,
    },
    /// Swapchain must be recreated before anything can be drawn
    OutOfDate,
}

/// Sort an acquire result into the expected outcomes and fatal errors
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> VulkanResult<AcquireOutcome> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(err) => Err(VulkanError::Api(err)),
    }
}

/// What to do after `vkQueuePresentKHR`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Nothing to do
    Presented,
    /// Rebuild the swapchain before the next frame
    Recreate,
}

/// Sort a present result, folding in the window's resize flag
pub fn classify_present(result: Result<bool, vk::Result>, resize_requested: bool) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(false) if !resize_requested => Ok(PresentOutcome::Presented),
        Ok(_) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Recreate),
        Err(err) => Err(VulkanError::Api(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn run_frame(pacer: &mut FramePacer, image: u32) {
        pacer.retire().unwrap();
        pacer.record(image).unwrap();
        pacer.submit().unwrap();
        assert_eq!(pacer.present().unwrap(), image);
        pacer.finish().unwrap();
    }

    /// Each index returns to zero after exactly its own count of frames
    #[test]
    fn test_independent_cycle_lengths() {
        for frames in 1..=4 {
            for images in 1..=5 {
                let mut counter = FrameCounter::new(frames, images).unwrap();
                let mut frame_period = None;
                let mut semaphore_period = None;
                for step in 1..=(frames * images) {
                    counter.advance();
                    if counter.frame() == 0 && frame_period.is_none() {
                        frame_period = Some(step);
                    }
                    if counter.semaphore() == 0 && semaphore_period.is_none() {
                        semaphore_period = Some(step);
                    }
                }
                assert_eq!(frame_period, Some(frames), "N={} M={}", frames, images);
                assert_eq!(semaphore_period, Some(images), "N={} M={}", frames, images);
            }
        }
    }

    #[test]
    fn test_zero_counts_rejected() {
        assert!(FrameCounter::new(0, 3).is_err());
        assert!(FrameCounter::new(2, 0).is_err());
        let mut counter = FrameCounter::new(2, 3).unwrap();
        assert!(counter.set_image_count(0).is_err());
    }

    /// A new image count restarts only the semaphore index
    #[test]
    fn test_set_image_count_resets_semaphore() {
        let mut counter = FrameCounter::new(2, 3).unwrap();
        counter.advance();
        counter.advance();
        counter.advance();
        assert_eq!((counter.frame(), counter.semaphore()), (1, 0));
        counter.advance();
        counter.set_image_count(4).unwrap();
        assert_eq!(counter.semaphore(), 0);
        assert_eq!(counter.frame(), 0);
        assert_eq!(counter.image_count(), 4);
    }

    /// The pacer hands out the semaphore index, never the image index
    #[test]
    fn test_semaphore_follows_counter_not_image() {
        let mut pacer = FramePacer::new(2, 3).unwrap();
        // The presentation engine may return images in any order
        for (step, image) in [2u32, 0, 0, 1, 2, 1].into_iter().enumerate() {
            let (frame, semaphore) = pacer.retire().unwrap();
            assert_eq!(frame, step % 2);
            assert_eq!(semaphore, step % 3);
            pacer.record(image).unwrap();
            pacer.submit().unwrap();
            pacer.present().unwrap();
            pacer.finish().unwrap();
        }
    }

    /// Fences that signal in submission order, as one graphics queue does
    struct QueueModel {
        signaled: Vec<bool>,
        pending: VecDeque<usize>,
    }

    impl QueueModel {
        fn new(slots: usize) -> Self {
            Self {
                signaled: vec![true; slots],
                pending: VecDeque::new(),
            }
        }

        fn submit(&mut self, slot: usize) {
            assert!(self.signaled[slot], "slot {} reset while its work was pending", slot);
            self.signaled[slot] = false;
            self.pending.push_back(slot);
        }

        fn complete_oldest(&mut self) {
            if let Some(slot) = self.pending.pop_front() {
                self.signaled[slot] = true;
            }
        }

        fn wait(&mut self, slot: usize) {
            while !self.signaled[slot] {
                self.complete_oldest();
            }
        }
    }

    /// At most N submissions are outstanding and a slot is reused only after its own wait
    #[test]
    fn test_in_flight_tracks_fences() {
        for frames in 1..=4 {
            let mut pacer = FramePacer::new(frames, 3).unwrap();
            let mut queue = QueueModel::new(frames);

            for step in 0..40usize {
                let slot = pacer.counter().frame();
                queue.wait(slot);
                let before: Vec<bool> = (0..frames).map(|f| pacer.is_in_flight(f)).collect();

                let (frame, _) = pacer.retire().unwrap();
                assert_eq!(frame, slot);
                for (f, &busy) in before.iter().enumerate() {
                    assert_eq!(pacer.is_in_flight(f), busy && f != slot, "N={} step={}", frames, step);
                }

                if step % 7 == 3 {
                    pacer.abort().unwrap();
                    assert!(!pacer.is_in_flight(slot));
                    continue;
                }

                pacer.record((step % 3) as u32).unwrap();
                assert!(!pacer.is_in_flight(slot));
                queue.submit(slot);
                pacer.submit().unwrap();
                assert!(pacer.is_in_flight(slot));
                pacer.present().unwrap();
                pacer.finish().unwrap();

                assert!(queue.pending.len() <= frames);
                assert!(pacer.in_flight_count() <= frames);
                for (f, &signaled) in queue.signaled.iter().enumerate() {
                    if !signaled {
                        assert!(pacer.is_in_flight(f), "pending slot {} reported free", f);
                    }
                }

                for _ in 0..step % 3 {
                    queue.complete_oldest();
                }
            }
        }
    }

    /// A frame that fails while recording has not claimed its slot
    #[test]
    fn test_slot_claimed_at_submit() {
        let mut pacer = FramePacer::new(2, 3).unwrap();
        pacer.retire().unwrap();
        pacer.record(0).unwrap();
        assert_eq!(pacer.state(), FrameState::Recording);
        assert!(!pacer.is_in_flight(0));
        assert_eq!(pacer.in_flight_count(), 0);

        pacer.submit().unwrap();
        assert!(pacer.is_in_flight(0));
        assert!(!pacer.is_in_flight(1));
    }

    #[test]
    fn test_retire_frees_only_current_slot() {
        let mut pacer = FramePacer::new(2, 2).unwrap();
        run_frame(&mut pacer, 0);
        run_frame(&mut pacer, 1);
        assert!(pacer.is_in_flight(0) && pacer.is_in_flight(1));
        pacer.retire().unwrap();
        assert!(!pacer.is_in_flight(0));
        assert!(pacer.is_in_flight(1));
    }

    /// An aborted frame leaves counters and slot state untouched
    #[test]
    fn test_abort_skips_frame() {
        let mut pacer = FramePacer::new(2, 3).unwrap();
        run_frame(&mut pacer, 0);
        let before = *pacer.counter();
        pacer.retire().unwrap();
        pacer.abort().unwrap();
        assert_eq!(pacer.state(), FrameState::Idle);
        assert_eq!(*pacer.counter(), before);
        assert_eq!(pacer.in_flight_count(), 1);
        assert_eq!(pacer.image_index(), None);
    }

    #[test]
    fn test_illegal_transitions() {
        let mut pacer = FramePacer::new(2, 3).unwrap();
        assert!(pacer.submit().is_err());
        assert!(pacer.present().is_err());
        assert!(pacer.finish().is_err());
        assert!(pacer.abort().is_err());
        assert!(pacer.record(0).is_err());

        pacer.retire().unwrap();
        assert!(pacer.retire().is_err());
        pacer.record(1).unwrap();
        assert!(pacer.abort().is_err());
        assert!(pacer.present().is_err());
        pacer.submit().unwrap();
        assert!(pacer.finish().is_err());
        pacer.present().unwrap();
        assert_eq!(pacer.state(), FrameState::Presenting);
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Image { index: 2, suboptimal: false }
        );
        assert_eq!(
            classify_acquire(Ok((1, true))).unwrap(),
            AcquireOutcome::Image { index: 1, suboptimal: true }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false), false).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(false), true).unwrap(), PresentOutcome::Recreate);
        assert_eq!(classify_present(Ok(true), false).unwrap(), PresentOutcome::Recreate);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), false).unwrap(),
            PresentOutcome::Recreate
        );
        assert!(classify_present(Err(vk::Result::ERROR_DEVICE_LOST), false).is_err());
    }
}
