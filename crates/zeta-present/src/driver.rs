//! The per-frame state machine.
//!
//! One call to [`FrameDriver::run_frame`] walks a frame through
//! `WaitSlot → Acquire → TrackImage → Record → Submit → Present` and advances
//! the slot ring. An out-of-date or suboptimal swapchain ends the frame in
//! [`FrameState::NeedsResize`]; the driver stays there until [`FrameDriver::resume`].

use crate::device::{DeviceContext, PresentSurface, Submission};
use crate::error::{PresentError, Result};
use crate::record::{FrameContext, FrameRecorder};
use crate::swapchain::SwapchainManager;
use crate::sync::FrameSynchronizer;
use ash::vk;
use std::time::Instant;
use tracing::{debug, trace, trace_span, warn};

/// Observable stage of the frame currently being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    WaitSlot,
    Acquire,
    TrackImage,
    Record,
    Submit,
    Present,
    NeedsResize,
}

/// How a frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The image was submitted and queued for presentation.
    Presented { image_index: u32, slot: usize },
    /// The swapchain must be recreated before the next frame.
    NeedsResize,
    /// Nothing was done (no swapchain, or a resize is pending).
    Skipped,
}

/// Frame timing accumulated between statistics reports.
#[derive(Debug)]
struct FrameStats {
    window_start: Instant,
    presented: u64,
    resizes: u64,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            presented: 0,
            resizes: 0,
        }
    }
}

/// Drives frames through the slot ring.
#[derive(Debug)]
pub struct FrameDriver {
    state: FrameState,
    current_slot: usize,
    frames_in_flight: usize,
    frame_count: u64,
    stats_interval: u64,
    stats: FrameStats,
}

impl FrameDriver {
    pub fn new(frames_in_flight: usize, stats_interval: u64) -> Self {
        Self {
            state: FrameState::Idle,
            current_slot: 0,
            frames_in_flight: frames_in_flight.max(1),
            frame_count: 0,
            stats_interval,
            stats: FrameStats::new(),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Frames that reached the submit stage.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Leave `NeedsResize` after the swapchain has been rebuilt.
    pub fn resume(&mut self) {
        if self.state == FrameState::NeedsResize {
            self.state = FrameState::Idle;
            self.stats.resizes += 1;
        }
    }

    /// Run one frame.
    ///
    /// Recoverable swapchain conditions are reported as
    /// [`FrameOutcome::NeedsResize`]; everything else is returned as an error
    /// with the state left at the failing stage.
    pub fn run_frame<S, R>(
        &mut self,
        device: &S::Device,
        swapchain: &SwapchainManager<S>,
        sync: &mut FrameSynchronizer,
        recorder: &mut R,
    ) -> Result<FrameOutcome>
    where
        S: PresentSurface,
        R: FrameRecorder<S::Device> + ?Sized,
    {
        if self.state == FrameState::NeedsResize {
            return Ok(FrameOutcome::NeedsResize);
        }
        let Some(swapchain_state) = swapchain.state() else {
            return Ok(FrameOutcome::Skipped);
        };

        let slot_index = self.current_slot;

        self.state = FrameState::WaitSlot;
        {
            let _span = trace_span!("frame.wait_slot", slot = slot_index).entered();
            sync.wait_for_slot(device, slot_index)?;
        }
        let slot = *sync.slot(slot_index).ok_or_else(|| {
            PresentError::InvalidConfig(format!("slot {slot_index} out of range"))
        })?;

        self.state = FrameState::Acquire;
        let acquired = {
            let _span = trace_span!("frame.acquire", slot = slot_index).entered();
            swapchain.acquire_next_image(device, slot.acquire_signal)
        };
        let image_index = match acquired {
            Ok(acquired) if !acquired.suboptimal => acquired.index,
            Ok(_) | Err(PresentError::Suboptimal) => {
                debug!(slot = slot_index, "Suboptimal swapchain on acquire");
                sync.mark_acquire_stale(slot_index);
                self.state = FrameState::NeedsResize;
                return Ok(FrameOutcome::NeedsResize);
            }
            Err(PresentError::OutOfDate) => {
                debug!(slot = slot_index, "Swapchain out of date on acquire");
                self.state = FrameState::NeedsResize;
                return Ok(FrameOutcome::NeedsResize);
            }
            Err(e) => return Err(e),
        };

        self.state = FrameState::TrackImage;
        {
            let _span = trace_span!("frame.track_image", image_index).entered();
            sync.track_image(device, image_index, slot_index)?;
            sync.begin_frame(device, slot_index)?;
        }

        self.state = FrameState::Record;
        let image = swapchain_state
            .image(image_index)
            .map(|image| image.image)
            .ok_or(PresentError::InvalidImageIndex {
                index: image_index,
                image_count: swapchain_state.image_count(),
            });
        let recorded = {
            let _span = trace_span!("frame.record", frame = self.frame_count).entered();
            image.and_then(|image| {
                let frame = FrameContext {
                    command_buffer: slot.command_buffer,
                    image_index,
                    image,
                    extent: swapchain_state.extent,
                    format: swapchain_state.surface_format.format,
                    slot: slot_index,
                    frame_number: self.frame_count,
                };
                record_commands(device, recorder, &frame)
            })
        };
        if let Err(e) = recorded {
            warn!(slot = slot_index, "Frame recording failed: {}", e);
            self.retire_slot(device, slot.acquire_signal, slot.fence, recorder.wait_stage())?;
            // The acquired image is never presented, so the chain must be rebuilt
            self.state = FrameState::NeedsResize;
            return Err(e);
        }

        self.state = FrameState::Submit;
        let present_signal = sync.present_signal(image_index)?;
        let submitted = {
            let _span = trace_span!("frame.submit", slot = slot_index).entered();
            device.submit(&Submission {
                command_buffer: Some(slot.command_buffer),
                wait_semaphore: slot.acquire_signal,
                wait_stage: recorder.wait_stage(),
                signal_semaphore: Some(present_signal),
                fence: slot.fence,
            })
        };
        if let Err(e) = submitted {
            if !e.needs_resize() {
                return Err(e);
            }
            // Nothing reached the queue; the fence was already reset
            debug!(slot = slot_index, "Swapchain out of date on submit");
            self.retire_slot(device, slot.acquire_signal, slot.fence, recorder.wait_stage())?;
            self.state = FrameState::NeedsResize;
            return Ok(FrameOutcome::NeedsResize);
        }

        self.state = FrameState::Present;
        let presented = {
            let _span = trace_span!("frame.present", image_index).entered();
            swapchain.present(device, image_index, present_signal)
        };
        // Work was submitted, so the slot advances whatever presentation reports
        self.advance();

        match presented {
            Ok(false) => {
                self.state = FrameState::Idle;
                self.stats.presented += 1;
                self.report_stats();
                Ok(FrameOutcome::Presented {
                    image_index,
                    slot: slot_index,
                })
            }
            Ok(true) => {
                debug!(image_index, "Suboptimal swapchain on present");
                self.state = FrameState::NeedsResize;
                Ok(FrameOutcome::NeedsResize)
            }
            Err(e) if e.needs_resize() => {
                debug!(image_index, "Swapchain out of date on present");
                self.state = FrameState::NeedsResize;
                Ok(FrameOutcome::NeedsResize)
            }
            Err(e) => Err(e),
        }
    }

    /// Consume the acquire signal and signal the fence without doing any work,
    /// so the slot cannot deadlock the next time it is waited on.
    fn retire_slot<D: DeviceContext>(
        &mut self,
        device: &D,
        acquire_signal: vk::Semaphore,
        fence: vk::Fence,
        wait_stage: vk::PipelineStageFlags,
    ) -> Result<()> {
        device.submit(&Submission {
            command_buffer: None,
            wait_semaphore: acquire_signal,
            wait_stage,
            signal_semaphore: None,
            fence,
        })?;
        self.advance();
        self.state = FrameState::Idle;
        Ok(())
    }

    fn advance(&mut self) {
        self.current_slot = (self.current_slot + 1) % self.frames_in_flight;
        self.frame_count += 1;
    }

    fn report_stats(&mut self) {
        if self.stats_interval == 0 || self.frame_count % self.stats_interval != 0 {
            return;
        }

        let elapsed = self.stats.window_start.elapsed().as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let fps = if elapsed > 0.0 {
            self.stats.presented as f64 / elapsed
        } else {
            0.0
        };
        debug!(
            "Frame {}: {:.1} fps over {} presented frames, {} resizes",
            self.frame_count, fps, self.stats.presented, self.stats.resizes
        );
        trace!(slot = self.current_slot, "Frame statistics window reset");
        self.stats = FrameStats::new();
    }
}

fn record_commands<D, R>(device: &D, recorder: &mut R, frame: &FrameContext) -> Result<()>
where
    D: DeviceContext,
    R: FrameRecorder<D> + ?Sized,
{
    device.reset_command_buffer(frame.command_buffer)?;
    device.begin_command_buffer(frame.command_buffer)?;
    recorder.record(device, frame)?;
    device.end_command_buffer(frame.command_buffer)
}
