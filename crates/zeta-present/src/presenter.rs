//! Application-facing facade.

use crate::config::PresentConfig;
use crate::device::{ConfigureAck, DeviceContext, PresentSurface};
use crate::driver::{FrameDriver, FrameOutcome, FrameState};
use crate::error::{PresentError, Result};
use crate::record::FrameRecorder;
use crate::resize::{ResizeCoordinator, ResizeState, ResizeStatus};
use crate::swapchain::SwapchainManager;
use crate::sync::FrameSynchronizer;
use ash::vk;
use tracing::{info, warn};

/// Owns the device, the swapchain, the frame synchronizer and the frame
/// driver, and tears them down in reverse order in [`Presenter::shutdown`].
pub struct Presenter<S, R>
where
    S: PresentSurface,
    R: FrameRecorder<S::Device>,
{
    device: S::Device,
    swapchain: SwapchainManager<S>,
    sync: FrameSynchronizer,
    driver: FrameDriver,
    resize: ResizeCoordinator,
    recorder: R,
    /// Size most recently requested by the window system.
    requested_extent: vk::Extent2D,
    next_local_serial: u32,
}

impl<S, R> Presenter<S, R>
where
    S: PresentSurface,
    R: FrameRecorder<S::Device>,
{
    /// Build the swapchain and the frame-slot ring for a window of the given size.
    ///
    /// A zero-area window is not an error: the presenter starts with a pending
    /// resize and skips frames until a usable size is reported. On failure the
    /// surface is destroyed before the error is returned.
    pub fn init(
        device: S::Device,
        surface: S,
        width: u32,
        height: u32,
        config: PresentConfig,
        recorder: R,
    ) -> Result<Self> {
        let mut swapchain = SwapchainManager::new(surface, &config);
        swapchain.require_usage(recorder.image_usage());
        if let Err(e) = config.validate() {
            swapchain.destroy_with_surface(&device);
            return Err(e);
        }
        let mut resize = ResizeCoordinator::new();

        match swapchain.create(&device, width, height) {
            Ok(_) => {}
            Err(PresentError::DegenerateExtent { .. }) => {
                info!("Window has no area ({}x{}), deferring swapchain", width, height);
                resize.invalidate(width, height);
            }
            Err(e) => {
                swapchain.destroy_with_surface(&device);
                return Err(e);
            }
        }

        let mut sync = match FrameSynchronizer::initialize(
            &device,
            config.frames_in_flight,
            config.fence_timeout_ns,
        ) {
            Ok(sync) => sync,
            Err(e) => {
                swapchain.destroy_with_surface(&device);
                return Err(e);
            }
        };

        if swapchain.state().is_some() {
            if let Err(e) = sync.resize(&device, swapchain.image_count()) {
                sync.destroy(&device);
                swapchain.destroy_with_surface(&device);
                return Err(e);
            }
        }

        info!(
            "Presenter initialized: {} frames in flight, {} swapchain images",
            config.frames_in_flight,
            swapchain.image_count()
        );

        Ok(Self {
            device,
            swapchain,
            sync,
            driver: FrameDriver::new(config.frames_in_flight, config.stats_interval),
            resize,
            recorder,
            requested_extent: vk::Extent2D { width, height },
            next_local_serial: 1,
        })
    }

    /// Draw and present one frame.
    ///
    /// Frames are skipped while a resize is pending. A stale swapchain is
    /// reported as [`FrameOutcome::NeedsResize`] and queues a recreation at the
    /// last requested size.
    pub fn draw_frame(&mut self) -> Result<FrameOutcome> {
        if self.resize.is_pending() || self.swapchain.state().is_none() {
            return Ok(FrameOutcome::Skipped);
        }

        let outcome = match self.driver.run_frame(
            &self.device,
            &self.swapchain,
            &mut self.sync,
            &mut self.recorder,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                // An abandoned frame still holds its acquired image; only a
                // rebuild hands it back.
                if self.driver.state() == FrameState::NeedsResize {
                    self.resize
                        .invalidate(self.requested_extent.width, self.requested_extent.height);
                }
                return Err(e);
            }
        };

        if outcome == FrameOutcome::NeedsResize {
            self.resize
                .invalidate(self.requested_extent.width, self.requested_extent.height);
        }
        Ok(outcome)
    }

    /// Report a new window size from a window system without configure serials.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        let serial = self.next_local_serial;
        self.next_local_serial = self.next_local_serial.wrapping_add(1);
        self.notify_configure(serial, width, height);
    }

    /// Report a configure event carrying the window system's serial.
    pub fn notify_configure(&mut self, serial: u32, width: u32, height: u32) {
        self.requested_extent = vk::Extent2D { width, height };
        self.resize.notify(serial, width, height);
    }

    /// Apply a pending resize: acknowledge the configure, rebuild the
    /// swapchain and resize the present signals.
    ///
    /// Call between frames; this is where the device is driven idle.
    pub fn poll_resize<W: ConfigureAck + ?Sized>(&mut self, window: &mut W) -> Result<ResizeStatus> {
        let Self {
            device,
            swapchain,
            sync,
            resize,
            ..
        } = &mut *self;

        let status = resize.process(window, |width, height| {
            swapchain.recreate(device, width, height)?;
            sync.retire_stale_acquire_signals(device)?;
            sync.resize(device, swapchain.image_count())
        })?;

        if let ResizeStatus::Recreated { .. } = status {
            self.driver.resume();
        }
        Ok(status)
    }

    /// Wait for the device to go idle and release everything, device last.
    ///
    /// An idle-wait failure (for example a lost device) does not stop the
    /// teardown; it is returned once everything has been released.
    pub fn shutdown(self) -> Result<()> {
        let Self {
            device,
            swapchain,
            mut sync,
            driver,
            ..
        } = self;

        let idle = device.wait_idle();
        if let Err(e) = &idle {
            warn!("Device did not go idle before shutdown: {}", e);
        }

        sync.destroy(&device);
        swapchain.destroy_with_surface(&device);
        drop(device);

        info!("Presenter shut down after {} frames", driver.frame_count());
        idle
    }

    /// Extent of the live swapchain.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.extent()
    }

    pub fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    pub fn frames_in_flight(&self) -> usize {
        self.sync.frames_in_flight()
    }

    pub fn frame_count(&self) -> u64 {
        self.driver.frame_count()
    }

    pub fn current_slot(&self) -> usize {
        self.driver.current_slot()
    }

    pub fn frame_state(&self) -> FrameState {
        self.driver.state()
    }

    pub fn resize_state(&self) -> ResizeState {
        self.resize.state()
    }

    /// Size most recently requested by the window system.
    pub fn requested_extent(&self) -> vk::Extent2D {
        self.requested_extent
    }

    pub fn device(&self) -> &S::Device {
        &self.device
    }

    pub fn swapchain(&self) -> &SwapchainManager<S> {
        &self.swapchain
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.sync
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut R {
        &mut self.recorder
    }
}

impl<S, R> std::fmt::Debug for Presenter<S, R>
where
    S: PresentSurface,
    R: FrameRecorder<S::Device>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Presenter")
            .field("extent", &self.swapchain.extent())
            .field("image_count", &self.swapchain.image_count())
            .field("frames_in_flight", &self.sync.frames_in_flight())
            .field("driver", &self.driver)
            .field("resize", &self.resize)
            .finish_non_exhaustive()
    }
}
