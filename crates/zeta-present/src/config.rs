//! Presentation configuration.

use crate::error::{PresentError, Result};
use ash::vk;

/// Tunables for the presentation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentConfig {
    /// Number of frame slots (frames the CPU may run ahead of the GPU).
    pub frames_in_flight: usize,
    /// Swapchain image count requested when the surface allows it.
    pub preferred_image_count: u32,
    /// Surface format used when supported.
    pub preferred_format: vk::SurfaceFormatKHR,
    /// Present mode used when supported; FIFO otherwise.
    pub preferred_present_mode: vk::PresentModeKHR,
    /// Timeout for image acquisition in nanoseconds.
    pub acquire_timeout_ns: u64,
    /// Timeout for frame fence waits in nanoseconds.
    pub fence_timeout_ns: u64,
    /// Frames between frame-statistics log lines (0 disables them).
    pub stats_interval: u64,
}

impl Default for PresentConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            preferred_image_count: 3,
            preferred_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            acquire_timeout_ns: u64::MAX,
            fence_timeout_ns: u64::MAX,
            stats_interval: 200,
        }
    }
}

impl PresentConfig {
    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the preferred swapchain image count.
    pub fn with_image_count(mut self, count: u32) -> Self {
        self.preferred_image_count = count;
        self
    }

    /// Set the preferred surface format.
    pub fn with_format(mut self, format: vk::SurfaceFormatKHR) -> Self {
        self.preferred_format = format;
        self
    }

    /// Set the preferred present mode.
    pub fn with_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        self.preferred_present_mode = mode;
        self
    }

    /// Choose between FIFO (vsync) and mailbox presentation.
    pub fn with_vsync(self, vsync: bool) -> Self {
        if vsync {
            self.with_present_mode(vk::PresentModeKHR::FIFO)
        } else {
            self.with_present_mode(vk::PresentModeKHR::MAILBOX)
        }
    }

    /// Set both GPU wait timeouts.
    pub fn with_timeouts(mut self, acquire_ns: u64, fence_ns: u64) -> Self {
        self.acquire_timeout_ns = acquire_ns;
        self.fence_timeout_ns = fence_ns;
        self
    }

    /// Set the frame-statistics log interval.
    pub fn with_stats_interval(mut self, frames: u64) -> Self {
        self.stats_interval = frames;
        self
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(PresentError::InvalidConfig(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.preferred_image_count == 0 {
            return Err(PresentError::InvalidConfig(
                "preferred_image_count must be at least 1".to_string(),
            ));
        }
        if self.acquire_timeout_ns == 0 || self.fence_timeout_ns == 0 {
            return Err(PresentError::InvalidConfig(
                "GPU wait timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
