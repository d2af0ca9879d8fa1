//! Presentation error taxonomy.

use ash::vk;
use thiserror::Error;
use zeta_gpu::GpuError;

/// Errors raised by the presentation core.
///
/// `DegenerateExtent`, `OutOfDate` and `Suboptimal` are recoverable: the first
/// skips frame production until a usable size arrives, the other two are turned
/// into a swapchain recreation at the acquire/present boundary. Everything else
/// is fatal for this crate and propagates to the caller unchanged.
#[derive(Error, Debug)]
pub enum PresentError {
    /// Target extent has zero area (minimized window).
    #[error("Degenerate extent {width}x{height}")]
    DegenerateExtent { width: u32, height: u32 },

    /// The swapchain no longer matches the surface.
    #[error("Swapchain out of date")]
    OutOfDate,

    /// The swapchain still works but no longer matches the surface exactly.
    #[error("Swapchain suboptimal")]
    Suboptimal,

    /// The presentation surface is gone.
    #[error("Surface lost")]
    SurfaceLost,

    /// The logical device is gone.
    #[error("Device lost")]
    DeviceLost,

    /// Host or device memory exhausted.
    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    /// A bounded wait expired.
    #[error("Timed out waiting for the GPU")]
    Timeout,

    /// The platform cannot satisfy a request.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Rejected configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Acquisition returned an index outside the current image set.
    #[error("Image index {index} out of range for {image_count} swapchain images")]
    InvalidImageIndex { index: u32, image_count: u32 },

    /// Any other Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),

    /// Device context error that did not come from a Vulkan call.
    #[error("GPU error: {0}")]
    Gpu(GpuError),
}

impl PresentError {
    /// Whether the condition is handled inside the core (skip or recreate).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DegenerateExtent { .. } | Self::OutOfDate | Self::Suboptimal
        )
    }

    /// Whether the swapchain must be rebuilt before the next frame.
    pub fn needs_resize(&self) -> bool {
        matches!(self, Self::OutOfDate | Self::Suboptimal)
    }
}

impl From<vk::Result> for PresentError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::OutOfDate,
            vk::Result::SUBOPTIMAL_KHR => Self::Suboptimal,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY => Self::AllocationFailure(result.to_string()),
            vk::Result::TIMEOUT | vk::Result::NOT_READY => Self::Timeout,
            other => Self::Vulkan(other),
        }
    }
}

impl From<GpuError> for PresentError {
    fn from(error: GpuError) -> Self {
        match error.vk_result() {
            Some(result) => Self::from(result),
            None => Self::Gpu(error),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, PresentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_recoverable_results() {
        assert!(matches!(
            PresentError::from(vk::Result::ERROR_OUT_OF_DATE_KHR),
            PresentError::OutOfDate
        ));
        assert!(PresentError::from(vk::Result::SUBOPTIMAL_KHR).needs_resize());
        assert!(PresentError::DegenerateExtent { width: 0, height: 10 }.is_recoverable());
        assert!(!PresentError::DegenerateExtent { width: 0, height: 10 }.needs_resize());
    }

    #[test]
    fn classifies_fatal_results() {
        assert!(matches!(
            PresentError::from(vk::Result::ERROR_SURFACE_LOST_KHR),
            PresentError::SurfaceLost
        ));
        assert!(matches!(
            PresentError::from(vk::Result::ERROR_DEVICE_LOST),
            PresentError::DeviceLost
        ));
        assert!(matches!(
            PresentError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            PresentError::AllocationFailure(_)
        ));
        assert!(matches!(
            PresentError::from(vk::Result::ERROR_INITIALIZATION_FAILED),
            PresentError::Vulkan(vk::Result::ERROR_INITIALIZATION_FAILED)
        ));
        assert!(!PresentError::DeviceLost.is_recoverable());
    }

    #[test]
    fn gpu_errors_keep_their_vulkan_classification() {
        let swapchain_failure = GpuError::SwapchainCreation(vk::Result::ERROR_SURFACE_LOST_KHR);
        assert!(matches!(
            PresentError::from(swapchain_failure),
            PresentError::SurfaceLost
        ));

        let other = GpuError::NoSuitableDevice;
        assert!(matches!(PresentError::from(other), PresentError::Gpu(_)));
    }
}
