//! Draw content recorded into each frame.

use crate::device::{DeviceContext, ImageBarrier};
use crate::error::Result;
use ash::vk;

/// Everything a recorder needs to know about the frame being recorded.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Command buffer of the current slot, already in the recording state.
    pub command_buffer: vk::CommandBuffer,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// The swapchain image for this frame.
    pub image: vk::Image,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    /// Frame slot in use.
    pub slot: usize,
    /// Current frame number.
    pub frame_number: u64,
}

/// Records the draw work of a frame.
///
/// The recorder must leave `frame.image` in `PRESENT_SRC_KHR` layout.
pub trait FrameRecorder<D: DeviceContext> {
    /// Stage at which the submission waits for the acquired image.
    fn wait_stage(&self) -> vk::PipelineStageFlags {
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
    }

    /// Swapchain image usage the recorded commands rely on.
    fn image_usage(&self) -> vk::ImageUsageFlags {
        vk::ImageUsageFlags::COLOR_ATTACHMENT
    }

    fn record(&mut self, device: &D, frame: &FrameContext) -> Result<()>;
}

/// Clears the whole image to a solid colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearRecorder {
    pub color: [f32; 4],
}

impl ClearRecorder {
    pub fn new(color: [f32; 4]) -> Self {
        Self { color }
    }

    pub fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }
}

impl Default for ClearRecorder {
    fn default() -> Self {
        Self::new([0.0, 0.0, 0.0, 1.0])
    }
}

impl<D: DeviceContext> FrameRecorder<D> for ClearRecorder {
    fn wait_stage(&self) -> vk::PipelineStageFlags {
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::TRANSFER
    }

    fn image_usage(&self) -> vk::ImageUsageFlags {
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST
    }

    fn record(&mut self, device: &D, frame: &FrameContext) -> Result<()> {
        let cmd = frame.command_buffer;
        device.cmd_image_barrier(cmd, &ImageBarrier::undefined_to_transfer_dst(frame.image));
        device.cmd_clear_color(cmd, frame.image, self.color);
        device.cmd_image_barrier(cmd, &ImageBarrier::transfer_dst_to_present(frame.image));
        Ok(())
    }
}
