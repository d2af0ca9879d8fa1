//! Seams to the GPU and windowing collaborators.
//!
//! The core never talks to Vulkan or the window system directly. Everything
//! it needs is expressed by three traits:
//! - [`DeviceContext`]: fences, semaphores, command buffers, queue submission
//!   and the idle barrier
//! - [`PresentSurface`]: surface queries and swapchain calls
//! - [`ConfigureAck`]: echoing a configure serial back to the window system
//!
//! Handles are plain `ash::vk` handles so a Vulkan device and a software
//! timeline can implement the same contract.

use crate::error::Result;
use ash::vk;
use zeta_gpu::swapchain::SwapchainDescriptor;
use zeta_gpu::SurfaceSupport;

/// A layout transition of one colour image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

impl ImageBarrier {
    /// Discard previous contents and prepare the image as a clear/copy target.
    ///
    /// The source stage matches the acquire wait stage so the transition is
    /// ordered after the presentation engine releases the image.
    pub fn undefined_to_transfer_dst(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
        }
    }

    /// Hand a transfer target over to the presentation engine.
    pub fn transfer_dst_to_present(image: vk::Image) -> Self {
        Self {
            image,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::empty(),
        }
    }
}

/// One queue submission.
///
/// `command_buffer` is `None` only when a slot is retired without work, which
/// still consumes the acquire signal and signals the fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub command_buffer: Option<vk::CommandBuffer>,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: Option<vk::Semaphore>,
    pub fence: vk::Fence,
}

/// Logical device with a single graphics queue.
///
/// Implementations must report Vulkan failures through [`crate::PresentError`]
/// using its `From<vk::Result>` classification.
pub trait DeviceContext {
    /// Queue family of the graphics queue used for submission and presentation.
    fn graphics_queue_family(&self) -> u32;

    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);

    /// Block until `fence` is signaled.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;

    /// Create a pool whose buffers can be reset individually.
    fn create_command_pool(&self, queue_family: u32) -> Result<vk::CommandPool>;
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>>;
    /// Destroy a pool together with every buffer allocated from it.
    fn destroy_command_pool(&self, pool: vk::CommandPool);

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;

    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier);
    /// Clear a whole image that is in `TRANSFER_DST_OPTIMAL` layout.
    fn cmd_clear_color(&self, command_buffer: vk::CommandBuffer, image: vk::Image, color: [f32; 4]);

    /// Submit to the graphics queue.
    fn submit(&self, submission: &Submission) -> Result<()>;

    /// Block until all submitted work has finished.
    fn wait_idle(&self) -> Result<()>;
}

/// A presentation surface and the swapchain calls made against it.
pub trait PresentSurface {
    type Device: DeviceContext;

    /// Capabilities, formats and present modes supported right now.
    fn query_support(&self, device: &Self::Device) -> Result<SurfaceSupport>;

    /// Build a swapchain; `old_swapchain` is the replace hint (may be null).
    fn create_swapchain(
        &self,
        device: &Self::Device,
        descriptor: &SwapchainDescriptor,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<vk::SwapchainKHR>;

    fn swapchain_images(
        &self,
        device: &Self::Device,
        swapchain: vk::SwapchainKHR,
    ) -> Result<Vec<vk::Image>>;

    fn destroy_swapchain(&self, device: &Self::Device, swapchain: vk::SwapchainKHR);

    /// Acquire an image index, signaling `semaphore` when it is usable.
    ///
    /// Returns `(index, suboptimal)`; an out-of-date swapchain is reported as
    /// [`crate::PresentError::OutOfDate`].
    fn acquire_next_image(
        &self,
        device: &Self::Device,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool)>;

    /// Present `image_index` after `wait_semaphore`; returns `suboptimal`.
    fn queue_present(
        &self,
        device: &Self::Device,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool>;

    /// Destroy the surface itself. Every swapchain must be gone.
    fn destroy_surface(&self, device: &Self::Device);
}

/// Windowing collaborator side of the configure handshake.
pub trait ConfigureAck {
    /// Echo a configure serial back to the window system.
    fn ack_configure(&mut self, serial: u32);
}

impl<F: FnMut(u32)> ConfigureAck for F {
    fn ack_configure(&mut self, serial: u32) {
        self(serial);
    }
}
