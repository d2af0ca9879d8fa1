//! Vulkan implementations of the device and surface seams.

use crate::device::{DeviceContext, ImageBarrier, PresentSurface, Submission};
use crate::error::Result;
use ash::vk;
use tracing::trace;
use zeta_gpu::swapchain::SwapchainDescriptor;
use zeta_gpu::{command, swapchain, sync, GpuContext, SurfaceContext, SurfaceSupport};

impl DeviceContext for GpuContext {
    fn graphics_queue_family(&self) -> u32 {
        GpuContext::graphics_queue_family(self)
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        // SAFETY: The device is valid for the lifetime of the context
        Ok(unsafe { sync::create_semaphore(self.device())? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        // SAFETY: Callers only destroy semaphores with no pending operations
        unsafe { self.device().destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        // SAFETY: The device is valid for the lifetime of the context
        Ok(unsafe { sync::create_fence(self.device(), signaled)? })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        // SAFETY: Callers only destroy fences after the device went idle
        unsafe { self.device().destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        // SAFETY: The fence was created from this device
        Ok(unsafe { sync::wait_for_fence(self.device(), fence, timeout_ns)? })
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        // SAFETY: The fence was observed signaled, so it is not pending on the queue
        Ok(unsafe { sync::reset_fence(self.device(), fence)? })
    }

    fn create_command_pool(&self, queue_family: u32) -> Result<vk::CommandPool> {
        // SAFETY: The queue family belongs to this device
        Ok(unsafe { command::create_command_pool(self.device(), queue_family)? })
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        // SAFETY: The pool was created from this device
        Ok(unsafe { command::allocate_primary_command_buffers(self.device(), pool, count)? })
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        // SAFETY: No buffer from the pool is pending execution
        unsafe { self.device().destroy_command_pool(pool, None) };
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        // SAFETY: The slot fence was waited on, so the buffer is not pending
        unsafe {
            self.device()
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        // SAFETY: The buffer was just reset
        Ok(unsafe { command::begin_one_time(self.device(), command_buffer)? })
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        // SAFETY: The buffer is in the recording state
        unsafe { self.device().end_command_buffer(command_buffer)? };
        Ok(())
    }

    fn cmd_image_barrier(&self, command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        // SAFETY: The buffer is recording and the image belongs to the live swapchain
        unsafe {
            command::cmd_color_image_barrier(
                self.device(),
                command_buffer,
                barrier.image,
                barrier.old_layout,
                barrier.new_layout,
                barrier.src_stage,
                barrier.dst_stage,
                barrier.src_access,
                barrier.dst_access,
            );
        }
    }

    fn cmd_clear_color(&self, command_buffer: vk::CommandBuffer, image: vk::Image, color: [f32; 4]) {
        let clear_value = vk::ClearColorValue { float32: color };
        // SAFETY: The buffer is recording and the image is in TRANSFER_DST_OPTIMAL layout
        unsafe {
            self.device().cmd_clear_color_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_value,
                &[command::color_subresource_range()],
            );
        }
    }

    fn submit(&self, submission: &Submission) -> Result<()> {
        let command_buffers: &[vk::CommandBuffer] = match &submission.command_buffer {
            Some(cmd) => std::slice::from_ref(cmd),
            None => &[],
        };
        let signal_semaphores: &[vk::Semaphore] = match &submission.signal_semaphore {
            Some(semaphore) => std::slice::from_ref(semaphore),
            None => &[],
        };
        trace!(
            command_buffers = command_buffers.len(),
            "Submitting to graphics queue"
        );

        // SAFETY: All handles come from this device and the fence is unsignaled
        unsafe {
            command::submit_command_buffers(
                self.device(),
                self.graphics_queue(),
                command_buffers,
                &[submission.wait_semaphore],
                &[submission.wait_stage],
                signal_semaphores,
                submission.fence,
            )?;
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        Ok(GpuContext::wait_idle(self)?)
    }
}

impl PresentSurface for SurfaceContext {
    type Device = GpuContext;

    fn query_support(&self, device: &GpuContext) -> Result<SurfaceSupport> {
        Ok(self.support(device)?)
    }

    fn create_swapchain(
        &self,
        _device: &GpuContext,
        descriptor: &SwapchainDescriptor,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<vk::SwapchainKHR> {
        // SAFETY: The surface is alive and `old_swapchain` is null or built on it
        Ok(unsafe {
            swapchain::create_swapchain(&self.swapchain_loader, self.surface, descriptor, old_swapchain)?
        })
    }

    fn swapchain_images(
        &self,
        _device: &GpuContext,
        swapchain: vk::SwapchainKHR,
    ) -> Result<Vec<vk::Image>> {
        // SAFETY: The swapchain was created by this loader
        Ok(unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? })
    }

    fn destroy_swapchain(&self, _device: &GpuContext, swapchain: vk::SwapchainKHR) {
        // SAFETY: The device is idle or the swapchain was never used
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn acquire_next_image(
        &self,
        _device: &GpuContext,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool)> {
        // SAFETY: The acquire signal has no pending operation once its slot fence was waited on
        Ok(unsafe {
            swapchain::acquire_next_image(&self.swapchain_loader, swapchain, semaphore, timeout_ns)?
        })
    }

    fn queue_present(
        &self,
        device: &GpuContext,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool> {
        // SAFETY: `image_index` was acquired and its present signal is pending
        Ok(unsafe {
            swapchain::queue_present(
                &self.swapchain_loader,
                device.graphics_queue(),
                swapchain,
                image_index,
                wait_semaphore,
            )?
        })
    }

    fn destroy_surface(&self, _device: &GpuContext) {
        // SAFETY: Every swapchain on this surface has been destroyed
        unsafe { self.destroy() };
    }
}
