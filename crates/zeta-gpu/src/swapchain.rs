//! Raw swapchain calls.
//!
//! Policy (format, present mode, image count, extent) lives in the presentation
//! layer; this module only turns a fully resolved [`SwapchainDescriptor`] into
//! Vulkan calls.

use crate::error::{GpuError, Result};
use ash::vk;

/// Fully resolved parameters for a swapchain build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDescriptor {
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

/// Create a swapchain, handing `old_swapchain` to the driver as the replace hint.
///
/// The old swapchain is retired but not destroyed; the caller destroys it once
/// the new one exists.
///
/// # Safety
/// All handles must be valid. `old_swapchain` must be null or a swapchain of `surface`.
pub unsafe fn create_swapchain(
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    descriptor: &SwapchainDescriptor,
    old_swapchain: vk::SwapchainKHR,
) -> Result<vk::SwapchainKHR> {
    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(descriptor.min_image_count)
        .image_format(descriptor.surface_format.format)
        .image_color_space(descriptor.surface_format.color_space)
        .image_extent(descriptor.extent)
        .image_array_layers(1)
        .image_usage(descriptor.image_usage)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(descriptor.pre_transform)
        .composite_alpha(descriptor.composite_alpha)
        .present_mode(descriptor.present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    swapchain_loader
        .create_swapchain(&create_info, None)
        .map_err(GpuError::SwapchainCreation)
}

/// Acquire the next presentable image, signaling `semaphore` when it is ready.
///
/// Returns the image index and whether the swapchain is suboptimal.
/// `ERROR_OUT_OF_DATE_KHR` means no image was acquired.
///
/// # Safety
/// All handles must be valid and `semaphore` must have no pending signal.
pub unsafe fn acquire_next_image(
    swapchain_loader: &ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    semaphore: vk::Semaphore,
    timeout_ns: u64,
) -> Result<(u32, bool)> {
    let (index, suboptimal) =
        swapchain_loader.acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())?;
    Ok((index, suboptimal))
}

/// Queue an image for presentation once `wait_semaphore` is signaled.
///
/// Returns whether the swapchain is suboptimal.
///
/// # Safety
/// All handles must be valid and `image_index` must have been acquired.
pub unsafe fn queue_present(
    swapchain_loader: &ash::khr::swapchain::Device,
    queue: vk::Queue,
    swapchain: vk::SwapchainKHR,
    image_index: u32,
    wait_semaphore: vk::Semaphore,
) -> Result<bool> {
    let swapchains = [swapchain];
    let image_indices = [image_index];
    let wait_semaphores = [wait_semaphore];

    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(&wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&image_indices);

    let suboptimal = swapchain_loader.queue_present(queue, &present_info)?;
    Ok(suboptimal)
}
