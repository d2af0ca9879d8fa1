//! Swapchain management.
//!
//! [`SwapchainManager`] owns the presentable image chain bound to a surface.
//! Recreation builds a complete new [`SwapchainState`] and swaps it in; the
//! old chain is handed to the driver as the replace hint and destroyed only
//! after the new one exists.

use crate::config::PresentConfig;
use crate::device::{DeviceContext, PresentSurface};
use crate::error::{PresentError, Result};
use ash::vk;
use tracing::{debug, info};
use zeta_gpu::swapchain::SwapchainDescriptor;
use zeta_gpu::SurfaceSupport;

/// A presentable image and its position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub index: u32,
    pub image: vk::Image,
}

/// The live swapchain.
#[derive(Debug, Clone)]
pub struct SwapchainState {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<SwapchainImage>,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    /// Image count that was requested from the surface.
    pub min_image_count: u32,
}

impl SwapchainState {
    /// Number of images the platform actually created.
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Look up an image by index.
    pub fn image(&self, index: u32) -> Option<&SwapchainImage> {
        self.images.get(index as usize)
    }
}

/// Result of a successful acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    /// The image was acquired but the chain no longer matches the surface.
    pub suboptimal: bool,
}

/// Owns the swapchain for one surface.
pub struct SwapchainManager<S: PresentSurface> {
    surface: S,
    preferred_image_count: u32,
    preferred_format: vk::SurfaceFormatKHR,
    preferred_present_mode: vk::PresentModeKHR,
    acquire_timeout_ns: u64,
    /// Usage the frame recorder cannot do without.
    required_usage: vk::ImageUsageFlags,
    state: Option<SwapchainState>,
}

impl<S: PresentSurface> SwapchainManager<S> {
    /// Wrap a surface. No swapchain exists until [`Self::create`] succeeds.
    pub fn new(surface: S, config: &PresentConfig) -> Self {
        Self {
            surface,
            preferred_image_count: config.preferred_image_count,
            preferred_format: config.preferred_format,
            preferred_present_mode: config.preferred_present_mode,
            acquire_timeout_ns: config.acquire_timeout_ns,
            required_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            state: None,
        }
    }

    /// Image usage every swapchain must support; builds on surfaces lacking it
    /// fail with [`PresentError::Unsupported`].
    pub fn require_usage(&mut self, usage: vk::ImageUsageFlags) {
        self.required_usage = usage;
    }

    /// Build the swapchain for the requested extent.
    ///
    /// If a swapchain already exists it is passed as the replace hint and
    /// destroyed after the new chain is built. A zero-area extent fails with
    /// [`PresentError::DegenerateExtent`] and leaves the current state untouched.
    pub fn create(&mut self, device: &S::Device, width: u32, height: u32) -> Result<&SwapchainState> {
        let descriptor = self.resolve(device, width, height)?;
        self.build(device, &descriptor)
    }

    /// Rebuild the swapchain after a resize.
    ///
    /// Waits for the device to go idle before replacing anything: no in-flight
    /// submission may still reference the old images. The extent is validated
    /// first, so a degenerate request neither blocks nor changes state.
    pub fn recreate(
        &mut self,
        device: &S::Device,
        width: u32,
        height: u32,
    ) -> Result<&SwapchainState> {
        let descriptor = self.resolve(device, width, height)?;
        device.wait_idle()?;
        self.build(device, &descriptor)
    }

    fn resolve(&self, device: &S::Device, width: u32, height: u32) -> Result<SwapchainDescriptor> {
        let support = self.surface.query_support(device)?;
        resolve_descriptor(
            &support,
            width,
            height,
            self.preferred_image_count,
            self.preferred_format,
            self.preferred_present_mode,
            self.required_usage,
        )
    }

    fn build(&mut self, device: &S::Device, descriptor: &SwapchainDescriptor) -> Result<&SwapchainState> {
        let old = self
            .state
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |state| state.handle);

        let handle = self.surface.create_swapchain(device, descriptor, old)?;

        let raw_images = match self.surface.swapchain_images(device, handle) {
            Ok(images) => images,
            Err(e) => {
                self.surface.destroy_swapchain(device, handle);
                return Err(e);
            }
        };

        if let Some(previous) = self.state.take() {
            self.surface.destroy_swapchain(device, previous.handle);
            debug!("Retired swapchain {:?}", previous.handle);
        }

        let images = raw_images
            .into_iter()
            .enumerate()
            .map(|(index, image)| SwapchainImage {
                index: index as u32,
                image,
            })
            .collect();

        let state = SwapchainState {
            handle,
            images,
            surface_format: descriptor.surface_format,
            present_mode: descriptor.present_mode,
            extent: descriptor.extent,
            min_image_count: descriptor.min_image_count,
        };

        info!(
            "Swapchain created: {}x{} ({} images, {:?}, {:?})",
            state.extent.width,
            state.extent.height,
            state.image_count(),
            state.surface_format.format,
            state.present_mode
        );

        Ok(self.state.insert(state))
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    pub fn acquire_next_image(
        &self,
        device: &S::Device,
        semaphore: vk::Semaphore,
    ) -> Result<AcquiredImage> {
        let state = self.require_state()?;
        let (index, suboptimal) =
            self.surface
                .acquire_next_image(device, state.handle, semaphore, self.acquire_timeout_ns)?;

        if index >= state.image_count() {
            return Err(PresentError::InvalidImageIndex {
                index,
                image_count: state.image_count(),
            });
        }

        Ok(AcquiredImage { index, suboptimal })
    }

    /// Present an acquired image once `wait_semaphore` is signaled.
    ///
    /// Returns whether the chain is suboptimal.
    pub fn present(
        &self,
        device: &S::Device,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool> {
        let state = self.require_state()?;
        self.surface
            .queue_present(device, state.handle, image_index, wait_semaphore)
    }

    fn require_state(&self) -> Result<&SwapchainState> {
        self.state.as_ref().ok_or(PresentError::OutOfDate)
    }

    /// The live swapchain, if one has been built.
    pub fn state(&self) -> Option<&SwapchainState> {
        self.state.as_ref()
    }

    /// Image count of the live swapchain (0 before the first build).
    pub fn image_count(&self) -> u32 {
        self.state.as_ref().map_or(0, SwapchainState::image_count)
    }

    /// Images of the live swapchain (empty before the first build).
    pub fn images(&self) -> &[SwapchainImage] {
        self.state.as_ref().map_or(&[], |state| state.images.as_slice())
    }

    /// Extent of the live swapchain.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.state.as_ref().map(|state| state.extent)
    }

    /// The wrapped surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Destroy the swapchain. The device must be idle.
    pub fn destroy(&mut self, device: &S::Device) {
        if let Some(state) = self.state.take() {
            self.surface.destroy_swapchain(device, state.handle);
        }
    }

    /// Destroy the swapchain and then the surface. The device must be idle.
    pub fn destroy_with_surface(mut self, device: &S::Device) {
        self.destroy(device);
        self.surface.destroy_surface(device);
    }
}

/// Turn surface support and preferences into a complete swapchain descriptor.
pub fn resolve_descriptor(
    support: &SurfaceSupport,
    width: u32,
    height: u32,
    preferred_image_count: u32,
    preferred_format: vk::SurfaceFormatKHR,
    preferred_present_mode: vk::PresentModeKHR,
    required_usage: vk::ImageUsageFlags,
) -> Result<SwapchainDescriptor> {
    let caps = &support.capabilities;
    let extent = resolve_extent(caps, width, height)?;

    Ok(SwapchainDescriptor {
        min_image_count: select_image_count(caps, preferred_image_count),
        surface_format: select_surface_format(&support.formats, preferred_format)?,
        present_mode: select_present_mode(&support.present_modes, preferred_present_mode),
        extent,
        image_usage: select_image_usage(caps, required_usage)?,
        pre_transform: caps.current_transform,
        composite_alpha: select_composite_alpha(caps),
    })
}

/// Calculate the swapchain extent, failing on zero area.
///
/// A surface with a fixed `current_extent` dictates the size; otherwise the
/// request is clamped to the supported range.
pub fn resolve_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> Result<vk::Extent2D> {
    if width == 0 || height == 0 {
        return Err(PresentError::DegenerateExtent { width, height });
    }

    let extent = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    };

    if extent.width == 0 || extent.height == 0 {
        return Err(PresentError::DegenerateExtent {
            width: extent.width,
            height: extent.height,
        });
    }

    Ok(extent)
}

/// Image count to request: the preference, raised to the surface minimum and
/// capped at the surface maximum (0 means unbounded).
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, preferred: u32) -> u32 {
    let mut count = preferred.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count = count.min(capabilities.max_image_count);
    }
    count
}

/// Select the surface format.
pub fn select_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Result<vk::SurfaceFormatKHR> {
    match available {
        [] => Err(PresentError::Unsupported(
            "surface reports no formats".to_string(),
        )),
        // A single UNDEFINED entry means the surface has no preference
        [only] if only.format == vk::Format::UNDEFINED => Ok(preferred),
        _ => Ok(available
            .iter()
            .copied()
            .find(|format| *format == preferred)
            .unwrap_or(available[0])),
    }
}

/// Select the present mode; FIFO is always supported.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Colour attachment and `required` usage, plus transfer-dst when the surface
/// allows it. Fails if the surface lacks any of the required usage.
pub fn select_image_usage(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    required: vk::ImageUsageFlags,
) -> Result<vk::ImageUsageFlags> {
    let supported = capabilities.supported_usage_flags;
    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | required;
    if !supported.contains(usage) {
        return Err(PresentError::Unsupported(format!(
            "surface supports image usage {supported:?}, frames need {usage:?}"
        )));
    }
    if supported.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    Ok(usage)
}

/// Opaque compositing when supported, else the first supported mode.
pub fn select_composite_alpha(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    let supported = capabilities.supported_composite_alpha;
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|mode| supported.contains(*mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}
