//! Vulkan instance creation and physical device selection.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Instance extensions needed to present to windows on `display`.
///
/// Without a display only the platform-independent extensions are enabled and
/// no surface can be created.
pub fn required_instance_extensions(display: Option<RawDisplayHandle>) -> Result<Vec<*const c_char>> {
    let extensions = match display {
        Some(display) => ash_window::enumerate_required_extensions(display)?.to_vec(),
        None => Vec::new(),
    };

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let extensions = [
        extensions,
        vec![ash::khr::portability_enumeration::NAME.as_ptr()],
    ]
    .concat();

    Ok(extensions)
}

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Create a Vulkan instance.
///
/// Requested validation layers that are not installed are skipped with a warning.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display: Option<RawDisplayHandle>,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Zeta")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_1);

    let extension_names = required_instance_extensions(display)?;

    let available_layers = entry.enumerate_instance_layer_properties()?;
    let layers: Vec<&CStr> = if enable_validation {
        validation_layers()
            .into_iter()
            .filter(|layer| {
                let found = available_layers
                    .iter()
                    .any(|props| props.layer_name_as_c_str().ok() == Some(*layer));
                if !found {
                    tracing::warn!("Validation layer {:?} not available", layer);
                }
                found
            })
            .collect()
    } else {
        Vec::new()
    };
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry.create_instance(&create_info, None)?;

    Ok(instance)
}

/// Select the best physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    instance
        .enumerate_physical_devices()?
        .into_iter()
        .map(|device| (score_physical_device(instance, device), device))
        .filter(|(score, _)| *score >= 0)
        .max_by_key(|(score, _)| *score)
        .map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Human-readable device name and type for logging.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn describe_physical_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> String {
    let properties = instance.get_physical_device_properties(device);
    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string());
    format!(
        "{name} ({:?}, Vulkan {}.{})",
        properties.device_type,
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version)
    )
}

/// Score a physical device for selection. Negative scores are unusable.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i32 {
    let properties = instance.get_physical_device_properties(device);

    let api_version = properties.api_version;
    if vk::api_version_major(api_version) < 1
        || (vk::api_version_major(api_version) == 1 && vk::api_version_minor(api_version) < 1)
    {
        return -1;
    }

    let has_graphics = instance
        .get_physical_device_queue_family_properties(device)
        .iter()
        .any(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS));
    if !has_graphics {
        return -1;
    }

    // Prefer discrete GPUs
    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{XcbDisplayHandle, XlibDisplayHandle};

    fn names(extensions: &[*const c_char]) -> Vec<&'static CStr> {
        extensions
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect()
    }

    #[test]
    fn xlib_display_needs_only_xlib_surface() {
        let display = RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0));
        let extensions = required_instance_extensions(Some(display)).unwrap();
        let names = names(&extensions);

        assert!(names.contains(&ash::khr::surface::NAME));
        assert!(names.contains(&ash::khr::xlib_surface::NAME));
        assert!(!names.contains(&ash::khr::xcb_surface::NAME));
        assert!(!names.contains(&ash::khr::wayland_surface::NAME));
    }

    #[test]
    fn xcb_display_needs_only_xcb_surface() {
        let display = RawDisplayHandle::Xcb(XcbDisplayHandle::new(None, 0));
        let names = names(&required_instance_extensions(Some(display)).unwrap());

        assert!(names.contains(&ash::khr::xcb_surface::NAME));
        assert!(!names.contains(&ash::khr::xlib_surface::NAME));
    }

    #[test]
    fn headless_needs_no_surface_extensions() {
        let names = names(&required_instance_extensions(None).unwrap());
        assert!(!names.contains(&ash::khr::surface::NAME));
    }
}
