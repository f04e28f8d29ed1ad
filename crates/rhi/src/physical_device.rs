//! Physical device (GPU) selection.
//!
//! Devices are filtered on Vulkan 1.3 support and, when a surface is given,
//! on swapchain support plus at least one queue family that can present.
//! Remaining candidates are scored, discrete GPUs first.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// A surface to check presentation support against during selection.
#[derive(Clone, Copy)]
pub struct SurfaceQuery<'a> {
    pub loader: &'a ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Properties of every queue family, in family-index order.
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Presentation support per queue family. All `false` when headless.
    pub present_support: Vec<bool>,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Whether any queue family can present to the surface used at selection.
    pub fn can_present(&self) -> bool {
        self.present_support.iter().any(|&supported| supported)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families.len())
            .finish()
    }
}

/// Selects the most suitable physical device.
///
/// Pass `None` for `surface` in headless mode.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no device qualifies.
pub fn select_physical_device(
    instance: &Instance,
    surface: Option<SurfaceQuery<'_>>,
) -> RhiResult<PhysicalDeviceInfo> {
    let instance = instance.handle();
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut candidates = Vec::with_capacity(devices.len());
    for device in devices {
        if let Some(info) = check_device_suitability(instance, device, surface)? {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            candidates.push((info, score));
        }
    }

    let Some((selected, score)) = candidates.into_iter().max_by_key(|(_, score)| *score) else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: Option<SurfaceQuery<'_>>,
) -> RhiResult<Option<PhysicalDeviceInfo>> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let device_name = properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("Unknown")
        .to_owned();

    // Dynamic rendering and synchronization2 are core in 1.3
    if !is_api_version_supported(properties.api_version) {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return Ok(None);
    }

    let mut present_support = vec![false; queue_families.len()];
    if let Some(query) = surface {
        if !supports_extension(instance, device, ash::khr::swapchain::NAME)? {
            debug!("GPU '{}' skipped: VK_KHR_swapchain not supported", device_name);
            return Ok(None);
        }
        for (family, supported) in present_support.iter_mut().enumerate() {
            *supported = unsafe {
                query.loader.get_physical_device_surface_support(
                    device,
                    family as u32,
                    query.surface,
                )?
            };
        }
        if !present_support.iter().any(|&supported| supported) {
            debug!("GPU '{}' skipped: no queue family can present", device_name);
            return Ok(None);
        }
    }

    if !queue_families
        .iter()
        .any(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
    {
        debug!("GPU '{}' skipped: no graphics queue family", device_name);
        return Ok(None);
    }

    Ok(Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
        present_support,
    }))
}

fn supports_extension(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    name: &CStr,
) -> RhiResult<bool> {
    let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
    Ok(extensions
        .iter()
        .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext_name| ext_name == name)))
}

fn is_api_version_supported(version: u32) -> bool {
    let major = vk::api_version_major(version);
    let minor = vk::api_version_minor(version);
    major > 1 || (major == 1 && minor >= 3)
}

/// Higher scores indicate more desirable devices.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    // A single family doing both graphics and present avoids ownership transfers
    let combined = info
        .queue_families
        .iter()
        .zip(&info.present_support)
        .any(|(family, &present)| present && family.queue_flags.contains(vk::QueueFlags::GRAPHICS));
    if combined {
        score += 100;
    }

    score
}
