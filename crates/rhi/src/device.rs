//! Vulkan logical device, queues and the memory allocator.
//!
//! Every queue of every family is created up front so callers can look
//! queues up by capability or present support instead of by hard-coded
//! family index.
//!
//! ```no_run
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::physical_device::select_physical_device;
//!
//! let instance = Instance::new(c"demo", false, &[])?;
//! let info = select_physical_device(&instance, None)?;
//! let device = Device::new(&instance, info)?;
//! let queue = device.suitable_graphics_queue()?;
//! # Ok::<(), vkframe_rhi::RhiError>(())
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;
use crate::queue::Queue;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: &[vk::Format] = &[
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// Vulkan logical device wrapper.
///
/// Shared via `Arc`; every resource wrapper holds a clone so the device
/// outlives everything created from it. The allocator is guarded by a
/// `parking_lot::Mutex`.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical: PhysicalDeviceInfo,
    /// Indexed by `[family][queue index]`.
    queues: Vec<Vec<Queue>>,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    swapchain_enabled: bool,
}

impl Device {
    /// Creates the logical device for `physical`.
    ///
    /// `VK_KHR_swapchain` is enabled only when the physical device was
    /// selected against a surface.
    pub fn new(instance: &Instance, physical: PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let priorities: Vec<Vec<f32>> = physical
            .queue_families
            .iter()
            .map(|family| vec![1.0; family.queue_count as usize])
            .collect();

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = priorities
            .iter()
            .enumerate()
            .filter(|(_, family_priorities)| !family_priorities.is_empty())
            .map(|(family, family_priorities)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family as u32)
                    .queue_priorities(family_priorities)
            })
            .collect();

        let swapchain_enabled = physical.can_present();
        let extension_names: Vec<*const std::ffi::c_char> = if swapchain_enabled {
            vec![ash::khr::swapchain::NAME.as_ptr()]
        } else {
            Vec::new()
        };

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical.device, &create_info, None)?
        };

        info!(
            "Logical device created ({} queue families, swapchain: {})",
            queue_create_infos.len(),
            swapchain_enabled
        );

        let queues: Vec<Vec<Queue>> = physical
            .queue_families
            .iter()
            .enumerate()
            .map(|(family, properties)| {
                (0..properties.queue_count)
                    .map(|index| {
                        Queue::new(
                            device.clone(),
                            family as u32,
                            index,
                            *properties,
                            physical.present_support[family],
                        )
                    })
                    .collect()
            })
            .collect();

        for (family, family_queues) in queues.iter().enumerate() {
            debug!(
                "Queue family {}: {} queue(s), flags {:?}, present {}",
                family,
                family_queues.len(),
                physical.queue_families[family].queue_flags,
                physical.present_support[family]
            );
        }

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical,
            queues,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            swapchain_enabled,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical.device
    }

    #[inline]
    pub fn physical_info(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.physical.properties.limits
    }

    /// Whether `VK_KHR_swapchain` was enabled.
    #[inline]
    pub fn has_swapchain_support(&self) -> bool {
        self.swapchain_enabled
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Returns the queue at `index` of the first family supporting `flags`
    /// that has more than `index` queues.
    pub fn queue_by_flags(&self, flags: vk::QueueFlags, index: u32) -> RhiResult<&Queue> {
        find_family(&self.physical.queue_families, |family, _| {
            family.queue_flags.contains(flags) && family.queue_count > index
        })
        .map(|family| &self.queues[family][index as usize])
        .ok_or(RhiError::QueueNotFound { flags, index })
    }

    /// Returns the queue at `index` of the first family with present support.
    pub fn queue_by_present(&self, index: u32) -> RhiResult<&Queue> {
        let present = &self.physical.present_support;
        find_family(&self.physical.queue_families, |family, i| {
            present[i] && family.queue_count > index
        })
        .map(|family| &self.queues[family][index as usize])
        .ok_or(RhiError::NoPresentQueue)
    }

    /// Returns a graphics queue that can also present, falling back to the
    /// first graphics queue.
    pub fn suitable_graphics_queue(&self) -> RhiResult<&Queue> {
        let present = &self.physical.present_support;
        find_family(&self.physical.queue_families, |family, i| {
            present[i]
                && family.queue_count > 0
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|family| &self.queues[family][0])
        .map_or_else(|| self.queue_by_flags(vk::QueueFlags::GRAPHICS, 0), Ok)
    }

    /// Returns the format properties of `format` on this device.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical.device, format)
        }
    }

    /// Whether an optimal-tiling 2D image of `format` can be created with `usage`.
    pub fn is_image_format_supported(&self, format: vk::Format, usage: vk::ImageUsageFlags) -> bool {
        let result = unsafe {
            self.instance.get_physical_device_image_format_properties(
                self.physical.device,
                format,
                vk::ImageType::TYPE_2D,
                vk::ImageTiling::OPTIMAL,
                usage,
                vk::ImageCreateFlags::empty(),
            )
        };
        result.is_ok()
    }

    /// Returns the best depth format usable as an optimal-tiling attachment.
    pub fn supported_depth_format(&self) -> RhiResult<vk::Format> {
        first_supported_format(DEPTH_FORMAT_CANDIDATES, |format| {
            self.format_properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| RhiError::InvalidArgument("no supported depth format".to_string()))
    }

    /// Blocks until the device has finished all outstanding work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device/ash::Instance are function tables, the remaining
// fields are plain handles and the allocator sits behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

fn find_family(
    families: &[vk::QueueFamilyProperties],
    predicate: impl Fn(&vk::QueueFamilyProperties, usize) -> bool,
) -> Option<usize> {
    families
        .iter()
        .enumerate()
        .find(|(i, family)| predicate(family, *i))
        .map(|(i, _)| i)
}

/// Returns the first candidate accepted by `is_supported`.
pub fn first_supported_format(
    candidates: &[vk::Format],
    mut is_supported: impl FnMut(vk::Format) -> bool,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| is_supported(format))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_family_respects_queue_count() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::COMPUTE, 4),
        ];

        let compute = |index: u32| {
            find_family(&families, |f, _| {
                f.queue_flags.contains(vk::QueueFlags::COMPUTE) && f.queue_count > index
            })
        };
        assert_eq!(compute(0), Some(0));
        assert_eq!(compute(2), Some(1));
        assert_eq!(compute(4), None);
    }

    #[test]
    fn test_depth_format_preference() {
        let supported = [vk::Format::D24_UNORM_S8_UINT, vk::Format::D16_UNORM];
        let chosen = first_supported_format(DEPTH_FORMAT_CANDIDATES, |f| supported.contains(&f));
        assert_eq!(chosen, Some(vk::Format::D24_UNORM_S8_UINT));

        assert_eq!(first_supported_format(DEPTH_FORMAT_CANDIDATES, |_| false), None);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
