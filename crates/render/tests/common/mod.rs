//! Shared setup for GPU integration tests.

use std::sync::Arc;

use vkframe_render::{ContextSettings, RenderContext};
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::select_physical_device;

/// A headless context plus what it depends on, dropped in dependency order.
pub struct Harness {
    pub context: RenderContext,
    pub device: Arc<Device>,
    _instance: Instance,
}

/// Builds a headless context, or `None` when no Vulkan 1.3 device exists.
pub fn headless(settings: ContextSettings) -> Option<Harness> {
    let instance = match Instance::new(c"vkframe-tests", false, &[]) {
        Ok(instance) => instance,
        Err(e) if e.is_unavailable() => {
            eprintln!("Skipping test: Vulkan not available ({e})");
            return None;
        }
        Err(e) => panic!("Unexpected error: {:?}", e),
    };

    let physical = match select_physical_device(&instance, None) {
        Ok(physical) => physical,
        Err(e) if e.is_unavailable() => {
            eprintln!("Skipping test: no usable GPU ({e})");
            return None;
        }
        Err(e) => panic!("Unexpected error: {:?}", e),
    };

    let device = Device::new(&instance, physical).expect("Failed to create device");
    let context = RenderContext::headless(
        device.clone(),
        ContextSettings {
            headless: true,
            ..settings
        },
    );

    Some(Harness {
        context,
        device,
        _instance: instance,
    })
}

/// Headless settings with `frames` offscreen frames of a small extent.
pub fn settings(frames: u32) -> ContextSettings {
    ContextSettings {
        headless: true,
        headless_frame_count: frames,
        headless_extent: vkframe_rhi::vk::Extent2D {
            width: 4,
            height: 4,
        },
        ..ContextSettings::default()
    }
}
