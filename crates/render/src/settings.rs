//! Render context settings derived from configuration.

use ash::vk;

use vkframe_core::config::{PresentModeName, RenderConfig, SurfaceFormatName};
use vkframe_rhi::swapchain::{
    DEFAULT_PRESENT_MODE_PRIORITY, DEFAULT_SURFACE_FORMAT_PRIORITY, SwapchainRequest,
};

/// Everything a [`RenderContext`](crate::RenderContext) needs to negotiate
/// its swapchain or offscreen frames.
#[derive(Clone, Debug)]
pub struct ContextSettings {
    pub present_mode: Option<vk::PresentModeKHR>,
    pub present_mode_priority: Vec<vk::PresentModeKHR>,
    pub surface_format: Option<vk::SurfaceFormatKHR>,
    pub surface_format_priority: Vec<vk::SurfaceFormatKHR>,
    pub image_count: Option<u32>,
    pub image_usage: vk::ImageUsageFlags,
    pub pools_per_frame: usize,
    pub max_surface_retries: u32,
    pub headless: bool,
    pub headless_frame_count: u32,
    pub headless_extent: vk::Extent2D,
    pub deferred_targets: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            present_mode: None,
            present_mode_priority: DEFAULT_PRESENT_MODE_PRIORITY.to_vec(),
            surface_format: None,
            surface_format_priority: DEFAULT_SURFACE_FORMAT_PRIORITY.to_vec(),
            image_count: None,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            pools_per_frame: 1,
            max_surface_retries: 1,
            headless: false,
            headless_frame_count: 1,
            headless_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            deferred_targets: false,
        }
    }
}

impl ContextSettings {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            present_mode_priority: config.present_modes.iter().copied().map(present_mode).collect(),
            surface_format_priority: config
                .surface_formats
                .iter()
                .copied()
                .map(surface_format)
                .collect(),
            image_count: config.image_count,
            pools_per_frame: usize::from(config.pools_per_frame),
            max_surface_retries: config.max_surface_retries,
            headless: config.headless,
            headless_frame_count: config.headless_frame_count,
            headless_extent: vk::Extent2D {
                width: config.headless_extent[0],
                height: config.headless_extent[1],
            },
            deferred_targets: config.deferred_targets,
            ..Self::default()
        }
    }

    /// Swapchain preferences for the given extent.
    pub fn swapchain_request(&self, extent: vk::Extent2D) -> SwapchainRequest {
        SwapchainRequest {
            extent,
            image_count: self.image_count,
            present_mode: self.present_mode,
            present_mode_priority: self.present_mode_priority.clone(),
            surface_format: self.surface_format,
            surface_format_priority: self.surface_format_priority.clone(),
            image_usage: self.image_usage,
            ..SwapchainRequest::default()
        }
    }

    /// Color formats to try for offscreen frames, most preferred first.
    pub fn headless_format_candidates(&self) -> Vec<vk::Format> {
        self.surface_format
            .iter()
            .chain(&self.surface_format_priority)
            .map(|f| f.format)
            .collect()
    }
}

pub fn present_mode(name: PresentModeName) -> vk::PresentModeKHR {
    match name {
        PresentModeName::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentModeName::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModeName::Fifo => vk::PresentModeKHR::FIFO,
        PresentModeName::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

pub fn surface_format(name: SurfaceFormatName) -> vk::SurfaceFormatKHR {
    let format = match name {
        SurfaceFormatName::R8g8b8a8Srgb => vk::Format::R8G8B8A8_SRGB,
        SurfaceFormatName::B8g8r8a8Srgb => vk::Format::B8G8R8A8_SRGB,
        SurfaceFormatName::R8g8b8a8Unorm => vk::Format::R8G8B8A8_UNORM,
        SurfaceFormatName::B8g8r8a8Unorm => vk::Format::B8G8R8A8_UNORM,
    };
    vk::SurfaceFormatKHR {
        format,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_default_settings() {
        let settings = ContextSettings::from_config(&RenderConfig::default());
        let defaults = ContextSettings::default();
        assert_eq!(settings.present_mode_priority, defaults.present_mode_priority);
        assert_eq!(settings.surface_format_priority, defaults.surface_format_priority);
        assert_eq!(settings.max_surface_retries, 1);
        assert_eq!(settings.pools_per_frame, 1);
    }

    #[test]
    fn test_names_map_to_vulkan() {
        let config = RenderConfig {
            present_modes: vec![PresentModeName::Mailbox, PresentModeName::Immediate],
            surface_formats: vec![SurfaceFormatName::B8g8r8a8Unorm],
            headless_extent: [64, 32],
            pools_per_frame: 3,
            ..RenderConfig::default()
        };
        let settings = ContextSettings::from_config(&config);

        assert_eq!(
            settings.present_mode_priority,
            vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        );
        assert_eq!(settings.surface_format_priority[0].format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(settings.headless_extent, vk::Extent2D { width: 64, height: 32 });
        assert_eq!(settings.pools_per_frame, 3);
    }

    #[test]
    fn test_requested_format_is_tried_first() {
        let settings = ContextSettings {
            surface_format: Some(surface_format(SurfaceFormatName::R8g8b8a8Unorm)),
            surface_format_priority: vec![surface_format(SurfaceFormatName::B8g8r8a8Srgb)],
            ..ContextSettings::default()
        };
        assert_eq!(
            settings.headless_format_candidates(),
            vec![vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_SRGB]
        );

        let request = settings.swapchain_request(vk::Extent2D { width: 8, height: 8 });
        assert_eq!(request.extent.width, 8);
        assert_eq!(request.surface_format, settings.surface_format);
    }
}
