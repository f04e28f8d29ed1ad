//! TOML configuration.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! working configuration:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [render]
//! present_modes = ["mailbox", "fifo"]
//! surface_formats = ["b8g8r8a8_srgb"]
//! image_count = 3
//! pools_per_frame = 2
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Top-level configuration document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FrameworkConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
}

impl FrameworkConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.render.pools_per_frame == 0 {
            return Err(Error::Config(
                "render.pools_per_frame must be at least 1".to_string(),
            ));
        }
        if self.render.headless_frame_count == 0 {
            return Err(Error::Config(
                "render.headless_frame_count must be at least 1".to_string(),
            ));
        }
        if self.render.image_count == Some(0) {
            return Err(Error::Config("render.image_count must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Window settings for the windowed path.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "vkframe".to_string(),
        }
    }
}

/// Present modes that can be named in configuration.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeName {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

/// Surface formats that can be named in configuration. All use the sRGB
/// non-linear color space.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceFormatName {
    R8g8b8a8Srgb,
    B8g8r8a8Srgb,
    R8g8b8a8Unorm,
    B8g8r8a8Unorm,
}

/// Render context settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Enable the Khronos validation layer when available.
    pub validation: bool,
    /// Present mode priority, highest first.
    pub present_modes: Vec<PresentModeName>,
    /// Surface format priority, highest first.
    pub surface_formats: Vec<SurfaceFormatName>,
    /// Requested swapchain image count; `None` picks device minimum + 1.
    pub image_count: Option<u32>,
    /// Command/descriptor/buffer pools per frame, one per recording thread.
    pub pools_per_frame: u16,
    /// How many times acquisition is retried after recreating the swapchain.
    pub max_surface_retries: u32,
    /// Run without a window or swapchain.
    pub headless: bool,
    /// Number of offscreen frames in headless mode.
    pub headless_frame_count: u32,
    /// Offscreen target size in headless mode.
    pub headless_extent: [u32; 2],
    /// Build G-buffer style targets (albedo + normal) in addition to color + depth.
    pub deferred_targets: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            present_modes: vec![PresentModeName::Fifo, PresentModeName::Mailbox],
            surface_formats: vec![
                SurfaceFormatName::R8g8b8a8Srgb,
                SurfaceFormatName::B8g8r8a8Srgb,
                SurfaceFormatName::R8g8b8a8Unorm,
                SurfaceFormatName::B8g8r8a8Unorm,
            ],
            image_count: None,
            pools_per_frame: 1,
            max_surface_retries: 1,
            headless: false,
            headless_frame_count: 1,
            headless_extent: [1280, 720],
            deferred_targets: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = FrameworkConfig::from_toml("").unwrap();
        assert_eq!(config, FrameworkConfig::default());
        assert_eq!(
            config.render.present_modes,
            vec![PresentModeName::Fifo, PresentModeName::Mailbox]
        );
        assert_eq!(config.render.max_surface_retries, 1);
    }

    #[test]
    fn test_partial_render_section() {
        let config = FrameworkConfig::from_toml(
            r#"
            [render]
            present_modes = ["mailbox", "fifo_relaxed"]
            image_count = 2
            pools_per_frame = 4
            headless = true
            headless_extent = [640, 480]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.render.present_modes,
            vec![PresentModeName::Mailbox, PresentModeName::FifoRelaxed]
        );
        assert_eq!(config.render.image_count, Some(2));
        assert_eq!(config.render.pools_per_frame, 4);
        assert!(config.render.headless);
        assert_eq!(config.render.headless_extent, [640, 480]);
        // Untouched sections keep their defaults
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let result = FrameworkConfig::from_toml("[render]\nvsync = true\n");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_zero_pools_is_invalid() {
        let result = FrameworkConfig::from_toml("[render]\npools_per_frame = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_window_is_invalid() {
        let result = FrameworkConfig::from_toml("[window]\nwidth = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = FrameworkConfig::load(Path::new("/nonexistent/vkframe.toml"));
        assert!(matches!(result, Err(Error::ConfigRead { .. })));
    }
}
