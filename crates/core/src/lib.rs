//! Core utilities for the vkframe framework.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - TOML configuration
//! - Frame timing

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{FrameworkConfig, PresentModeName, RenderConfig, SurfaceFormatName, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
