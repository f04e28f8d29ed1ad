//! Per-frame resource lifecycle on top of `vkframe-rhi`.
//!
//! This crate provides:
//! - [`RenderContext`]: a ring of frames multiplexed against a swapchain
//!   (or offscreen images) with a begin/submit/end lifecycle
//! - [`RenderFrame`]: one slot's command, buffer, descriptor and
//!   synchronization pools plus its render target
//! - Render targets built by pluggable [`RenderTargetFactory`] strategies
//! - A [`RenderPipeline`] of [`Subpass`]es recorded in one rendering scope

mod error;

pub mod frame_cursor;
pub mod pipeline;
pub mod render_context;
pub mod render_frame;
pub mod render_target;
pub mod settings;

pub use error::{RenderError, RenderResult};
pub use pipeline::{ClearSubpass, RenderPipeline, Subpass};
pub use render_context::RenderContext;
pub use render_frame::{FrameThread, RenderFrame};
pub use render_target::{
    DefaultTargetFactory, DeferredTargetFactory, RenderTarget, RenderTargetFactory,
};
pub use settings::ContextSettings;
