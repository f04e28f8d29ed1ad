//! Error types for the frame lifecycle layer.

use ash::vk;
use thiserror::Error;
use tracing::error;

use vkframe_rhi::RhiError;
use vkframe_rhi::buffer::BufferUsage;

/// Errors raised by [`RenderContext`](crate::RenderContext) and
/// [`RenderFrame`](crate::RenderFrame).
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failure in the hardware layer
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// The call is not legal in the context's current state
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A per-frame pool index beyond the number of pools per frame
    #[error("Pool index {index} out of range (frame has {count} pools)")]
    InvalidPoolIndex { index: usize, count: usize },

    /// Swapchain recovery did not help within the retry bound
    #[error("Surface unusable after {attempts} recovery attempt(s): {result}")]
    SurfaceLost { attempts: u32, result: vk::Result },

    /// The usage has no per-frame buffer pool
    #[error("Buffer usage '{}' cannot be allocated from frame pools", .0.name())]
    UnsupportedBufferUsage(BufferUsage),
}

impl RenderError {
    /// Builds a precondition error and logs it.
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("{}", message);
        Self::Precondition(message)
    }
}

impl From<vk::Result> for RenderError {
    fn from(result: vk::Result) -> Self {
        Self::Rhi(result.into())
    }
}

/// Result type alias using the render layer's error type.
pub type RenderResult<T> = Result<T, RenderError>;
