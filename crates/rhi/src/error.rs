//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No queue matches the requested capabilities
    #[error("No queue found with flags {flags:?} at index {index}")]
    QueueNotFound { flags: vk::QueueFlags, index: u32 },

    /// No queue can present to the surface
    #[error("No queue supports presentation")]
    NoPresentQueue,

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Caller passed an argument the device cannot honor
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RhiError {
    /// Returns the underlying Vulkan result code, if any.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::VulkanError(result) => Some(*result),
            _ => None,
        }
    }

    /// Whether the failure is transient and the call may simply be repeated.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.vk_result(),
            Some(vk::Result::TIMEOUT | vk::Result::NOT_READY)
        )
    }

    /// Whether the failure means Vulkan itself is unusable on this machine
    /// (no loader, no driver, no device).
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::LoadingError(_) | Self::NoSuitableGpu => true,
            Self::VulkanError(result) => matches!(
                *result,
                vk::Result::ERROR_INCOMPATIBLE_DRIVER
                    | vk::Result::ERROR_INITIALIZATION_FAILED
                    | vk::Result::ERROR_EXTENSION_NOT_PRESENT
                    | vk::Result::ERROR_LAYER_NOT_PRESENT
            ),
            _ => false,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_results() {
        assert!(RhiError::from(vk::Result::TIMEOUT).is_recoverable());
        assert!(RhiError::from(vk::Result::NOT_READY).is_recoverable());
        assert!(!RhiError::from(vk::Result::ERROR_DEVICE_LOST).is_recoverable());
        assert!(!RhiError::NoSuitableGpu.is_recoverable());
    }

    #[test]
    fn test_unavailable_results() {
        assert!(RhiError::NoSuitableGpu.is_unavailable());
        assert!(RhiError::from(vk::Result::ERROR_INCOMPATIBLE_DRIVER).is_unavailable());
        assert!(!RhiError::from(vk::Result::ERROR_OUT_OF_DATE_KHR).is_unavailable());
    }
}
