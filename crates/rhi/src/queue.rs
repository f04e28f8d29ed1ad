//! Device queues.

use ash::vk;

use crate::error::RhiResult;

/// One queue of one queue family, retrieved at device creation.
///
/// Submission to a `VkQueue` must be externally synchronized; the render
/// context drives all submissions from a single thread.
pub struct Queue {
    device: ash::Device,
    handle: vk::Queue,
    family_index: u32,
    index: u32,
    properties: vk::QueueFamilyProperties,
    can_present: bool,
}

impl Queue {
    pub(crate) fn new(
        device: ash::Device,
        family_index: u32,
        index: u32,
        properties: vk::QueueFamilyProperties,
        can_present: bool,
    ) -> Self {
        let handle = unsafe { device.get_device_queue(family_index, index) };
        Self {
            device,
            handle,
            family_index,
            index,
            properties,
            can_present,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    /// Index of this queue within its family.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn properties(&self) -> &vk::QueueFamilyProperties {
        &self.properties
    }

    /// Whether this queue can present to the surface the device was created for.
    #[inline]
    pub fn can_present(&self) -> bool {
        self.can_present
    }

    /// Whether the family supports every capability in `flags`.
    #[inline]
    pub fn supports(&self, flags: vk::QueueFlags) -> bool {
        self.properties.queue_flags.contains(flags)
    }

    /// Submits work, optionally signaling `fence` on completion.
    pub fn submit(&self, submits: &[vk::SubmitInfo<'_>], fence: vk::Fence) -> RhiResult<()> {
        unsafe { self.device.queue_submit(self.handle, submits, fence)? };
        Ok(())
    }

    /// Presents swapchain images.
    ///
    /// Returns `Ok(true)` when the swapchain is suboptimal. Errors are returned
    /// raw so callers can react to `ERROR_OUT_OF_DATE_KHR`.
    pub fn present(
        &self,
        loader: &ash::khr::swapchain::Device,
        present_info: &vk::PresentInfoKHR<'_>,
    ) -> Result<bool, vk::Result> {
        unsafe { loader.queue_present(self.handle, present_info) }
    }

    /// Blocks until the queue has finished all submitted work.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.queue_wait_idle(self.handle)? };
        Ok(())
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("family_index", &self.family_index)
            .field("index", &self.index)
            .field("flags", &self.properties.queue_flags)
            .field("can_present", &self.can_present)
            .finish()
    }
}
