//! 2D images and image views.
//!
//! An [`Image`] either owns its `VkImage` and gpu-allocator memory or wraps
//! a swapchain image that the swapchain owns. Render targets mix both.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A 2D, single-mip, single-layer image.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    /// `None` for swapchain images.
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    usage: vk::ImageUsageFlags,
}

impl Image {
    /// Creates a GPU-only image with optimal tiling.
    pub fn new(
        device: Arc<Device>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "image '{}' must have a non-zero extent",
                name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        // Drop releases the handle and allocation from here on
        let this = Self {
            device,
            image,
            allocation: Some(allocation),
            format,
            extent,
            usage,
        };
        unsafe {
            this.device.handle().bind_image_memory(image, memory, offset)?;
        }

        debug!(
            "Created image '{}': {}x{} {:?}",
            name, extent.width, extent.height, format
        );

        Ok(this)
    }

    /// Wraps an image owned by a swapchain. Dropping it does not destroy
    /// the `VkImage`.
    pub fn from_swapchain(
        device: Arc<Device>,
        image: vk::Image,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            device,
            image,
            allocation: None,
            format,
            extent,
            usage,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    /// Whether the image belongs to a swapchain.
    #[inline]
    pub fn is_swapchain_image(&self) -> bool {
        self.allocation.is_none()
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }

    /// The subresource range covering the whole image.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect())
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        let Some(allocation) = self.allocation.take() else {
            return;
        };

        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        if let Err(e) = self.device.allocator().lock().free(allocation) {
            error!("Failed to free image allocation: {:?}", e);
        }

        debug!("Destroyed image {:?}", self.image);
    }
}

/// A full-image 2D view.
pub struct ImageView {
    device: Arc<Device>,
    view: vk::ImageView,
    format: vk::Format,
}

impl ImageView {
    pub fn new(device: Arc<Device>, image: &Image) -> RhiResult<Self> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.format())
            .subresource_range(image.subresource_range());

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        Ok(Self {
            device,
            view,
            format: image.format(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
    }
}

/// Aspect flags implied by a format.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Whether the format has a depth component.
pub fn is_depth_format(format: vk::Format) -> bool {
    aspect_for_format(format).contains(vk::ImageAspectFlags::DEPTH)
}
