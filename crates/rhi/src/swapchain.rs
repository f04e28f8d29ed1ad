//! Swapchain creation and negotiation.
//!
//! A [`Swapchain`] is never mutated after creation. Changing the extent,
//! image count, usage or transform builds a new swapchain from the old one
//! (passing it as `oldSwapchain`) and the caller drops the old value.
//!
//! Negotiation is done by the pure `choose_*` functions against the surface
//! capabilities, using a [`SwapchainRequest`] of preferences.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::queue::Queue;

/// Present modes tried in order when the requested one is unavailable.
pub const DEFAULT_PRESENT_MODE_PRIORITY: &[vk::PresentModeKHR] =
    &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];

/// Surface formats tried in order when the requested one is unavailable.
pub const DEFAULT_SURFACE_FORMAT_PRIORITY: &[vk::SurfaceFormatKHR] = &[
    vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
    vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
];

/// Image usages tried in order when none of the requested ones is supported.
const FALLBACK_IMAGE_USAGES: &[vk::ImageUsageFlags] = &[
    vk::ImageUsageFlags::COLOR_ATTACHMENT,
    vk::ImageUsageFlags::STORAGE,
    vk::ImageUsageFlags::SAMPLED,
    vk::ImageUsageFlags::TRANSFER_DST,
];

const COMPOSITE_ALPHA_PRIORITY: &[vk::CompositeAlphaFlagsKHR] = &[
    vk::CompositeAlphaFlagsKHR::OPAQUE,
    vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::INHERIT,
];

/// Caller preferences for a swapchain.
#[derive(Clone, Debug)]
pub struct SwapchainRequest {
    /// Zero means "use the surface's current extent".
    pub extent: vk::Extent2D,
    /// `None` means device minimum + 1.
    pub image_count: Option<u32>,
    pub present_mode: Option<vk::PresentModeKHR>,
    pub present_mode_priority: Vec<vk::PresentModeKHR>,
    pub surface_format: Option<vk::SurfaceFormatKHR>,
    pub surface_format_priority: Vec<vk::SurfaceFormatKHR>,
    pub image_usage: vk::ImageUsageFlags,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl Default for SwapchainRequest {
    fn default() -> Self {
        Self {
            extent: vk::Extent2D::default(),
            image_count: None,
            present_mode: None,
            present_mode_priority: DEFAULT_PRESENT_MODE_PRIORITY.to_vec(),
            surface_format: None,
            surface_format_priority: DEFAULT_SURFACE_FORMAT_PRIORITY.to_vec(),
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        }
    }
}

/// What the surface supports on a given physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// A surface plus the extension loaders needed to build swapchains for it.
///
/// Holding this instead of the [`Instance`] lets owners create the first
/// swapchain lazily. The instance and surface must outlive it.
#[derive(Clone)]
pub struct PresentSurface {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
}

impl PresentSurface {
    pub fn new(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR) -> RhiResult<Self> {
        if !device.has_swapchain_support() {
            return Err(RhiError::SwapchainError(
                "device was created without VK_KHR_swapchain".to_string(),
            ));
        }
        let surface_loader = instance.surface_loader();
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        Ok(Self {
            device,
            surface_loader,
            loader,
            surface,
        })
    }

    /// Negotiates and creates a fresh swapchain.
    pub fn create_swapchain(&self, request: SwapchainRequest) -> RhiResult<Swapchain> {
        Swapchain::create(
            self.device.clone(),
            self.surface_loader.clone(),
            self.loader.clone(),
            self.surface,
            request,
            vk::SwapchainKHR::null(),
        )
    }

    /// What the surface supports on the device's physical device.
    pub fn support(&self) -> RhiResult<SwapchainSupportDetails> {
        SwapchainSupportDetails::query(self.device.physical_device(), self.surface, &self.surface_loader)
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }
}

/// Presentable image chain for one surface.
pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    request: SwapchainRequest,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    image_usage: vk::ImageUsageFlags,
    transform: vk::SurfaceTransformFlagsKHR,
}

impl Swapchain {
    /// Negotiates and creates a swapchain for `surface`.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        request: SwapchainRequest,
    ) -> RhiResult<Self> {
        PresentSurface::new(instance, device, surface)?.create_swapchain(request)
    }

    /// Builds a replacement swapchain with a different request, retiring `self`.
    ///
    /// `self` must be dropped once the caller is done with its images.
    pub fn recreate_with(&self, request: SwapchainRequest) -> RhiResult<Self> {
        Self::create(
            self.device.clone(),
            self.surface_loader.clone(),
            self.loader.clone(),
            self.surface,
            request,
            self.swapchain,
        )
    }

    /// Replacement swapchain with a new extent.
    pub fn with_extent(&self, extent: vk::Extent2D) -> RhiResult<Self> {
        let request = SwapchainRequest {
            extent,
            ..self.request.clone()
        };
        self.recreate_with(request)
    }

    /// Replacement swapchain with a new image count.
    pub fn with_image_count(&self, image_count: u32) -> RhiResult<Self> {
        let request = SwapchainRequest {
            image_count: Some(image_count),
            extent: self.extent,
            ..self.request.clone()
        };
        self.recreate_with(request)
    }

    /// Replacement swapchain with new image usage flags.
    pub fn with_image_usage(&self, image_usage: vk::ImageUsageFlags) -> RhiResult<Self> {
        let request = SwapchainRequest {
            image_usage,
            extent: self.extent,
            ..self.request.clone()
        };
        self.recreate_with(request)
    }

    /// Replacement swapchain with a new extent and pre-transform.
    pub fn with_extent_transform(
        &self,
        extent: vk::Extent2D,
        transform: vk::SurfaceTransformFlagsKHR,
    ) -> RhiResult<Self> {
        let request = SwapchainRequest {
            extent,
            transform,
            ..self.request.clone()
        };
        self.recreate_with(request)
    }

    fn create(
        device: Arc<Device>,
        surface_loader: ash::khr::surface::Instance,
        loader: ash::khr::swapchain::Device,
        surface: vk::SurfaceKHR,
        request: SwapchainRequest,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "surface reports no formats or present modes".to_string(),
            ));
        }

        let capabilities = &support.capabilities;
        let surface_format = choose_surface_format(
            request.surface_format,
            &support.formats,
            &request.surface_format_priority,
        )
        .ok_or_else(|| RhiError::SwapchainError("no surface format".to_string()))?;
        let present_mode = choose_present_mode(
            request.present_mode,
            &support.present_modes,
            &request.present_mode_priority,
        );
        let extent = choose_extent(request.extent, capabilities);
        let image_count = choose_image_count(request.image_count, capabilities);
        let image_usage = choose_image_usage(request.image_usage, capabilities.supported_usage_flags)
            .ok_or_else(|| RhiError::SwapchainError("no supported image usage".to_string()))?;
        let transform = choose_transform(request.transform, capabilities);
        let composite_alpha = choose_composite_alpha(capabilities.supported_composite_alpha);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        info!(
            "Swapchain created: {}x{}, {:?}/{:?}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            images.len()
        );

        Ok(Self {
            device,
            surface_loader,
            loader,
            surface,
            swapchain,
            images,
            request,
            surface_format,
            extent,
            present_mode,
            image_usage,
            transform,
        })
    }

    /// Acquires the next presentable image, blocking up to `timeout` ns.
    ///
    /// Returns `(index, suboptimal)`. Errors are returned raw so callers can
    /// react to `ERROR_OUT_OF_DATE_KHR` and `ERROR_SURFACE_LOST_KHR`.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout: u64,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    /// Presents `image_index` on `queue` after `wait_semaphores` signal.
    ///
    /// Returns `Ok(true)` when the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: &Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        queue.present(&self.loader, &present_info)
    }

    /// Queries the surface's current capabilities.
    pub fn surface_capabilities(&self) -> RhiResult<vk::SurfaceCapabilitiesKHR> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.device.physical_device(), self.surface)?
        };
        Ok(capabilities)
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// The preferences this swapchain was negotiated from.
    #[inline]
    pub fn request(&self) -> &SwapchainRequest {
        &self.request
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_usage(&self) -> vk::ImageUsageFlags {
        self.image_usage
    }

    #[inline]
    pub fn transform(&self) -> vk::SurfaceTransformFlagsKHR {
        self.transform
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Picks the requested mode if available, else the first supported priority
/// entry, else FIFO (which every implementation supports).
pub fn choose_present_mode(
    requested: Option<vk::PresentModeKHR>,
    available: &[vk::PresentModeKHR],
    priority: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    if let Some(mode) = requested
        && available.contains(&mode)
    {
        return mode;
    }

    match priority.iter().find(|mode| available.contains(mode)) {
        Some(&mode) => {
            if requested.is_some() {
                warn!("Requested present mode {:?} not supported, using {:?}", requested, mode);
            }
            mode
        }
        None => {
            warn!("No preferred present mode supported, falling back to FIFO");
            vk::PresentModeKHR::FIFO
        }
    }
}

/// Picks the requested format if available, else the first supported priority
/// entry, else the first format the surface reports.
pub fn choose_surface_format(
    requested: Option<vk::SurfaceFormatKHR>,
    available: &[vk::SurfaceFormatKHR],
    priority: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    if let Some(format) = requested
        && available.contains(&format)
    {
        return Some(format);
    }

    if let Some(&format) = priority.iter().find(|format| available.contains(format)) {
        return Some(format);
    }

    let first = available.first().copied();
    if let Some(format) = first {
        warn!("No preferred surface format supported, using {:?}", format);
    }
    first
}

/// Resolves the swapchain extent.
///
/// A surface whose current extent is `u32::MAX` lets the swapchain decide,
/// so the request is taken verbatim. Otherwise the request is clamped to the
/// surface limits. A zero-sized request means "the surface's current extent".
pub fn choose_extent(
    requested: vk::Extent2D,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::Extent2D {
    let current = capabilities.current_extent;
    let zero_request = requested.width == 0 || requested.height == 0;

    if current.width == u32::MAX {
        if zero_request {
            return capabilities.min_image_extent;
        }
        return requested;
    }

    if zero_request {
        return current;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Device minimum + 1 by default; an explicit request is clamped to
/// `[min, max]`, with a `max` of zero meaning unbounded.
pub fn choose_image_count(requested: Option<u32>, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let min = capabilities.min_image_count;
    let max = if capabilities.max_image_count == 0 {
        u32::MAX
    } else {
        capabilities.max_image_count
    };

    requested.unwrap_or(min.saturating_add(1)).clamp(min, max.max(min))
}

/// Keeps only the requested usage flags the surface supports. If none
/// remain, falls back to the first supported common usage.
pub fn choose_image_usage(
    requested: vk::ImageUsageFlags,
    supported: vk::ImageUsageFlags,
) -> Option<vk::ImageUsageFlags> {
    let usage = requested & supported;
    if !usage.is_empty() {
        if usage != requested {
            warn!(
                "Image usage {:?} partly unsupported, using {:?}",
                requested, usage
            );
        }
        return Some(usage);
    }

    FALLBACK_IMAGE_USAGES
        .iter()
        .copied()
        .find(|&fallback| supported.contains(fallback))
}

/// The requested transform if supported, else the surface's current one.
pub fn choose_transform(
    requested: vk::SurfaceTransformFlagsKHR,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::SurfaceTransformFlagsKHR {
    if capabilities.supported_transforms.contains(requested) {
        requested
    } else {
        capabilities.current_transform
    }
}

/// First supported of opaque, pre-multiplied, post-multiplied, inherit.
pub fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    COMPOSITE_ALPHA_PRIORITY
        .iter()
        .copied()
        .find(|&alpha| supported.contains(alpha))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_present_mode_priority_skips_unsupported() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        let selected = choose_present_mode(None, &available, DEFAULT_PRESENT_MODE_PRIORITY);
        assert_eq!(selected, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_present_mode_request_wins_when_supported() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        let selected = choose_present_mode(
            Some(vk::PresentModeKHR::IMMEDIATE),
            &available,
            DEFAULT_PRESENT_MODE_PRIORITY,
        );
        assert_eq!(selected, vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO_RELAXED];
        let selected = choose_present_mode(
            Some(vk::PresentModeKHR::MAILBOX),
            &available,
            &[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE],
        );
        assert_eq!(selected, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_surface_format_priority_order() {
        let available = [
            srgb(vk::Format::B8G8R8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_SRGB),
        ];
        let selected = choose_surface_format(None, &available, DEFAULT_SURFACE_FORMAT_PRIORITY);
        assert_eq!(selected, Some(srgb(vk::Format::B8G8R8A8_SRGB)));

        let requested = Some(srgb(vk::Format::B8G8R8A8_UNORM));
        let selected = choose_surface_format(requested, &available, DEFAULT_SURFACE_FORMAT_PRIORITY);
        assert_eq!(selected, requested);
    }

    #[test]
    fn test_surface_format_falls_back_to_first_reported() {
        let available = [
            vk::SurfaceFormatKHR {
                format: vk::Format::A2B10G10R10_UNORM_PACK32,
                color_space: vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            },
            srgb(vk::Format::R16G16B16A16_SFLOAT),
        ];
        let selected = choose_surface_format(None, &available, DEFAULT_SURFACE_FORMAT_PRIORITY);
        assert_eq!(selected, Some(available[0]));

        assert_eq!(choose_surface_format(None, &[], DEFAULT_SURFACE_FORMAT_PRIORITY), None);
    }

    #[test]
    fn test_extent_verbatim_when_surface_defers() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 100), (2000, 2000));
        let extent = choose_extent(vk::Extent2D { width: 3000, height: 50 }, &caps);
        assert_eq!(extent, vk::Extent2D { width: 3000, height: 50 });
    }

    #[test]
    fn test_extent_clamped_to_surface_limits() {
        let caps = capabilities((800, 600), (100, 100), (2000, 2000));

        let extent = choose_extent(vk::Extent2D { width: 3000, height: 50 }, &caps);
        assert_eq!(extent, vk::Extent2D { width: 2000, height: 100 });

        let extent = choose_extent(vk::Extent2D { width: 1024, height: 768 }, &caps);
        assert_eq!(extent, vk::Extent2D { width: 1024, height: 768 });
    }

    #[test]
    fn test_zero_extent_uses_current() {
        let caps = capabilities((800, 600), (100, 100), (2000, 2000));
        let extent = choose_extent(vk::Extent2D::default(), &caps);
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_image_count_negotiation() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(Some(2), &caps), 2);
        assert_eq!(choose_image_count(None, &caps), 3);
        assert_eq!(choose_image_count(Some(8), &caps), 3);
        assert_eq!(choose_image_count(Some(1), &caps), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(Some(8), &unbounded), 8);
        assert_eq!(choose_image_count(None, &unbounded), 3);
    }

    #[test]
    fn test_image_usage_filtering() {
        let supported = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST;

        let usage = choose_image_usage(
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::STORAGE,
            supported,
        );
        assert_eq!(usage, Some(vk::ImageUsageFlags::COLOR_ATTACHMENT));

        let usage = choose_image_usage(vk::ImageUsageFlags::STORAGE, vk::ImageUsageFlags::TRANSFER_DST);
        assert_eq!(usage, Some(vk::ImageUsageFlags::TRANSFER_DST));

        assert_eq!(
            choose_image_usage(vk::ImageUsageFlags::STORAGE, vk::ImageUsageFlags::empty()),
            None
        );
    }

    #[test]
    fn test_transform_and_composite_alpha() {
        let caps = vk::SurfaceCapabilitiesKHR {
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        assert_eq!(
            choose_transform(vk::SurfaceTransformFlagsKHR::ROTATE_90, &caps),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );

        let alpha = choose_composite_alpha(
            vk::CompositeAlphaFlagsKHR::INHERIT | vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        );
        assert_eq!(alpha, vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED);
    }

    #[test]
    fn test_support_details_adequacy() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }
}
