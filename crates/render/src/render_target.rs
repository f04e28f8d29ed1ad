//! Render targets and the strategies that build them.
//!
//! A [`RenderTarget`] is the set of images one frame renders into. Image 0
//! is always the output image: the swapchain image in windowed mode, an
//! offscreen color image in headless mode. How the remaining attachments
//! look is decided by a [`RenderTargetFactory`] handed to
//! [`RenderContext::prepare`](crate::RenderContext::prepare):
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_render::render_target::RenderTarget;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::image::Image;
//!
//! // A color-only target, no depth
//! let factory = |_device: &Arc<Device>, output: Image| RenderTarget::new(vec![output]);
//! # let _ = factory;
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vkframe_rhi::device::Device;
use vkframe_rhi::image::{Image, ImageView, is_depth_format};
use vkframe_rhi::{RhiError, RhiResult};

/// Images plus full views, all of the same extent.
///
/// Views are declared first so they are destroyed before their images.
pub struct RenderTarget {
    extent: vk::Extent2D,
    views: Vec<ImageView>,
    images: Vec<Image>,
}

impl RenderTarget {
    /// Creates views for `images`. The first image is the output image.
    pub fn new(images: Vec<Image>) -> RhiResult<Self> {
        let extents: Vec<vk::Extent2D> = images.iter().map(Image::extent).collect();
        let extent = common_extent(&extents).ok_or_else(|| {
            RhiError::InvalidArgument(
                "render target needs at least one image and all images must share an extent"
                    .to_string(),
            )
        })?;

        let views = images
            .iter()
            .map(|image| ImageView::new(image.device().clone(), image))
            .collect::<RhiResult<Vec<_>>>()?;

        Ok(Self {
            extent,
            views,
            images,
        })
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    #[inline]
    pub fn views(&self) -> &[ImageView] {
        &self.views
    }

    /// The image that gets presented or read back.
    #[inline]
    pub fn output(&self) -> &Image {
        &self.images[0]
    }

    /// Indices of color attachments, output first.
    pub fn color_attachments(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.images.len()).filter(|&i| !is_depth_format(self.images[i].format()))
    }

    /// Index of the first depth attachment.
    pub fn depth_attachment(&self) -> Option<usize> {
        (0..self.images.len()).find(|&i| is_depth_format(self.images[i].format()))
    }

    pub fn color_formats(&self) -> Vec<vk::Format> {
        self.color_attachments()
            .map(|i| self.images[i].format())
            .collect()
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_attachment()
            .map_or(vk::Format::UNDEFINED, |i| self.images[i].format())
    }
}

/// Extent shared by all `extents`, or `None` if empty or mismatched.
pub fn common_extent(extents: &[vk::Extent2D]) -> Option<vk::Extent2D> {
    let (first, rest) = extents.split_first()?;
    rest.iter().all(|e| e == first).then_some(*first)
}

/// Builds a frame's render target around its output image.
pub trait RenderTargetFactory: Send + Sync {
    fn create_target(&self, device: &Arc<Device>, output: Image) -> RhiResult<RenderTarget>;
}

impl<F> RenderTargetFactory for F
where
    F: Fn(&Arc<Device>, Image) -> RhiResult<RenderTarget> + Send + Sync,
{
    fn create_target(&self, device: &Arc<Device>, output: Image) -> RhiResult<RenderTarget> {
        self(device, output)
    }
}

/// Output color plus a depth attachment.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTargetFactory;

impl RenderTargetFactory for DefaultTargetFactory {
    fn create_target(&self, device: &Arc<Device>, output: Image) -> RhiResult<RenderTarget> {
        let extent = output.extent();
        let depth = create_depth(device, extent)?;
        RenderTarget::new(vec![output, depth])
    }
}

/// Output color, depth and a G-buffer of albedo and normals.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeferredTargetFactory;

impl DeferredTargetFactory {
    pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;
    pub const NORMAL_FORMAT: vk::Format = vk::Format::A2B10G10R10_UNORM_PACK32;
}

impl RenderTargetFactory for DeferredTargetFactory {
    fn create_target(&self, device: &Arc<Device>, output: Image) -> RhiResult<RenderTarget> {
        let extent = output.extent();
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT;

        let depth = create_depth(device, extent)?;
        let albedo = Image::new(device.clone(), "gbuffer albedo", extent, Self::ALBEDO_FORMAT, usage)?;
        let normal = Image::new(device.clone(), "gbuffer normal", extent, Self::NORMAL_FORMAT, usage)?;

        debug!("Deferred target created: {}x{}", extent.width, extent.height);
        RenderTarget::new(vec![output, depth, albedo, normal])
    }
}

fn create_depth(device: &Arc<Device>, extent: vk::Extent2D) -> RhiResult<Image> {
    let format = device.supported_depth_format()?;
    Image::new(
        device.clone(),
        "depth",
        extent,
        format,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_common_extent() {
        assert_eq!(common_extent(&[]), None);
        assert_eq!(common_extent(&[extent(4, 4)]), Some(extent(4, 4)));
        assert_eq!(
            common_extent(&[extent(4, 4), extent(4, 4), extent(4, 4)]),
            Some(extent(4, 4))
        );
        assert_eq!(common_extent(&[extent(4, 4), extent(4, 8)]), None);
    }

    #[test]
    fn test_closures_are_factories() {
        fn assert_factory<T: RenderTargetFactory>(_: &T) {}
        let color_only = |_: &Arc<Device>, output: Image| RenderTarget::new(vec![output]);
        assert_factory(&color_only);
        assert_factory(&DefaultTargetFactory);
        assert_factory(&DeferredTargetFactory);
    }

    #[test]
    fn test_render_target_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RenderTarget>();
    }
}
