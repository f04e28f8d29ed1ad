//! The frame lifecycle: a ring of [`RenderFrame`]s driven against a
//! swapchain, or against offscreen images in headless mode.
//!
//! # Lifecycle
//!
//! ```text
//! prepare ─► begin_frame ─► (record / submit)* ─► end_frame ─┐
//!               ▲                                              │
//!               └──────────────────────────────────────────────┘
//! ```
//!
//! - [`begin_frame`](RenderContext::begin_frame) acquires a swapchain image,
//!   opens the matching frame and waits for that frame's previous GPU work.
//! - [`submit`](RenderContext::submit) hands command buffers to a queue and
//!   returns a semaphore to chain the next submission or the present on.
//! - [`end_frame`](RenderContext::end_frame) presents and closes the frame.
//!
//! Only one frame can be active at a time. Swapchain changes are only legal
//! between frames.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_render::{ContextSettings, DefaultTargetFactory, RenderContext};
//! use vkframe_rhi::command::ResetMode;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_render::RenderError> {
//! let settings = ContextSettings {
//!     headless: true,
//!     ..ContextSettings::default()
//! };
//! let mut context = RenderContext::headless(device.clone(), settings);
//! context.prepare(1, DefaultTargetFactory)?;
//!
//! let queue = device.suitable_graphics_queue()?;
//! let acquired = context.begin_frame()?;
//! let cmd = context.request_frame_command_buffer(
//!     queue,
//!     ResetMode::ResetPool,
//!     vk::CommandBufferLevel::PRIMARY,
//!     0,
//! )?;
//! cmd.begin()?;
//! // ... record ...
//! cmd.end()?;
//! let done = context.submit(queue, &[cmd.handle()], acquired, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)?;
//! context.end_frame(done)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use vkframe_rhi::command::{CommandBuffer, ResetMode};
use vkframe_rhi::device::{Device, first_supported_format};
use vkframe_rhi::image::Image;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::queue::Queue;
use vkframe_rhi::swapchain::{PresentSurface, Swapchain};
use vkframe_rhi::sync::Semaphore;
use vkframe_rhi::{RhiError, RhiResult};

use crate::error::{RenderError, RenderResult};
use crate::frame_cursor::{FrameCursor, reconcile};
use crate::render_frame::RenderFrame;
use crate::render_target::{DefaultTargetFactory, RenderTarget, RenderTargetFactory};
use crate::settings::ContextSettings;

/// Usage of offscreen output images: render into, clear, read back.
const HEADLESS_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::TRANSFER_SRC.as_raw()
        | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
);

/// Owns the frame ring and, when windowed, the swapchain.
pub struct RenderContext {
    // Frames reference swapchain images, so they go first
    frames: Vec<RenderFrame>,
    acquired_semaphore: Option<Semaphore>,
    swapchain: Option<Swapchain>,
    surface: Option<PresentSurface>,
    factory: Box<dyn RenderTargetFactory>,
    settings: ContextSettings,
    cursor: FrameCursor,
    surface_extent: vk::Extent2D,
    surface_changed: bool,
    prepared: bool,
    device: Arc<Device>,
}

impl RenderContext {
    /// A context presenting to `surface`. The swapchain is created by
    /// [`prepare`](Self::prepare) with `extent` as the initial size.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        settings: ContextSettings,
    ) -> RenderResult<Self> {
        let surface = PresentSurface::new(instance, device.clone(), surface)?;
        let mut context = Self::with_surface(device, Some(surface), settings);
        context.surface_extent = extent;
        Ok(context)
    }

    /// A context rendering into offscreen images.
    pub fn headless(device: Arc<Device>, settings: ContextSettings) -> Self {
        let extent = settings.headless_extent;
        let mut context = Self::with_surface(device, None, settings);
        context.surface_extent = extent;
        context
    }

    fn with_surface(
        device: Arc<Device>,
        surface: Option<PresentSurface>,
        settings: ContextSettings,
    ) -> Self {
        Self {
            frames: Vec::new(),
            acquired_semaphore: None,
            swapchain: None,
            surface,
            factory: Box::new(DefaultTargetFactory),
            settings,
            cursor: FrameCursor::new(0),
            surface_extent: vk::Extent2D::default(),
            surface_changed: false,
            prepared: false,
            device,
        }
    }

    /// Prefers `mode` over the priority list. Ignored after `prepare`.
    pub fn request_present_mode(&mut self, mode: vk::PresentModeKHR) {
        if self.warn_if_prepared("present mode request") {
            return;
        }
        self.settings.present_mode = Some(mode);
    }

    /// Prefers `format` over the priority list. Ignored after `prepare`.
    pub fn request_image_format(&mut self, format: vk::SurfaceFormatKHR) {
        if self.warn_if_prepared("image format request") {
            return;
        }
        self.settings.surface_format = Some(format);
    }

    pub fn set_present_mode_priority(&mut self, priority: Vec<vk::PresentModeKHR>) {
        if self.warn_if_prepared("present mode priority") {
            return;
        }
        self.settings.present_mode_priority = priority;
    }

    pub fn set_surface_format_priority(&mut self, priority: Vec<vk::SurfaceFormatKHR>) {
        if self.warn_if_prepared("surface format priority") {
            return;
        }
        self.settings.surface_format_priority = priority;
    }

    fn warn_if_prepared(&self, what: &str) -> bool {
        if self.prepared {
            warn!("Context already prepared, ignoring {}", what);
        }
        self.prepared
    }

    /// Negotiates the swapchain (or offscreen images) and builds one frame
    /// per image with `factory`. Calling it again tears everything down and
    /// rebuilds it.
    pub fn prepare(
        &mut self,
        pools_per_frame: usize,
        factory: impl RenderTargetFactory + 'static,
    ) -> RenderResult<()> {
        self.cursor.require_inactive("prepare")?;
        if pools_per_frame == 0 {
            return Err(RenderError::precondition("pools_per_frame must be at least 1"));
        }

        self.device.wait_idle()?;
        self.frames.clear();
        self.cursor = FrameCursor::new(0);
        self.prepared = false;
        self.settings.pools_per_frame = pools_per_frame;
        self.factory = Box::new(factory);

        if let Some(surface) = &self.surface {
            let request = self.settings.swapchain_request(self.surface_extent);
            let swapchain = match self.swapchain.take() {
                Some(old) => old.recreate_with(request)?,
                None => surface.create_swapchain(request)?,
            };
            self.surface_extent = swapchain.extent();
            self.swapchain = Some(swapchain);
        }

        let targets = self.create_targets()?;
        self.frames = targets
            .into_iter()
            .map(|target| RenderFrame::new(self.device.clone(), target, pools_per_frame))
            .collect();
        self.cursor = FrameCursor::new(self.frames.len());
        self.surface_changed = false;
        self.prepared = true;

        info!(
            "Render context prepared: {} frames, {} pools per frame, {}x{}{}",
            self.frames.len(),
            pools_per_frame,
            self.surface_extent.width,
            self.surface_extent.height,
            if self.is_headless() { " (headless)" } else { "" }
        );
        Ok(())
    }

    /// One target per swapchain image, or per headless frame.
    fn create_targets(&self) -> RenderResult<Vec<RenderTarget>> {
        let outputs: Vec<Image> = match &self.swapchain {
            Some(swapchain) => swapchain
                .images()
                .iter()
                .map(|&image| {
                    Image::from_swapchain(
                        self.device.clone(),
                        image,
                        swapchain.extent(),
                        swapchain.format(),
                        swapchain.image_usage(),
                    )
                })
                .collect(),
            None => self.create_headless_images()?,
        };

        let targets = outputs
            .into_iter()
            .map(|output| self.factory.create_target(&self.device, output))
            .collect::<RhiResult<Vec<_>>>()?;
        Ok(targets)
    }

    fn create_headless_images(&self) -> RhiResult<Vec<Image>> {
        let candidates = self.settings.headless_format_candidates();
        let format = first_supported_format(&candidates, |format| {
            self.device.is_image_format_supported(format, HEADLESS_IMAGE_USAGE)
        })
        .ok_or_else(|| {
            RhiError::InvalidArgument("no requested format usable for offscreen frames".to_string())
        })?;

        (0..self.settings.headless_frame_count)
            .map(|_| {
                Image::new(
                    self.device.clone(),
                    "headless color",
                    self.surface_extent,
                    format,
                    HEADLESS_IMAGE_USAGE,
                )
            })
            .collect()
    }

    /// Rebuilds every frame's target for the current swapchain. Frames are
    /// dropped or added so that there is exactly one per image.
    pub fn recreate(&mut self) -> RenderResult<()> {
        self.cursor.require_inactive("recreate the frames")?;
        self.require_prepared("recreate the frames")?;

        if let Some(swapchain) = &self.swapchain {
            self.surface_extent = swapchain.extent();
        }

        let targets = self.create_targets()?;
        let device = self.device.clone();
        let pools = self.settings.pools_per_frame;
        reconcile(
            &mut self.frames,
            targets,
            |target| Ok::<_, RenderError>(RenderFrame::new(device.clone(), target, pools)),
            RenderFrame::update_render_target,
        )?;
        self.cursor.resize(self.frames.len());

        info!(
            "Frames recreated: {} frames at {}x{}",
            self.frames.len(),
            self.surface_extent.width,
            self.surface_extent.height
        );
        Ok(())
    }

    pub fn update_swapchain_extent(&mut self, extent: vk::Extent2D) -> RenderResult<()> {
        self.replace_swapchain_with(|swapchain| swapchain.with_extent(extent))
    }

    pub fn update_swapchain_image_count(&mut self, image_count: u32) -> RenderResult<()> {
        self.replace_swapchain_with(|swapchain| swapchain.with_image_count(image_count))
    }

    pub fn update_swapchain_image_usage(
        &mut self,
        image_usage: vk::ImageUsageFlags,
    ) -> RenderResult<()> {
        self.replace_swapchain_with(|swapchain| swapchain.with_image_usage(image_usage))
    }

    pub fn update_swapchain_extent_transform(
        &mut self,
        extent: vk::Extent2D,
        transform: vk::SurfaceTransformFlagsKHR,
    ) -> RenderResult<()> {
        self.replace_swapchain_with(|swapchain| swapchain.with_extent_transform(extent, transform))
    }

    /// Installs a swapchain the caller built, typically with
    /// [`Swapchain::recreate_with`] on [`swapchain`](Self::swapchain).
    pub fn replace_swapchain(&mut self, swapchain: Swapchain) -> RenderResult<()> {
        self.replace_swapchain_with(move |_| Ok(swapchain))
    }

    fn replace_swapchain_with(
        &mut self,
        build: impl FnOnce(&Swapchain) -> RhiResult<Swapchain>,
    ) -> RenderResult<()> {
        self.cursor.require_inactive("update the swapchain")?;
        let Some(current) = &self.swapchain else {
            return Err(RenderError::precondition(
                "cannot update the swapchain of a headless or unprepared context",
            ));
        };

        self.device.wait_idle()?;
        let replacement = build(current)?;

        // The old swapchain outlives the views of its images
        let old = self.swapchain.replace(replacement);
        let result = self.recreate();
        drop(old);
        result
    }

    /// Recreates the swapchain when the surface size changed.
    ///
    /// Returns whether anything was recreated.
    pub fn handle_surface_changes(&mut self) -> RenderResult<bool> {
        self.refresh_surface(false)
    }

    fn refresh_surface(&mut self, force: bool) -> RenderResult<bool> {
        let Some(swapchain) = &self.swapchain else {
            return Ok(false);
        };

        let capabilities = swapchain.surface_capabilities()?;
        let change = detect_surface_change(
            self.surface_extent,
            swapchain.transform(),
            &capabilities,
            force,
        );
        let Some((extent, transform)) = change else {
            return Ok(false);
        };

        debug!(
            "Surface changed: {}x{} -> {}x{}{}",
            self.surface_extent.width,
            self.surface_extent.height,
            extent.width,
            extent.height,
            if force { " (forced)" } else { "" }
        );
        self.update_swapchain_extent_transform(extent, transform)?;
        self.surface_changed = false;
        Ok(true)
    }

    /// Opens the next frame and returns the semaphore signaled when its
    /// image is ready (null in headless mode).
    ///
    /// Out-of-date and lost surfaces are recovered by recreating the
    /// swapchain, up to `max_surface_retries` times.
    pub fn begin_frame(&mut self) -> RenderResult<vk::Semaphore> {
        self.cursor.require_inactive("begin a frame")?;
        self.require_prepared("begin a frame")?;

        if self.swapchain.is_none() {
            self.cursor.begin(None)?;
            self.wait_frame()?;
            return Ok(vk::Semaphore::null());
        }

        self.handle_surface_changes()?;

        // Owned, because the frame it comes from may not be the one we get
        let semaphore = self.frames[self.cursor.index()].request_owned_semaphore()?;
        let image_index = self.acquire_with_retries(&semaphore)?;

        self.cursor.begin(Some(image_index as usize))?;
        let handle = semaphore.handle();
        self.acquired_semaphore = Some(semaphore);
        self.wait_frame()?;
        Ok(handle)
    }

    fn acquire_with_retries(&mut self, semaphore: &Semaphore) -> RenderResult<u32> {
        let mut attempts = 0;
        loop {
            let swapchain = self
                .swapchain
                .as_ref()
                .ok_or_else(|| RenderError::precondition("swapchain disappeared while acquiring"))?;

            let result = swapchain.acquire_next_image(semaphore.handle(), u64::MAX);
            match next_acquire_step(result, attempts, self.settings.max_surface_retries)? {
                AcquireStep::Acquired { index, suboptimal } => {
                    if suboptimal {
                        debug!("Acquired image {} from a suboptimal swapchain", index);
                        self.surface_changed = true;
                    }
                    return Ok(index);
                }
                AcquireStep::Recreate(result) => {
                    attempts += 1;
                    warn!("Acquire failed with {:?}, recreating swapchain (attempt {})", result, attempts);
                    self.refresh_surface(true)?;
                }
            }
        }
    }

    /// Submits `command_buffers` waiting on `wait_semaphore` at `wait_stage`.
    ///
    /// Returns a semaphore signaled when the work completes. A null
    /// `wait_semaphore` submits without a wait.
    pub fn submit(
        &mut self,
        queue: &Queue,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphore: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
    ) -> RenderResult<vk::Semaphore> {
        let frame = self.active_frame_mut("submit")?;
        let signal_semaphore = frame.request_semaphore()?;
        let fence = frame.request_fence()?;

        let wait_semaphores = [wait_semaphore];
        let wait_stages = [wait_stage];
        let signal_semaphores = [signal_semaphore];

        let mut submit_info = vk::SubmitInfo::default()
            .command_buffers(command_buffers)
            .signal_semaphores(&signal_semaphores);
        if wait_semaphore != vk::Semaphore::null() {
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
        }

        queue.submit(&[submit_info], fence)?;
        Ok(signal_semaphore)
    }

    /// Submits `command_buffers` with only a frame fence.
    pub fn submit_fenced(
        &mut self,
        queue: &Queue,
        command_buffers: &[vk::CommandBuffer],
    ) -> RenderResult<()> {
        let fence = self.active_frame_mut("submit")?.request_fence()?;
        let submit_info = vk::SubmitInfo::default().command_buffers(command_buffers);
        queue.submit(&[submit_info], fence)?;
        Ok(())
    }

    /// Blocks until the active frame's previous GPU work is done and resets
    /// its pools.
    pub fn wait_frame(&mut self) -> RenderResult<()> {
        self.active_frame_mut("wait for a frame")?.reset()
    }

    /// Presents the active frame after `semaphore` signals and closes it.
    pub fn end_frame(&mut self, semaphore: vk::Semaphore) -> RenderResult<()> {
        self.cursor.require_active("end a frame")?;
        let index = self.cursor.index();

        let present_result = match &self.swapchain {
            Some(swapchain) => {
                let queue = self.device.queue_by_present(0)?;
                let waits: &[vk::Semaphore] = if semaphore == vk::Semaphore::null() {
                    &[]
                } else {
                    std::slice::from_ref(&semaphore)
                };
                Some(swapchain.present(queue, index as u32, waits))
            }
            None => None,
        };

        if let Some(acquired) = self.acquired_semaphore.take() {
            self.frames[index].release_owned_semaphore(acquired);
        }
        self.cursor.end()?;

        if present_needs_refresh(present_result, self.surface_changed)? {
            self.refresh_surface(true)?;
        }
        Ok(())
    }

    /// The open frame.
    pub fn get_active_frame(&self) -> RenderResult<&RenderFrame> {
        self.cursor.require_active("get the active frame")?;
        Ok(&self.frames[self.cursor.index()])
    }

    pub fn get_active_frame_mut(&mut self) -> RenderResult<&mut RenderFrame> {
        self.active_frame_mut("get the active frame")
    }

    /// The frame closed by the last `end_frame`.
    pub fn get_last_rendered_frame(&self) -> RenderResult<&RenderFrame> {
        let index = self.cursor.last_rendered()?;
        Ok(&self.frames[index])
    }

    fn active_frame_mut(&mut self, action: &str) -> RenderResult<&mut RenderFrame> {
        self.cursor.require_active(action)?;
        Ok(&mut self.frames[self.cursor.index()])
    }

    fn require_prepared(&self, action: &str) -> RenderResult<()> {
        if self.prepared {
            Ok(())
        } else {
            Err(RenderError::precondition(format!(
                "cannot {} before the context is prepared",
                action
            )))
        }
    }

    /// A command buffer from pool `pool_index` of the active frame.
    pub fn request_frame_command_buffer(
        &mut self,
        queue: &Queue,
        reset_mode: ResetMode,
        level: vk::CommandBufferLevel,
        pool_index: usize,
    ) -> RenderResult<CommandBuffer> {
        self.active_frame_mut("request a command buffer")?
            .request_command_buffer(queue.family_index(), reset_mode, level, pool_index)
    }

    /// A semaphore owned by the active frame.
    pub fn request_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        self.active_frame_mut("request a semaphore")?.request_semaphore()
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    #[inline]
    pub fn frames(&self) -> &[RenderFrame] {
        &self.frames
    }

    #[inline]
    pub fn surface_extent(&self) -> vk::Extent2D {
        self.surface_extent
    }

    #[inline]
    pub fn active_frame_index(&self) -> usize {
        self.cursor.index()
    }

    #[inline]
    pub fn is_frame_active(&self) -> bool {
        self.cursor.is_active()
    }

    #[inline]
    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    #[inline]
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Format of the frames' output images.
    pub fn format(&self) -> vk::Format {
        self.frames
            .first()
            .map_or(vk::Format::UNDEFINED, |frame| frame.render_target().output().format())
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during context drop: {:?}", e);
        }
        debug!("Render context destroyed ({} frames)", self.frames.len());
    }
}

/// What `begin_frame` does with one acquisition result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStep {
    Acquired { index: u32, suboptimal: bool },
    /// Recreate the swapchain and acquire again.
    Recreate(vk::Result),
}

/// Classifies an acquisition result after `attempts` recreations.
///
/// Out-of-date and lost surfaces are retried until `max_retries` is used up,
/// then reported as [`RenderError::SurfaceLost`]. Other failures propagate.
pub fn next_acquire_step(
    result: Result<(u32, bool), vk::Result>,
    attempts: u32,
    max_retries: u32,
) -> RenderResult<AcquireStep> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireStep::Acquired { index, suboptimal }),
        Err(result @ (vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR)) => {
            if attempts >= max_retries {
                Err(RenderError::SurfaceLost { attempts, result })
            } else {
                Ok(AcquireStep::Recreate(result))
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether the surface must be refreshed after presenting. `None` means
/// nothing was presented.
///
/// Suboptimal and out-of-date presents, or a suboptimal acquire earlier in
/// the frame (`surface_changed`), force a refresh. Other failures propagate.
pub fn present_needs_refresh(
    result: Option<Result<bool, vk::Result>>,
    surface_changed: bool,
) -> RenderResult<bool> {
    match result {
        None => Ok(false),
        Some(Ok(suboptimal)) => Ok(suboptimal || surface_changed),
        Some(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)) => Ok(true),
        Some(Err(e)) => Err(e.into()),
    }
}

/// Decides whether the swapchain must be rebuilt for the surface's current
/// state, and with which extent and transform.
///
/// A zero-sized surface (minimized window) never triggers a rebuild. When
/// the surface leaves the extent to the swapchain only `force` does.
pub fn detect_surface_change(
    tracked_extent: vk::Extent2D,
    tracked_transform: vk::SurfaceTransformFlagsKHR,
    capabilities: &vk::SurfaceCapabilitiesKHR,
    force: bool,
) -> Option<(vk::Extent2D, vk::SurfaceTransformFlagsKHR)> {
    let current = capabilities.current_extent;
    if current.width == u32::MAX {
        return force.then_some((tracked_extent, tracked_transform));
    }
    if current.width == 0 || current.height == 0 {
        return None;
    }

    let transform = capabilities.current_transform;
    let changed = current != tracked_extent || transform != tracked_transform;
    (force || changed).then_some((current, transform))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn caps(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: current,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    const IDENTITY: vk::SurfaceTransformFlagsKHR = vk::SurfaceTransformFlagsKHR::IDENTITY;

    #[test]
    fn test_unchanged_surface_is_left_alone() {
        let tracked = extent(800, 600);
        assert_eq!(detect_surface_change(tracked, IDENTITY, &caps(tracked), false), None);
        assert_eq!(
            detect_surface_change(tracked, IDENTITY, &caps(tracked), true),
            Some((tracked, IDENTITY))
        );
    }

    #[test]
    fn test_resize_is_detected() {
        let change = detect_surface_change(extent(800, 600), IDENTITY, &caps(extent(1024, 768)), false);
        assert_eq!(change, Some((extent(1024, 768), IDENTITY)));
    }

    #[test]
    fn test_rotation_is_detected() {
        let mut capabilities = caps(extent(800, 600));
        capabilities.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        let change = detect_surface_change(extent(800, 600), IDENTITY, &capabilities, false);
        assert_eq!(
            change,
            Some((extent(800, 600), vk::SurfaceTransformFlagsKHR::ROTATE_90))
        );
    }

    #[test]
    fn test_minimized_surface_never_rebuilds() {
        let tracked = extent(800, 600);
        assert_eq!(detect_surface_change(tracked, IDENTITY, &caps(extent(0, 0)), false), None);
        assert_eq!(detect_surface_change(tracked, IDENTITY, &caps(extent(0, 600)), true), None);
    }

    #[test]
    fn test_swapchain_sized_surface_only_rebuilds_when_forced() {
        let tracked = extent(640, 480);
        let special = caps(extent(u32::MAX, u32::MAX));
        assert_eq!(detect_surface_change(tracked, IDENTITY, &special, false), None);
        assert_eq!(
            detect_surface_change(tracked, IDENTITY, &special, true),
            Some((tracked, IDENTITY))
        );
    }

    #[test]
    fn test_acquire_retries_once_then_reports_surface_lost() {
        let out_of_date = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);

        let first = next_acquire_step(out_of_date, 0, 1).unwrap();
        assert_eq!(first, AcquireStep::Recreate(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let second = next_acquire_step(out_of_date, 1, 1);
        assert!(matches!(
            second,
            Err(RenderError::SurfaceLost {
                attempts: 1,
                result: vk::Result::ERROR_OUT_OF_DATE_KHR
            })
        ));

        // With retries disabled a lost surface is reported right away
        let lost = next_acquire_step(Err(vk::Result::ERROR_SURFACE_LOST_KHR), 0, 0);
        assert!(matches!(lost, Err(RenderError::SurfaceLost { attempts: 0, .. })));
    }

    #[test]
    fn test_acquire_other_failures_propagate() {
        let result = next_acquire_step(Err(vk::Result::ERROR_DEVICE_LOST), 0, 3);
        assert!(matches!(
            result,
            Err(RenderError::Rhi(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)))
        ));
    }

    #[test]
    fn test_suboptimal_acquire_forces_refresh_after_present() {
        let step = next_acquire_step(Ok((2, true)), 0, 1).unwrap();
        assert_eq!(step, AcquireStep::Acquired { index: 2, suboptimal: true });

        // The optimal present still refreshes because the acquire was suboptimal
        assert!(present_needs_refresh(Some(Ok(false)), true).unwrap());
        assert!(!present_needs_refresh(Some(Ok(false)), false).unwrap());
    }

    #[test]
    fn test_present_results() {
        assert!(!present_needs_refresh(None, false).unwrap());
        assert!(present_needs_refresh(Some(Ok(true)), false).unwrap());
        assert!(present_needs_refresh(Some(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)), false).unwrap());

        let lost = present_needs_refresh(Some(Err(vk::Result::ERROR_SURFACE_LOST_KHR)), false);
        assert!(matches!(
            lost,
            Err(RenderError::Rhi(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR)))
        ));
    }

    #[test]
    fn test_headless_usage_flags() {
        assert!(HEADLESS_IMAGE_USAGE.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(HEADLESS_IMAGE_USAGE.contains(vk::ImageUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn test_context_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<RenderContext>();
    }
}
