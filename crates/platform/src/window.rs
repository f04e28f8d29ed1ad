//! winit window plus an owning `VkSurfaceKHR`.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use vkframe_core::{Error, Result, WindowConfig};

/// Owns a presentation surface and destroys it on drop.
///
/// The instance the surface was created from must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle came from `ash_window::create_surface` on the
        // instance the loader was built from, and is destroyed only here.
        unsafe { self.loader.destroy_surface(self.handle, None) };
        debug!("Surface destroyed");
    }
}

/// A resizable window with the size last reported by the event loop.
pub struct Window {
    window: Arc<WinitWindow>,
    size: vk::Extent2D,
}

impl Window {
    /// Opens a window sized and titled from `config`.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::Window(e.to_string()))?;

        let inner = window.inner_size();
        info!("Window '{}' opened at {}x{}", config.title, inner.width, inner.height);

        Ok(Self {
            window: Arc::new(window),
            size: vk::Extent2D {
                width: inner.width,
                height: inner.height,
            },
        })
    }

    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Current drawable size. Zero in either dimension while minimized.
    pub fn extent(&self) -> vk::Extent2D {
        self.size
    }

    pub fn is_minimized(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }

    /// Records a new size from a `Resized` event.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = vk::Extent2D { width, height };
        debug!("Window resized to {}x{}", width, height);
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Raw display handle, for [`required_extensions`].
    pub fn raw_display_handle(&self) -> Result<RawDisplayHandle> {
        self.window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| Error::Window(format!("Display handle unavailable: {e}")))
    }

    /// Creates a presentation surface for this window.
    ///
    /// `instance` must have been created with [`required_extensions`] and
    /// must outlive the returned [`Surface`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display = self.raw_display_handle()?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Window handle unavailable: {e}")))?
            .as_raw();

        // SAFETY: both handles belong to a live winit window and the surface
        // is destroyed by `Surface::drop`.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display, window, None)
                .map_err(|e| Error::Vulkan(format!("Surface creation failed: {e}")))?
        };

        info!("Surface created");

        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}

/// Instance extensions needed to present to `display`.
///
/// The returned pointers reference static strings owned by `ash-window`.
pub fn required_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display)
        .map_err(|e| Error::Vulkan(format!("Cannot enumerate surface extensions: {e}")))?;

    debug!(
        "Surface extensions: {:?}",
        extensions
            .iter()
            // SAFETY: ash-window returns NUL-terminated static names.
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}
