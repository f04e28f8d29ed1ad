//! Windowing service for the vkframe demo.
//!
//! Provides a winit [`Window`], an owning Vulkan [`Surface`] and the
//! instance extensions a display needs for presentation.

mod window;

pub use window::{Surface, Window, required_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
