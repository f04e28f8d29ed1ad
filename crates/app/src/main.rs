//! vkframe demo.
//!
//! Drives the frame lifecycle with a single clear subpass, either in a
//! window or headless for a fixed number of frames.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use clap::Parser;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkframe_core::{FrameTimer, FrameworkConfig};
use vkframe_platform::{Surface, Window, required_extensions};
use vkframe_render::{
    ClearSubpass, ContextSettings, DefaultTargetFactory, DeferredTargetFactory, RenderContext,
    RenderPipeline, RenderResult,
};
use vkframe_rhi::command::{CommandBuffer, ResetMode};
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::{SurfaceQuery, select_physical_device};
use vkframe_rhi::queue::Queue;

const CLEAR_COLOR: [f32; 4] = [0.1, 0.2, 0.3, 1.0];

#[derive(Parser, Debug)]
#[command(name = "vkframe", about = "Frame lifecycle demo")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render offscreen without a window
    #[arg(long)]
    headless: bool,

    /// Stop after this many frames
    #[arg(short, long)]
    frames: Option<u64>,
}

fn main() -> Result<()> {
    vkframe_core::init_logging();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => FrameworkConfig::load(path)?,
        None => FrameworkConfig::default(),
    };
    config.render.headless |= args.headless;

    info!("Starting vkframe ({})", if config.render.headless { "headless" } else { "windowed" });

    if config.render.headless {
        run_headless(&config, args.frames.unwrap_or(3))
    } else {
        run_windowed(config, args.frames)
    }
}

fn prepare(context: &mut RenderContext, settings: &ContextSettings) -> RenderResult<()> {
    if settings.deferred_targets {
        context.prepare(settings.pools_per_frame, DeferredTargetFactory)
    } else {
        context.prepare(settings.pools_per_frame, DefaultTargetFactory)
    }
}

/// Records the active frame's pipeline into a fresh command buffer.
fn record_frame(
    context: &mut RenderContext,
    queue: &Queue,
    pipeline: &mut RenderPipeline,
) -> RenderResult<CommandBuffer> {
    let command_buffer = context.request_frame_command_buffer(
        queue,
        ResetMode::ResetPool,
        vk::CommandBufferLevel::PRIMARY,
        0,
    )?;
    command_buffer.begin()?;
    pipeline.draw(&command_buffer, context.get_active_frame()?.render_target())?;
    command_buffer.end()?;
    Ok(command_buffer)
}

fn run_headless(config: &FrameworkConfig, frames: u64) -> Result<()> {
    let instance = Instance::new(c"vkframe", config.render.validation, &[])?;
    let physical = select_physical_device(&instance, None)?;
    let device = Device::new(&instance, physical)?;

    let settings = ContextSettings::from_config(&config.render);
    let mut context = RenderContext::headless(device.clone(), settings.clone());
    prepare(&mut context, &settings)?;

    let mut pipeline = RenderPipeline::new().with_subpass(ClearSubpass::new(CLEAR_COLOR));
    pipeline.set_final_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

    let queue = device.suitable_graphics_queue()?;
    let mut timer = FrameTimer::default();
    for _ in 0..frames {
        context.begin_frame()?;
        let command_buffer = record_frame(&mut context, queue, &mut pipeline)?;
        context.submit_fenced(queue, &[command_buffer.handle()])?;
        context.end_frame(vk::Semaphore::null())?;

        timer.tick();
        if let Some(fps) = timer.take_report() {
            info!("{:.1} fps", fps);
        }
    }

    device.wait_idle()?;
    info!(
        "Rendered {} headless frames in {:.2?}",
        timer.total_frames(),
        timer.elapsed()
    );
    Ok(())
}

fn run_windowed(config: FrameworkConfig, frames: Option<u64>) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, frames);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Everything that lives as long as the window, in drop order.
struct Graphics {
    context: RenderContext,
    _surface: Surface,
    device: Arc<Device>,
    _instance: Instance,
}

impl Graphics {
    fn new(window: &Window, config: &FrameworkConfig) -> Result<Self> {
        let extensions = required_extensions(window.raw_display_handle()?)?;
        let instance = Instance::new(c"vkframe", config.render.validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical = select_physical_device(
            &instance,
            Some(SurfaceQuery {
                loader: surface.loader(),
                surface: surface.handle(),
            }),
        )?;
        let device = Device::new(&instance, physical)?;

        let settings = ContextSettings::from_config(&config.render);
        let mut context = RenderContext::new(
            &instance,
            device.clone(),
            surface.handle(),
            window.extent(),
            settings.clone(),
        )?;
        prepare(&mut context, &settings).context("failed to prepare the render context")?;

        Ok(Self {
            context,
            _surface: surface,
            device,
            _instance: instance,
        })
    }

    fn render(&mut self, pipeline: &mut RenderPipeline) -> RenderResult<()> {
        let acquired = self.context.begin_frame()?;
        let queue = self.device.suitable_graphics_queue()?;
        let command_buffer = record_frame(&mut self.context, queue, pipeline)?;
        let rendered = self.context.submit(
            queue,
            &[command_buffer.handle()],
            acquired,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        )?;
        self.context.end_frame(rendered)
    }
}

struct App {
    config: FrameworkConfig,
    frame_limit: Option<u64>,
    graphics: Option<Graphics>,
    window: Option<Window>,
    pipeline: RenderPipeline,
    timer: FrameTimer,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: FrameworkConfig, frame_limit: Option<u64>) -> Self {
        Self {
            config,
            frame_limit,
            graphics: None,
            window: None,
            pipeline: RenderPipeline::new().with_subpass(ClearSubpass::new(CLEAR_COLOR)),
            timer: FrameTimer::default(),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("{:#}", e);
        self.error = Some(e);
        event_loop.exit();
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let Some(window) = &mut self.window else {
            return Ok(());
        };
        window.resize(width, height);
        if window.is_minimized() {
            return Ok(());
        }

        // Surfaces that leave the size to the swapchain only learn it here
        let extent = window.extent();
        match &mut self.graphics {
            Some(graphics) if graphics.context.surface_extent() != extent => {
                graphics.context.update_swapchain_extent(extent)
            }
            _ => Ok(()),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let minimized = self.window.as_ref().is_none_or(Window::is_minimized);
        let Some(graphics) = &mut self.graphics else {
            return;
        };
        if minimized {
            return;
        }

        if let Err(e) = graphics.render(&mut self.pipeline) {
            self.fail(event_loop, e.into());
            return;
        }

        self.timer.tick();
        if let Some(fps) = self.timer.take_report() {
            info!("{:.1} fps", fps);
        }
        if self.frame_limit.is_some_and(|limit| self.timer.total_frames() >= limit) {
            info!("Frame limit reached, shutting down");
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, e.into()),
        };
        match Graphics::new(&window, &self.config) {
            Ok(graphics) => {
                info!("Initialization complete, entering main loop");
                self.graphics = Some(graphics);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Err(e) = self.resize(size.width, size.height) {
                    warn!("Resize to {}x{} failed: {}", size.width, size.height, e);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Tear down GPU state while the window still exists
        self.graphics = None;
        info!(
            "Rendered {} frames in {:.2?}",
            self.timer.total_frames(),
            self.timer.elapsed()
        );
    }
}
