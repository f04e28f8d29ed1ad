//! Command pools and command buffers.
//!
//! A [`CommandPool`] belongs to one queue family and one recording thread.
//! It hands out command buffers for the current frame and recycles them
//! according to its [`ResetMode`] once the frame's GPU work has finished.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::command::{CommandPool, ResetMode};
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let family = device.suitable_graphics_queue()?.family_index();
//! let mut pool = CommandPool::new(device, family, 0, ResetMode::ResetPool)?;
//!
//! let cmd = pool.request_command_buffer(vk::CommandBufferLevel::PRIMARY)?;
//! cmd.begin()?;
//! // ... record ...
//! cmd.end()?;
//!
//! // Once the submission's fence has signaled:
//! pool.reset_pool()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;
use crate::sync::Recycler;

/// How a pool recycles its command buffers between frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResetMode {
    /// Reset the whole pool with one `vkResetCommandPool` call.
    #[default]
    ResetPool,
    /// Reset each handed-out command buffer on its own.
    ResetIndividually,
    /// Free every command buffer and allocate fresh ones next frame.
    AlwaysAllocate,
}

impl ResetMode {
    fn create_flags(self) -> vk::CommandPoolCreateFlags {
        match self {
            Self::ResetIndividually => vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            Self::ResetPool | Self::AlwaysAllocate => vk::CommandPoolCreateFlags::TRANSIENT,
        }
    }
}

/// Vulkan command pool bound to one queue family and one thread index.
///
/// Command pools are externally synchronized: only the owning thread may
/// request from or reset a pool.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
    thread_index: usize,
    reset_mode: ResetMode,
    primary: Recycler<vk::CommandBuffer>,
    secondary: Recycler<vk::CommandBuffer>,
}

impl CommandPool {
    pub fn new(
        device: Arc<Device>,
        queue_family_index: u32,
        thread_index: usize,
        reset_mode: ResetMode,
    ) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(reset_mode.create_flags());

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        debug!(
            "Command pool created (family {}, thread {}, {:?})",
            queue_family_index, thread_index, reset_mode
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
            thread_index,
            reset_mode,
            primary: Recycler::default(),
            secondary: Recycler::default(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    #[inline]
    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    #[inline]
    pub fn reset_mode(&self) -> ResetMode {
        self.reset_mode
    }

    /// Number of command buffers handed out since the last reset.
    pub fn active_count(&self) -> usize {
        self.primary.active_count() + self.secondary.active_count()
    }

    /// Returns a command buffer in the initial state, reusing one from a
    /// previous frame when the reset mode allows it.
    pub fn request_command_buffer(&mut self, level: vk::CommandBufferLevel) -> RhiResult<CommandBuffer> {
        let device = &self.device;
        let pool = self.pool;
        let buffers = if level == vk::CommandBufferLevel::SECONDARY {
            &mut self.secondary
        } else {
            &mut self.primary
        };

        let handle = *buffers.request(|| allocate(device, pool, level))?;

        Ok(CommandBuffer {
            device: self.device.clone(),
            buffer: handle,
            level,
        })
    }

    /// Recycles every command buffer handed out by this pool.
    ///
    /// The caller must guarantee none of them is still executing.
    pub fn reset_pool(&mut self) -> RhiResult<()> {
        let device = self.device.handle();
        match self.reset_mode {
            ResetMode::ResetIndividually => {
                for &buffer in self.primary.active().iter().chain(self.secondary.active()) {
                    unsafe {
                        device.reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())?
                    };
                }
                self.primary.reset();
                self.secondary.reset();
            }
            ResetMode::ResetPool => {
                unsafe { device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())? };
                self.primary.reset();
                self.secondary.reset();
            }
            ResetMode::AlwaysAllocate => {
                let buffers: Vec<vk::CommandBuffer> = self
                    .primary
                    .clear()
                    .into_iter()
                    .chain(self.secondary.clear())
                    .collect();
                if !buffers.is_empty() {
                    unsafe { device.free_command_buffers(self.pool, &buffers) };
                }
            }
        }
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees its command buffers
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!(
            "Command pool destroyed (family {}, thread {})",
            self.queue_family_index, self.thread_index
        );
    }
}

fn allocate(
    device: &Device,
    pool: vk::CommandPool,
    level: vk::CommandBufferLevel,
) -> RhiResult<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(level)
        .command_buffer_count(1);

    let buffers = unsafe { device.handle().allocate_command_buffers(&alloc_info)? };
    Ok(buffers[0])
}

/// Vulkan command buffer handle plus recording helpers.
///
/// Does not own the underlying `VkCommandBuffer`; the [`CommandPool`] that
/// produced it does. A handle must not be used after the pool's next reset.
#[derive(Clone)]
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
    level: vk::CommandBufferLevel,
}

impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    pub fn level(&self) -> vk::CommandBufferLevel {
        self.level
    }

    /// Begins a one-time-submit recording.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        Ok(())
    }

    /// Resets this buffer alone. Only valid for pools in
    /// [`ResetMode::ResetIndividually`].
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }

        Ok(())
    }

    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo<'_>) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info);
        }
    }

    pub fn end_rendering(&self) {
        unsafe {
            self.device.handle().cmd_end_rendering(self.buffer);
        }
    }

    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport));
        }
    }

    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor));
        }
    }

    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                image_barriers,
            );
        }
    }

    /// Global memory dependency, e.g. transfer writes before host reads.
    pub fn memory_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        src_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
        dst_access: vk::AccessFlags,
    ) {
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
    }

    pub fn clear_color_image(
        &self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: &vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_clear_color_image(self.buffer, image, layout, color, ranges);
        }
    }

    /// Clears regions of the attachments bound by the current rendering scope.
    pub fn clear_attachments(&self, attachments: &[vk::ClearAttachment], rects: &[vk::ClearRect]) {
        unsafe {
            self.device
                .handle()
                .cmd_clear_attachments(self.buffer, attachments, rects);
        }
    }

    pub fn copy_image_to_buffer(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device.handle().cmd_copy_image_to_buffer(
                self.buffer,
                src,
                src_layout,
                dst,
                regions,
            );
        }
    }
}
