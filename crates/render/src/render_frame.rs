//! Per-frame transient resources.
//!
//! A [`RenderFrame`] owns everything the CPU touches while recording one
//! frame: its render target, a fence and semaphore pool, and one
//! [`FrameThread`] per pool index holding command pools, buffer pools and a
//! descriptor allocator.
//!
//! # Synchronization
//!
//! Every submission made through the frame signals one of its fences.
//! [`RenderFrame::reset`] waits on all of them before recycling anything, so
//! nothing is rewound while the GPU may still read it.
//!
//! # Threads
//!
//! Pool index `i` belongs to one recording thread. [`RenderFrame::threads_mut`]
//! hands out disjoint `&mut FrameThread`s, which can be moved into scoped
//! threads:
//!
//! ```no_run
//! # use vkframe_render::RenderFrame;
//! # use vkframe_rhi::command::ResetMode;
//! # use vkframe_rhi::vk;
//! # fn example(frame: &mut RenderFrame, family: u32) {
//! std::thread::scope(|scope| {
//!     for thread in frame.threads_mut() {
//!         scope.spawn(move || {
//!             let cmd = thread.request_command_buffer(
//!                 family,
//!                 ResetMode::ResetPool,
//!                 vk::CommandBufferLevel::SECONDARY,
//!             )?;
//!             // ... record ...
//!             Ok::<_, vkframe_render::RenderError>(cmd)
//!         });
//!     }
//! });
//! # }
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vkframe_rhi::buffer::{BufferAllocation, BufferPool, BufferUsage};
use vkframe_rhi::command::{CommandBuffer, CommandPool, ResetMode};
use vkframe_rhi::descriptor::{DescriptorAllocator, DescriptorSetLayout};
use vkframe_rhi::device::Device;
use vkframe_rhi::sync::{FencePool, Semaphore, SemaphorePool};
use vkframe_rhi::{RhiError, RhiResult};

use crate::error::{RenderError, RenderResult};
use crate::render_target::RenderTarget;

/// Resources recorded into by a single thread.
pub struct FrameThread {
    device: Arc<Device>,
    index: usize,
    command_pools: HashMap<u32, CommandPool>,
    buffer_pools: HashMap<BufferUsage, BufferPool>,
    descriptors: DescriptorAllocator,
}

impl FrameThread {
    fn new(device: Arc<Device>, index: usize) -> Self {
        Self {
            descriptors: DescriptorAllocator::new(device.clone()),
            device,
            index,
            command_pools: HashMap::new(),
            buffer_pools: HashMap::new(),
        }
    }

    /// The pool index this thread's resources are registered under.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns a command buffer for `queue_family_index`.
    ///
    /// The family's pool is created on first use. If it exists with another
    /// reset mode it is destroyed and recreated with `reset_mode`.
    pub fn request_command_buffer(
        &mut self,
        queue_family_index: u32,
        reset_mode: ResetMode,
        level: vk::CommandBufferLevel,
    ) -> RenderResult<CommandBuffer> {
        let pool = match self.command_pools.entry(queue_family_index) {
            Entry::Occupied(entry) if entry.get().reset_mode() == reset_mode => entry.into_mut(),
            Entry::Occupied(mut entry) => {
                debug!(
                    "Recreating command pool (family {}, thread {}): {:?} -> {:?}",
                    queue_family_index,
                    self.index,
                    entry.get().reset_mode(),
                    reset_mode
                );
                let pool = CommandPool::new(self.device.clone(), queue_family_index, self.index, reset_mode)?;
                entry.insert(pool);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(CommandPool::new(
                self.device.clone(),
                queue_family_index,
                self.index,
                reset_mode,
            )?),
        };

        Ok(pool.request_command_buffer(level)?)
    }

    /// Sub-allocates `size` bytes of host-visible memory for `usage`.
    pub fn allocate_buffer(
        &mut self,
        usage: BufferUsage,
        size: vk::DeviceSize,
    ) -> RenderResult<BufferAllocation> {
        if !BufferUsage::POOLED.contains(&usage) {
            return Err(RenderError::UnsupportedBufferUsage(usage));
        }
        if size == 0 {
            return Err(RhiError::InvalidArgument("buffer allocation of 0 bytes".to_string()).into());
        }

        let pool = self
            .buffer_pools
            .entry(usage)
            .or_insert_with(|| BufferPool::new(self.device.clone(), usage));

        if let Some(block) = pool.current_block()
            && let Some(allocation) = block.allocate(size)
        {
            return Ok(allocation);
        }

        pool.request_buffer_block(size)?
            .allocate(size)
            .ok_or_else(|| {
                RhiError::InvalidArgument(format!("fresh block cannot hold {} bytes", size)).into()
            })
    }

    /// Allocates a descriptor set that stays valid until the frame is reset.
    pub fn request_descriptor_set(
        &mut self,
        layout: &DescriptorSetLayout,
    ) -> RenderResult<vk::DescriptorSet> {
        Ok(self.descriptors.allocate(layout)?)
    }

    /// Number of command buffers handed out since the last reset.
    pub fn active_command_buffers(&self) -> usize {
        self.command_pools.values().map(CommandPool::active_count).sum()
    }

    pub fn allocated_descriptor_sets(&self) -> usize {
        self.descriptors.allocated()
    }

    fn reset(&mut self) -> RhiResult<()> {
        for pool in self.command_pools.values_mut() {
            pool.reset_pool()?;
        }
        for pool in self.buffer_pools.values_mut() {
            pool.reset();
        }
        self.descriptors.reset()
    }
}

/// One ring slot's worth of resources.
pub struct RenderFrame {
    device: Arc<Device>,
    // Dropped before the target so no pooled work references freed images
    threads: Vec<FrameThread>,
    fence_pool: FencePool,
    semaphore_pool: SemaphorePool,
    target: RenderTarget,
}

impl RenderFrame {
    pub fn new(device: Arc<Device>, target: RenderTarget, pools_per_frame: usize) -> Self {
        let threads = (0..pools_per_frame)
            .map(|i| FrameThread::new(device.clone(), i))
            .collect();

        Self {
            fence_pool: FencePool::new(device.clone()),
            semaphore_pool: SemaphorePool::new(device.clone()),
            device,
            threads,
            target,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn render_target(&self) -> &RenderTarget {
        &self.target
    }

    /// Swaps in a target built for a new swapchain, keeping the pools.
    pub fn update_render_target(&mut self, target: RenderTarget) {
        self.target = target;
    }

    /// Waits for this frame's submissions, then recycles every pool.
    pub fn reset(&mut self) -> RenderResult<()> {
        self.fence_pool.wait(u64::MAX)?;
        self.fence_pool.reset()?;

        for thread in &mut self.threads {
            thread.reset()?;
        }

        self.semaphore_pool.reset();
        Ok(())
    }

    pub fn pools_per_frame(&self) -> usize {
        self.threads.len()
    }

    /// The resources of pool `index`.
    pub fn thread(&mut self, index: usize) -> RenderResult<&mut FrameThread> {
        let count = self.threads.len();
        self.threads
            .get_mut(index)
            .ok_or(RenderError::InvalidPoolIndex { index, count })
    }

    /// All per-thread resources, one entry per pool index.
    pub fn threads_mut(&mut self) -> &mut [FrameThread] {
        &mut self.threads
    }

    pub fn request_command_buffer(
        &mut self,
        queue_family_index: u32,
        reset_mode: ResetMode,
        level: vk::CommandBufferLevel,
        pool_index: usize,
    ) -> RenderResult<CommandBuffer> {
        self.thread(pool_index)?
            .request_command_buffer(queue_family_index, reset_mode, level)
    }

    pub fn allocate_buffer(
        &mut self,
        usage: BufferUsage,
        size: vk::DeviceSize,
        pool_index: usize,
    ) -> RenderResult<BufferAllocation> {
        self.thread(pool_index)?.allocate_buffer(usage, size)
    }

    pub fn request_descriptor_set(
        &mut self,
        layout: &DescriptorSetLayout,
        pool_index: usize,
    ) -> RenderResult<vk::DescriptorSet> {
        self.thread(pool_index)?.request_descriptor_set(layout)
    }

    /// A semaphore recycled when this frame is next reset.
    pub fn request_semaphore(&mut self) -> RenderResult<vk::Semaphore> {
        Ok(self.semaphore_pool.request_semaphore()?)
    }

    /// A semaphore that leaves the pool until released, possibly into
    /// another frame.
    pub fn request_owned_semaphore(&mut self) -> RenderResult<Semaphore> {
        Ok(self.semaphore_pool.request_owned_semaphore()?)
    }

    pub fn release_owned_semaphore(&mut self, semaphore: Semaphore) {
        self.semaphore_pool.release_owned_semaphore(semaphore);
    }

    /// An unsignaled fence that [`reset`](Self::reset) will wait on.
    pub fn request_fence(&mut self) -> RenderResult<vk::Fence> {
        Ok(self.fence_pool.request_fence()?)
    }

    pub fn active_fences(&self) -> usize {
        self.fence_pool.active_count()
    }

    pub fn active_semaphores(&self) -> usize {
        self.semaphore_pool.active_count()
    }
}
