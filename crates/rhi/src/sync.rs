//! Synchronization primitives and their per-frame pools.
//!
//! - [`Semaphore`] / [`Fence`]: RAII wrappers holding an `Arc<Device>`.
//! - [`SemaphorePool`] / [`FencePool`]: hand out handles for one frame and
//!   recycle them when the frame comes around again. Nothing is destroyed
//!   until the pool itself is dropped.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::sync::{FencePool, SemaphorePool};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let mut fences = FencePool::new(device.clone());
//! let mut semaphores = SemaphorePool::new(device);
//!
//! let fence = fences.request_fence()?;
//! let signal = semaphores.request_semaphore()?;
//! // ... submit work signaling `signal` and `fence` ...
//!
//! fences.wait(u64::MAX)?;
//! fences.reset()?;
//! semaphores.reset();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a binary semaphore in the unsignaled state.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore {:?}", semaphore);

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore {:?}", self.semaphore);
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence {:?} ({})",
            fence,
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence. `timeout` is in nanoseconds.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence. It must not be pending on any queue.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence {:?}", self.fence);
    }
}

/// A list of reusable objects with a count of how many are handed out.
///
/// Items `[0, active)` are in use this cycle; the rest are idle and are
/// handed out again before anything new is created.
#[derive(Debug)]
pub struct Recycler<T> {
    items: Vec<T>,
    active: usize,
}

impl<T> Default for Recycler<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            active: 0,
        }
    }
}

impl<T> Recycler<T> {
    /// Returns the next idle item, creating one with `create` if none is idle.
    pub fn request<E>(&mut self, create: impl FnOnce() -> Result<T, E>) -> Result<&T, E> {
        if self.active == self.items.len() {
            self.items.push(create()?);
        }
        self.active += 1;
        Ok(&self.items[self.active - 1])
    }

    /// Moves an item into the pool as in use. It becomes idle on the next reset.
    pub fn insert_active(&mut self, item: T) {
        self.items.insert(self.active, item);
        self.active += 1;
    }

    /// Removes an idle item so the caller owns it, creating one if none is idle.
    pub fn take<E>(&mut self, create: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        if self.active < self.items.len() {
            Ok(self.items.remove(self.active))
        } else {
            create()
        }
    }

    /// Items handed out this cycle.
    pub fn active(&self) -> &[T] {
        &self.items[..self.active]
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Total items owned, active or idle.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Marks every item idle.
    pub fn reset(&mut self) {
        self.active = 0;
    }

    /// Removes and returns every item, active or idle.
    pub fn clear(&mut self) -> Vec<T> {
        self.active = 0;
        std::mem::take(&mut self.items)
    }
}

/// Per-frame semaphore pool.
pub struct SemaphorePool {
    device: Arc<Device>,
    semaphores: Recycler<Semaphore>,
}

impl SemaphorePool {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            semaphores: Recycler::default(),
        }
    }

    /// Returns a semaphore that stays owned by the pool and becomes reusable
    /// after the next [`reset`](Self::reset).
    pub fn request_semaphore(&mut self) -> RhiResult<vk::Semaphore> {
        let device = &self.device;
        let semaphore = self
            .semaphores
            .request(|| Semaphore::new(device.clone()))?;
        Ok(semaphore.handle())
    }

    /// Returns a semaphore the caller owns until it hands it back with
    /// [`release_owned_semaphore`](Self::release_owned_semaphore), possibly
    /// to a different frame's pool.
    pub fn request_owned_semaphore(&mut self) -> RhiResult<Semaphore> {
        let device = &self.device;
        self.semaphores.take(|| Semaphore::new(device.clone()))
    }

    /// Takes back ownership of a semaphore. It is recycled on the next reset.
    pub fn release_owned_semaphore(&mut self, semaphore: Semaphore) {
        self.semaphores.insert_active(semaphore);
    }

    /// Makes every semaphore available again. The caller must guarantee the
    /// GPU is done with them.
    pub fn reset(&mut self) {
        self.semaphores.reset();
    }

    pub fn active_count(&self) -> usize {
        self.semaphores.active_count()
    }
}

/// Per-frame fence pool.
pub struct FencePool {
    device: Arc<Device>,
    fences: Recycler<Fence>,
}

impl FencePool {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            fences: Recycler::default(),
        }
    }

    /// Returns an unsignaled fence, reusing an idle one if possible.
    pub fn request_fence(&mut self) -> RhiResult<vk::Fence> {
        let device = &self.device;
        let fence = self.fences.request(|| Fence::new(device.clone(), false))?;
        Ok(fence.handle())
    }

    /// Waits on every fence handed out this cycle. Succeeds immediately when
    /// none are active.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let handles = self.active_handles();
        if handles.is_empty() {
            return Ok(());
        }
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&handles, true, timeout)?
        };
        Ok(())
    }

    /// Resets every active fence back to unsignaled and marks them idle.
    pub fn reset(&mut self) -> RhiResult<()> {
        let handles = self.active_handles();
        if !handles.is_empty() {
            unsafe { self.device.handle().reset_fences(&handles)? };
        }
        self.fences.reset();
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.fences.active_count()
    }

    fn active_handles(&self) -> Vec<vk::Fence> {
        self.fences.active().iter().map(Fence::handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> impl FnMut() -> Result<u32, ()> {
        let mut next = 0;
        move || {
            next += 1;
            Ok(next)
        }
    }

    #[test]
    fn test_recycler_reuses_after_reset() {
        let mut create = counter();
        let mut pool = Recycler::default();

        assert_eq!(*pool.request(&mut create).unwrap(), 1);
        assert_eq!(*pool.request(&mut create).unwrap(), 2);
        assert_eq!(pool.active_count(), 2);

        pool.reset();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.len(), 2);

        // Idle items come back in order before anything is created
        assert_eq!(*pool.request(&mut create).unwrap(), 1);
        assert_eq!(*pool.request(&mut create).unwrap(), 2);
        assert_eq!(*pool.request(&mut create).unwrap(), 3);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_recycler_create_failure_leaves_pool_unchanged() {
        let mut pool: Recycler<u32> = Recycler::default();
        assert!(pool.request(|| Err::<u32, _>("out of memory")).is_err());
        assert_eq!(pool.active_count(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_recycler_take_and_return() {
        let mut create = counter();
        let mut pool = Recycler::default();
        pool.request(&mut create).unwrap();
        pool.request(&mut create).unwrap();
        pool.reset();

        // Take an idle item out of the pool
        let owned = pool.take(&mut create).unwrap();
        assert_eq!(owned, 1);
        assert_eq!(pool.len(), 1);

        // Nothing idle left: a fresh item is created
        pool.request(&mut create).unwrap();
        assert_eq!(pool.take(&mut create).unwrap(), 3);

        // Returned items stay in use until the next reset
        pool.insert_active(owned);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.active(), &[2, 1]);
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<SemaphorePool>();
        assert_send_sync::<FencePool>();
    }
}
