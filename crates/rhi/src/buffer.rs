//! Host-visible buffers and per-frame buffer pools.
//!
//! - [`Buffer`] wraps a `VkBuffer` with gpu-allocator managed, persistently
//!   mapped memory.
//! - [`BufferPool`] hands out fixed-size [`BufferBlock`]s for one usage.
//! - A block sub-allocates aligned [`BufferAllocation`]s until it is full.
//!   Rewinding a block makes its whole range reusable.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::buffer::{BufferPool, BufferUsage};
//! use vkframe_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let mut pool = BufferPool::new(device, BufferUsage::Uniform);
//! let block = pool.request_buffer_block(64)?;
//! let allocation = block.allocate(64).expect("fresh block has room");
//! allocation.update_pod(&[1.0f32; 16])?;
//!
//! // Once the frame's GPU work is done:
//! pool.reset();
//! # Ok(())
//! # }
//! ```

use std::ffi::c_void;
use std::ops::Range;
use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Base size of one pool block.
pub const BUFFER_POOL_BLOCK_SIZE: vk::DeviceSize = 256 * 1024;

/// Alignment for usages the device does not constrain.
const DEFAULT_ALIGNMENT: vk::DeviceSize = 16;

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Storage,
    Staging,
}

impl BufferUsage {
    /// Usages that can be sub-allocated from per-frame pools.
    pub const POOLED: [BufferUsage; 4] = [
        BufferUsage::Uniform,
        BufferUsage::Storage,
        BufferUsage::Vertex,
        BufferUsage::Index,
    ];

    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferUsage::Staging => {
                vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST
            }
        }
    }

    /// Block size multiplier for per-frame pools.
    pub fn block_multiplier(self) -> vk::DeviceSize {
        match self {
            BufferUsage::Storage => 2,
            _ => 1,
        }
    }

    /// Required sub-allocation alignment on `device`.
    pub fn alignment(self, limits: &vk::PhysicalDeviceLimits) -> vk::DeviceSize {
        match self {
            BufferUsage::Uniform => limits.min_uniform_buffer_offset_alignment,
            BufferUsage::Storage => limits.min_storage_buffer_offset_alignment,
            _ => DEFAULT_ALIGNMENT,
        }
        .max(1)
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Storage => "storage",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer in host-visible, persistently mapped memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidArgument(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let location = match usage {
            BufferUsage::Staging => MemoryLocation::GpuToCpu,
            _ => MemoryLocation::CpuToGpu,
        };
        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });

        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        // Drop releases the handle and allocation from here on
        let this = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        };
        unsafe {
            this.device.handle().bind_buffer_memory(buffer, memory, offset)?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(this)
    }

    /// Copies `data` into the mapped memory at `offset`.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let range = mapped_range(offset, data.len(), self.size).ok_or_else(|| {
            RhiError::InvalidArgument(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            ))
        })?;

        let mapped = self.mapped_ptr()?;
        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(range.start);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Reads back `len` bytes at `offset`. Intended for staging buffers
    /// after the GPU has finished writing.
    pub fn read_data(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        let range = mapped_range(offset, len, self.size).ok_or_else(|| {
            RhiError::InvalidArgument(format!(
                "Read of {} bytes at {} exceeds buffer size {}",
                len, offset, self.size
            ))
        })?;

        let mapped = self.mapped_ptr()?;
        let slice =
            unsafe { std::slice::from_raw_parts(mapped.as_ptr().cast::<u8>(), self.size as usize) };
        Ok(slice[range].to_vec())
    }

    fn mapped_ptr(&self) -> RhiResult<NonNull<c_void>> {
        self.allocation
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer allocation is not available".to_string()))?
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().lock().free(allocation)
        {
            error!("Failed to free buffer allocation: {:?}", e);
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

/// Byte range `offset..offset + len` if it fits in `size` bytes.
fn mapped_range(offset: vk::DeviceSize, len: usize, size: vk::DeviceSize) -> Option<Range<usize>> {
    let end = offset.checked_add(u64::try_from(len).ok()?)?;
    if end > size {
        return None;
    }
    Some(usize::try_from(offset).ok()?..usize::try_from(end).ok()?)
}

/// Bump cursor over a range of `size` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockCursor {
    size: vk::DeviceSize,
    offset: vk::DeviceSize,
    alignment: vk::DeviceSize,
}

impl BlockCursor {
    pub fn new(size: vk::DeviceSize, alignment: vk::DeviceSize) -> Self {
        Self {
            size,
            offset: 0,
            alignment: alignment.max(1),
        }
    }

    /// Reserves `len` bytes and returns their aligned offset, or `None` if
    /// the range is exhausted.
    pub fn try_allocate(&mut self, len: vk::DeviceSize) -> Option<vk::DeviceSize> {
        if len == 0 {
            return None;
        }
        let aligned = self.offset.div_ceil(self.alignment) * self.alignment;
        let end = aligned.checked_add(len)?;
        if end > self.size {
            return None;
        }
        self.offset = end;
        Some(aligned)
    }

    /// Whether `len` more bytes would fit.
    pub fn can_allocate(&self, len: vk::DeviceSize) -> bool {
        let mut probe = *self;
        probe.try_allocate(len).is_some()
    }

    #[inline]
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

/// A range of a pooled buffer handed out for this frame.
pub struct BufferAllocation {
    buffer: Arc<Buffer>,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
}

impl BufferAllocation {
    /// Writes `data` at the start of the range.
    pub fn update(&self, data: &[u8]) -> RhiResult<()> {
        self.update_at(0, data)
    }

    /// Writes `data` at `offset` bytes into the range.
    pub fn update_at(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if mapped_range(offset, data.len(), self.size).is_none() {
            return Err(RhiError::InvalidArgument(format!(
                "Update of {} bytes at {} exceeds allocation size {}",
                data.len(),
                offset,
                self.size
            )));
        }
        self.buffer.write_data(self.offset + offset, data)
    }

    /// Writes a plain-old-data value or slice.
    pub fn update_pod<T: bytemuck::NoUninit>(&self, value: &[T]) -> RhiResult<()> {
        self.update(bytemuck::cast_slice(value))
    }

    #[inline]
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Descriptor info covering exactly this range.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo::default()
            .buffer(self.buffer.handle())
            .offset(self.offset)
            .range(self.size)
    }
}

/// One pooled buffer plus its sub-allocation cursor.
pub struct BufferBlock {
    buffer: Arc<Buffer>,
    cursor: BlockCursor,
}

impl BufferBlock {
    fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        let alignment = usage.alignment(device.limits());
        let buffer = Buffer::new(device, usage, size)?;
        Ok(Self {
            buffer: Arc::new(buffer),
            cursor: BlockCursor::new(size, alignment),
        })
    }

    /// Sub-allocates `size` bytes, or `None` if the block is full.
    pub fn allocate(&mut self, size: vk::DeviceSize) -> Option<BufferAllocation> {
        let offset = self.cursor.try_allocate(size)?;
        Some(BufferAllocation {
            buffer: self.buffer.clone(),
            offset,
            size,
        })
    }

    pub fn can_allocate(&self, size: vk::DeviceSize) -> bool {
        self.cursor.can_allocate(size)
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.cursor.size()
    }

    pub fn reset(&mut self) {
        self.cursor.reset();
    }
}

/// Blocks of one buffer usage for one frame and thread.
pub struct BufferPool {
    device: Arc<Device>,
    usage: BufferUsage,
    block_size: vk::DeviceSize,
    blocks: Vec<BufferBlock>,
    active: usize,
}

impl BufferPool {
    pub fn new(device: Arc<Device>, usage: BufferUsage) -> Self {
        Self::with_block_size(device, usage, BUFFER_POOL_BLOCK_SIZE * usage.block_multiplier())
    }

    pub fn with_block_size(device: Arc<Device>, usage: BufferUsage, block_size: vk::DeviceSize) -> Self {
        Self {
            device,
            usage,
            block_size,
            blocks: Vec::new(),
            active: 0,
        }
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn block_size(&self) -> vk::DeviceSize {
        self.block_size
    }

    /// Returns the next unused block that can hold `min_size` bytes, creating
    /// one (at least `min_size` large) if needed.
    pub fn request_buffer_block(&mut self, min_size: vk::DeviceSize) -> RhiResult<&mut BufferBlock> {
        let reusable = self.blocks[self.active..]
            .iter()
            .position(|block| block.size() >= min_size)
            .map(|i| i + self.active);

        let index = match reusable {
            Some(index) => {
                self.blocks.swap(self.active, index);
                self.active
            }
            None => {
                let size = self.block_size.max(min_size);
                let block = BufferBlock::new(self.device.clone(), self.usage, size)?;
                debug!("Buffer pool ({}) grew to {} blocks", self.usage.name(), self.blocks.len() + 1);
                self.blocks.push(block);
                let last = self.blocks.len() - 1;
                self.blocks.swap(self.active, last);
                self.active
            }
        };

        self.active += 1;
        Ok(&mut self.blocks[index])
    }

    /// The block handed out most recently, if any.
    pub fn current_block(&mut self) -> Option<&mut BufferBlock> {
        match self.active {
            0 => None,
            n => self.blocks.get_mut(n - 1),
        }
    }

    /// Rewinds every block. Previous [`BufferAllocation`]s must no longer be
    /// in use by the GPU.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.reset();
        }
        self.active = 0;
    }

    pub fn active_blocks(&self) -> usize {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_flags() {
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert_eq!(BufferUsage::Storage.block_multiplier(), 2);
        assert_eq!(BufferUsage::Vertex.block_multiplier(), 1);
    }

    #[test]
    fn test_alignment_follows_limits() {
        let limits = vk::PhysicalDeviceLimits {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 64,
            ..Default::default()
        };
        assert_eq!(BufferUsage::Uniform.alignment(&limits), 256);
        assert_eq!(BufferUsage::Storage.alignment(&limits), 64);
        assert_eq!(BufferUsage::Index.alignment(&limits), DEFAULT_ALIGNMENT);
    }

    #[test]
    fn test_cursor_aligns_suballocations() {
        let mut cursor = BlockCursor::new(1024, 256);
        assert_eq!(cursor.try_allocate(100), Some(0));
        assert_eq!(cursor.try_allocate(100), Some(256));
        assert_eq!(cursor.offset(), 356);
        assert_eq!(cursor.try_allocate(512), Some(512));
        // 1024 bytes used, nothing else fits
        assert_eq!(cursor.try_allocate(1), None);
    }

    #[test]
    fn test_cursor_rejects_oversized_and_rewinds() {
        let mut cursor = BlockCursor::new(512, 16);
        assert!(!cursor.can_allocate(513));
        assert_eq!(cursor.try_allocate(0), None);
        assert_eq!(cursor.try_allocate(512), Some(0));
        assert!(!cursor.can_allocate(16));

        cursor.reset();
        assert_eq!(cursor.offset(), 0);
        assert!(cursor.can_allocate(512));
    }

    #[test]
    fn test_mapped_range_bounds() {
        assert_eq!(mapped_range(0, 64, 64), Some(0..64));
        assert_eq!(mapped_range(16, 16, 64), Some(16..32));
        assert_eq!(mapped_range(64, 0, 64), Some(64..64));
        assert_eq!(mapped_range(60, 8, 64), None);
        assert_eq!(mapped_range(u64::MAX, 1, 64), None);
        assert_eq!(mapped_range(1, usize::MAX, u64::MAX), None);
    }

    #[test]
    fn test_buffer_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
        assert_send_sync::<BufferPool>();
        assert_send_sync::<BufferAllocation>();
    }
}
