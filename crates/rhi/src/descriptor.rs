//! Descriptor set layouts, pools and a growing per-thread allocator.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::descriptor::{DescriptorAllocator, DescriptorBindingBuilder, DescriptorSetLayout};
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX)],
//! )?;
//!
//! let mut allocator = DescriptorAllocator::new(device);
//! let set = allocator.allocate(&layout)?;
//! // ... next time the frame comes around ...
//! allocator.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Sets per pool for the first pool an allocator creates.
const INITIAL_SETS_PER_POOL: u32 = 16;

/// Upper bound on sets per pool as pools grow.
const MAX_SETS_PER_POOL: u32 = 4096;

/// Descriptors per set reserved in every pool, by type.
const DEFAULT_POOL_RATIOS: &[(vk::DescriptorType, f32)] = &[
    (vk::DescriptorType::UNIFORM_BUFFER, 2.0),
    (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
    (vk::DescriptorType::STORAGE_BUFFER, 2.0),
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4.0),
    (vk::DescriptorType::STORAGE_IMAGE, 1.0),
    (vk::DescriptorType::INPUT_ATTACHMENT, 1.0),
];

/// Vulkan descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Vulkan descriptor pool wrapper. Sets are recycled only by resetting the
/// whole pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }

    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Allocates descriptor sets from a list of pools, adding a larger pool
/// whenever the current one runs out.
pub struct DescriptorAllocator {
    device: Arc<Device>,
    ready: Vec<DescriptorPool>,
    full: Vec<DescriptorPool>,
    sets_per_pool: u32,
    allocated: usize,
}

impl DescriptorAllocator {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            ready: Vec::new(),
            full: Vec::new(),
            sets_per_pool: INITIAL_SETS_PER_POOL,
            allocated: 0,
        }
    }

    /// Allocates one set with `layout`.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let mut pool = self.take_pool()?;
        let mut result = pool.allocate(layout.handle());

        if matches!(&result, Err(e) if is_pool_exhausted(e)) {
            self.full.push(pool);
            pool = self.take_pool()?;
            result = pool.allocate(layout.handle());
        }

        self.ready.push(pool);
        let set = result?;
        self.allocated += 1;
        Ok(set)
    }

    /// Returns every set to its pool. The caller must guarantee none of them
    /// is still referenced by pending GPU work.
    pub fn reset(&mut self) -> RhiResult<()> {
        for pool in self.ready.iter().chain(&self.full) {
            pool.reset()?;
        }
        self.ready.append(&mut self.full);
        self.allocated = 0;
        Ok(())
    }

    /// Number of sets handed out since the last reset.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of pools created so far.
    pub fn pool_count(&self) -> usize {
        self.ready.len() + self.full.len()
    }

    fn take_pool(&mut self) -> RhiResult<DescriptorPool> {
        if let Some(pool) = self.ready.pop() {
            return Ok(pool);
        }

        let sizes = pool_sizes(DEFAULT_POOL_RATIOS, self.sets_per_pool);
        let pool = DescriptorPool::new(self.device.clone(), self.sets_per_pool, &sizes)?;
        self.sets_per_pool = next_pool_capacity(self.sets_per_pool);
        Ok(pool)
    }
}

/// Whether an allocation error means "try another pool".
pub fn is_pool_exhausted(error: &RhiError) -> bool {
    matches!(
        error.vk_result(),
        Some(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL)
    )
}

/// Descriptor counts for a pool holding `max_sets` sets.
pub fn pool_sizes(
    ratios: &[(vk::DescriptorType, f32)],
    max_sets: u32,
) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|&(ty, ratio)| vk::DescriptorPoolSize {
            ty,
            descriptor_count: ((ratio * max_sets as f32) as u32).max(1),
        })
        .collect()
}

fn next_pool_capacity(current: u32) -> u32 {
    (current + current / 2).min(MAX_SETS_PER_POOL)
}

/// Writes buffer descriptors to `set`.
pub fn write_buffer(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    info: &vk::DescriptorBufferInfo,
) {
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(ty)
        .buffer_info(std::slice::from_ref(info));

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

/// Layout binding helpers.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    #[inline]
    pub fn storage_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    fn single(
        binding: u32,
        ty: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_builder() {
        let binding = DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);

        let binding =
            DescriptorBindingBuilder::combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 2);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_pool_sizes_scale_with_sets() {
        let sizes = pool_sizes(
            &[
                (vk::DescriptorType::UNIFORM_BUFFER, 2.0),
                (vk::DescriptorType::STORAGE_IMAGE, 0.01),
            ],
            16,
        );
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].descriptor_count, 32);
        // Never zero, which Vulkan rejects
        assert_eq!(sizes[1].descriptor_count, 1);
    }

    #[test]
    fn test_pool_growth_is_capped() {
        assert_eq!(next_pool_capacity(16), 24);
        assert_eq!(next_pool_capacity(4000), MAX_SETS_PER_POOL);
    }

    #[test]
    fn test_pool_exhaustion_errors() {
        assert!(is_pool_exhausted(&vk::Result::ERROR_OUT_OF_POOL_MEMORY.into()));
        assert!(is_pool_exhausted(&vk::Result::ERROR_FRAGMENTED_POOL.into()));
        assert!(!is_pool_exhausted(&vk::Result::ERROR_OUT_OF_HOST_MEMORY.into()));
    }
}
