//! Descriptor set layouts, the shared fixed-capacity pool, and set writes
//!
//! The pool is sized once from the static configuration table and lives as
//! long as the device context. Sets are never freed individually on the
//! common path; capacity bookkeeping happens CPU-side so exhaustion fails
//! loudly at load time instead of surfacing as a driver error.

use ash::{vk, Device};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Builder for descriptor set layouts.
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Start an empty layout.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a uniform buffer binding.
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a combined image sampler binding.
    pub fn add_combined_image_sampler(
        mut self,
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Create the layout on the device.
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(DescriptorSetLayout {
            device: device.clone(),
            layout,
            bindings: self.bindings,
        })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout with RAII cleanup.
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the layout handle.
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Per-type descriptor counts one set of this layout consumes.
    fn demand(&self) -> HashMap<vk::DescriptorType, u32> {
        let mut demand = HashMap::new();
        for binding in &self.bindings {
            *demand.entry(binding.descriptor_type).or_insert(0) += binding.descriptor_count;
        }
        demand
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// CPU-side remaining-capacity ledger for the pool.
///
/// Split out so the accounting rules are testable without a device.
#[derive(Debug, Clone)]
struct PoolLedger {
    remaining_sets: u32,
    remaining: HashMap<vk::DescriptorType, u32>,
    initial_sets: u32,
    initial: HashMap<vk::DescriptorType, u32>,
}

impl PoolLedger {
    fn new(max_sets: u32, sizes: &[(vk::DescriptorType, u32)]) -> Self {
        let mut initial = HashMap::new();
        for &(descriptor_type, count) in sizes {
            *initial.entry(descriptor_type).or_insert(0) += count;
        }
        Self {
            remaining_sets: max_sets,
            remaining: initial.clone(),
            initial_sets: max_sets,
            initial,
        }
    }

    /// Reserve capacity for one set, or report which type ran dry.
    fn reserve(&mut self, demand: &HashMap<vk::DescriptorType, u32>) -> VulkanResult<()> {
        if self.remaining_sets == 0 {
            return Err(VulkanError::DescriptorPoolExhausted(
                "descriptor set budget spent".to_string(),
            ));
        }
        for (&descriptor_type, &count) in demand {
            let available = self.remaining.get(&descriptor_type).copied().unwrap_or(0);
            if available < count {
                return Err(VulkanError::DescriptorPoolExhausted(format!(
                    "{descriptor_type:?} capacity spent ({available} left, {count} needed)"
                )));
            }
        }
        self.remaining_sets -= 1;
        for (&descriptor_type, &count) in demand {
            if let Some(available) = self.remaining.get_mut(&descriptor_type) {
                *available -= count;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.remaining_sets = self.initial_sets;
        self.remaining = self.initial.clone();
    }
}

/// Fixed-capacity descriptor pool with RAII cleanup.
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
    ledger: RefCell<PoolLedger>,
}

impl DescriptorPool {
    /// Create the pool from a static sizing table.
    pub fn new(
        device: Device,
        max_sets: u32,
        sizes: &[(vk::DescriptorType, u32)],
    ) -> VulkanResult<Self> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = sizes
            .iter()
            .map(|&(descriptor_type, count)| vk::DescriptorPoolSize {
                ty: descriptor_type,
                descriptor_count: count,
            })
            .collect();

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(max_sets);

        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            pool,
            ledger: RefCell::new(PoolLedger::new(max_sets, sizes)),
        })
    }

    /// Allocate one set of the given layout.
    ///
    /// Capacity is checked against the ledger before the API call; running
    /// out is a sizing defect in the static table, so it surfaces as
    /// [`VulkanError::DescriptorPoolExhausted`] rather than being retried.
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        self.ledger.borrow_mut().reserve(&layout.demand())?;

        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)?
        };
        Ok(sets[0])
    }

    /// Reset the whole pool, invalidating every allocated set.
    ///
    /// This is the only way sets return to the pool; teardown-time use only.
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }
        self.ledger.borrow_mut().reset();
        Ok(())
    }

    /// Get the pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Point a set's bindings at a uniform buffer and a sampled texture.
pub fn write_uniform_and_sampler(
    device: &Device,
    set: vk::DescriptorSet,
    buffer: vk::Buffer,
    buffer_range: vk::DeviceSize,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let buffer_info = [vk::DescriptorBufferInfo {
        buffer,
        offset: 0,
        range: buffer_range,
    }];
    let image_info = [vk::DescriptorImageInfo {
        sampler,
        image_view,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }];

    let writes = [
        vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info)
            .build(),
        vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build(),
    ];

    unsafe {
        device.update_descriptor_sets(&writes, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_demand(count: u32) -> HashMap<vk::DescriptorType, u32> {
        HashMap::from([(vk::DescriptorType::UNIFORM_BUFFER, count)])
    }

    #[test]
    fn ledger_spends_and_exhausts_sets() {
        let mut ledger = PoolLedger::new(2, &[(vk::DescriptorType::UNIFORM_BUFFER, 8)]);

        assert!(ledger.reserve(&uniform_demand(1)).is_ok());
        assert!(ledger.reserve(&uniform_demand(1)).is_ok());
        let err = ledger.reserve(&uniform_demand(1)).unwrap_err();
        assert!(matches!(err, VulkanError::DescriptorPoolExhausted(_)));
    }

    #[test]
    fn ledger_exhausts_per_type_capacity() {
        let mut ledger = PoolLedger::new(10, &[(vk::DescriptorType::UNIFORM_BUFFER, 3)]);

        assert!(ledger.reserve(&uniform_demand(2)).is_ok());
        // 1 left, 2 needed: fails without touching the set budget.
        assert!(ledger.reserve(&uniform_demand(2)).is_err());
        assert_eq!(ledger.remaining_sets, 9);
        assert!(ledger.reserve(&uniform_demand(1)).is_ok());
    }

    #[test]
    fn ledger_rejects_types_missing_from_table() {
        let mut ledger = PoolLedger::new(4, &[(vk::DescriptorType::UNIFORM_BUFFER, 4)]);

        let demand = HashMap::from([(vk::DescriptorType::STORAGE_BUFFER, 1)]);
        assert!(ledger.reserve(&demand).is_err());
    }

    #[test]
    fn reset_restores_full_capacity() {
        let mut ledger = PoolLedger::new(1, &[(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1)]);
        let demand = HashMap::from([(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1)]);

        assert!(ledger.reserve(&demand).is_ok());
        assert!(ledger.reserve(&demand).is_err());

        ledger.reset();
        assert!(ledger.reserve(&demand).is_ok());
    }
}
