//! Command pool and one-time command submission
//!
//! The shared transient pool lives as long as the device context; load-time
//! uploads borrow it through [`OneTimeCommands`].

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup.
///
/// Created TRANSIENT | RESET_COMMAND_BUFFER on the graphics family: per-frame
/// buffers are reset in place each tick and upload buffers are short-lived.
/// Not safe for concurrent recording; one pool serves the one producer
/// thread.
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool on the given queue family.
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let command_buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        Ok(command_buffers)
    }

    /// Get the command pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// One-shot command buffer for load-time work.
///
/// Begins recording on creation; [`submit_and_wait`](Self::submit_and_wait)
/// ends, submits, and blocks on queue idle. The blocking wait is the point:
/// staged uploads and mip generation are load-time operations, never
/// steady-state ones.
pub struct OneTimeCommands<'a> {
    device: &'a Device,
    pool: &'a CommandPool,
    command_buffer: vk::CommandBuffer,
}

impl<'a> OneTimeCommands<'a> {
    /// Allocate a command buffer from the pool and begin recording.
    pub fn begin(device: &'a Device, pool: &'a CommandPool) -> VulkanResult<Self> {
        let command_buffer = pool.allocate_command_buffers(1)?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            pool,
            command_buffer,
        })
    }

    /// Get the command buffer being recorded.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// End recording, submit to the queue, and wait for it to drain.
    pub fn submit_and_wait(self, queue: vk::Queue) -> VulkanResult<()> {
        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)?;
        }

        let command_buffers = [self.command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device
                .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device
                .queue_wait_idle(queue)
                .map_err(VulkanError::Api)?;
            self.device
                .free_command_buffers(self.pool.handle(), &command_buffers);
        }

        Ok(())
    }
}
