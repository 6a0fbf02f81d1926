//! Synchronization primitives for the frame loop
//!
//! RAII wrappers over semaphores and fences, plus the per-frame bundle the
//! renderer cycles through.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Number of frames the CPU may run ahead of the GPU.
///
/// Kept at one on purpose: a single semaphore pair plus one fence. The
/// renderer targets load-once scenes where per-frame CPU work is trivial
/// next to the GPU work, so a deeper pipeline buys little and would cost a
/// command buffer, uniform slice, and sync bundle per extra frame. The fence
/// in [`FrameSync`] is what enforces the cap.
pub const MAX_FRAMES_IN_FLIGHT: usize = 1;

/// Binary semaphore with RAII cleanup (GPU-GPU ordering).
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new unsignaled semaphore.
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle.
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence with RAII cleanup (CPU-GPU ordering).
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled.
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Block until the fence signals.
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset the fence to unsignaled.
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle.
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization bundle for one in-flight frame.
///
/// `image_available` gates command submission on swapchain image acquisition,
/// `render_finished` gates presentation on submitted work, and `in_flight`
/// lets the CPU wait for the frame's command buffer to retire before reusing
/// it.
pub struct FrameSync {
    /// Signaled by acquire, waited by submit.
    pub image_available: Semaphore,
    /// Signaled by submit, waited by present.
    pub render_finished: Semaphore,
    /// Signaled when the frame's command buffer retires.
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the semaphore pair and an initially-signaled fence.
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
