//! Vulkan backend
//!
//! Low-level wrappers over the explicit API. Every resource type here owns
//! its handles and releases them on drop; bare handles only cross function
//! boundaries as borrowed parameters.

/// Buffer resources and the staged upload path.
pub mod buffer;
/// Command pool and one-time submission.
pub mod commands;
/// Instance, adapter selection, logical device, shared pools.
pub mod context;
/// Descriptor layouts, the fixed-capacity pool, and set writes.
pub mod descriptor;
/// Framebuffers and the depth buffer.
pub mod framebuffer;
/// Image resources and mip-chain generation.
pub mod image;
/// Memory-type selection.
pub mod memory;
/// The forward render pass.
pub mod render_pass;
/// Shader modules and the graphics pipeline.
pub mod shader;
/// Swapchain creation and recreation.
pub mod swapchain;
/// Frame synchronization primitives.
pub mod sync;
/// Vertex input layout.
pub mod vertex_layout;

pub use context::{
    DeviceContext, LogicalDevice, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult,
};
pub use sync::MAX_FRAMES_IN_FLIGHT;
