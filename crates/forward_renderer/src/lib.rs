//! A thin forward-pass 3D renderer over explicit Vulkan.
//!
//! The crate owns device and surface negotiation, swapchain lifecycle,
//! GPU-memory-backed resource creation, texture upload with mip-chain
//! generation, and the per-frame submit/present cycle. Scene content,
//! asset parsing, input handling, and camera logic stay with the caller:
//! they hand over CPU-side payloads ([`assets`]) and per-frame matrices
//! ([`render::frame_data`]) and get a presented image per tick.
//!
//! The CPU runs at most one frame ahead of the GPU
//! ([`render::vulkan::MAX_FRAMES_IN_FLIGHT`]); the two designed blocking
//! points are load-time uploads and swapchain recreation.

/// CPU-side ingestion contract.
pub mod assets;
/// Renderer configuration.
pub mod config;
/// Rendering layer.
pub mod render;

pub use config::{RendererConfig, ShaderConfig};
pub use render::vulkan::{DeviceContext, VulkanError, VulkanResult};
pub use render::{
    FrameRenderer, MeshPushConstants, RenderMesh, ResourceUploader, SceneUniforms, Window,
    WindowEvent,
};
