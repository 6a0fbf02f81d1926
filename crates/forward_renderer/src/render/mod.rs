//! Rendering layer
//!
//! The frame orchestration and resource ingestion surface, sitting on the
//! Vulkan backend in [`vulkan`].

/// Per-frame data contracts.
pub mod frame_data;
/// Frame orchestration.
pub mod renderer;
/// Load-time resource ingestion.
pub mod uploader;
/// Vulkan backend.
pub mod vulkan;
/// Window management.
pub mod window;

pub use frame_data::{MeshPushConstants, SceneUniforms};
pub use renderer::FrameRenderer;
pub use uploader::{RenderMesh, ResourceUploader};
pub use window::{Window, WindowError, WindowEvent};
