//! CPU-side ingestion contract
//!
//! The mesh/texture loading collaborator hands these payloads over; the
//! renderer turns them into GPU-resident resources and never interprets the
//! on-disk asset format itself.

use bytemuck::{Pod, Zeroable};

/// One vertex record as the ingestion collaborator supplies it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Primary texture coordinates.
    pub uv0: [f32; 2],
    /// Secondary texture coordinates.
    pub uv1: [f32; 2],
}

/// Ordered vertex and index arrays for one mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Vertex records.
    pub vertices: Vec<Vertex>,
    /// 32-bit triangle indices.
    pub indices: Vec<u32>,
}

/// Raw pixel payload plus its dimensions.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Channels per pixel, 1 through 4.
    pub channel_count: u32,
    /// Tightly packed pixel bytes, row-major.
    pub bytes: Vec<u8>,
}

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    /// Nearest-texel sampling.
    Nearest,
    /// Linear interpolation.
    #[default]
    Linear,
}

/// Texture coordinate wrapping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    /// Tile the texture.
    #[default]
    Repeat,
    /// Tile with mirroring.
    MirroredRepeat,
    /// Clamp to the edge texel.
    ClampToEdge,
    /// Clamp to the border color.
    ClampToBorder,
}

/// Sampler parameters supplied alongside a pixel payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerDesc {
    /// Magnification filter.
    pub mag_filter: Filter,
    /// Minification filter.
    pub min_filter: Filter,
    /// Wrapping along U.
    pub address_mode_u: AddressMode,
    /// Wrapping along V.
    pub address_mode_v: AddressMode,
    /// Wrapping along W.
    pub address_mode_w: AddressMode,
}
