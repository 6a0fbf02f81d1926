//! Renderer configuration
//!
//! The serializable part comes from an optional TOML file; the descriptor
//! pool sizing lives in static tables read once at device-context creation.

use ash::vk;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Descriptor pool sizing table: {descriptor type -> max count}.
///
/// Exhausting any row is a load-time configuration defect, not a runtime
/// condition; the pool never grows.
pub const DESCRIPTOR_POOL_SIZES: &[(vk::DescriptorType, u32)] = &[
    (vk::DescriptorType::UNIFORM_BUFFER, 64),
    (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 64),
];

/// Upper bound on concurrently allocated descriptor sets.
pub const MAX_DESCRIPTOR_SETS: u32 = 64;

/// Static renderer settings, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Initial window width in pixels.
    pub window_width: u32,
    /// Initial window height in pixels.
    pub window_height: u32,
    /// Window and instance application name.
    pub app_name: String,
    /// Forward pass clear color (RGBA).
    pub clear_color: [f32; 4],
    /// Sampler anisotropy cap for textures.
    pub max_anisotropy: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            app_name: "forward_renderer".to_string(),
            clear_color: [0.05, 0.05, 0.08, 1.0],
            max_anisotropy: 8.0,
        }
    }
}

impl RendererConfig {
    /// Load from a TOML file; missing keys fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Load from a file if it exists, otherwise return defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(ConfigError::Io(_)) => Self::default(),
            Err(e) => {
                log::warn!("ignoring malformed config: {e}");
                Self::default()
            }
        }
    }
}

/// Shader file locations for the forward pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file.
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file.
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Probe common shader output locations for the given file names.
    ///
    /// Useful when the binary runs from different working directories; falls
    /// back to `shaders/<name>` when nothing is found.
    pub fn with_path_resolution(vertex_name: &str, fragment_name: &str) -> Self {
        let shader_dirs = ["target/shaders/", "shaders/", "../shaders/", "./"];

        let resolve = |name: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{dir}{name}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("shaders/{name}"))
        };

        Self {
            vertex_shader_path: resolve(vertex_name),
            fragment_shader_path: resolve(fragment_name),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("mesh.vert.spv", "mesh.frag.spv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_keys() {
        let config: RendererConfig = toml::from_str("window_width = 640").unwrap();
        assert_eq!(config.window_width, 640);
        assert_eq!(config.window_height, 720);
        assert_eq!(config.max_anisotropy, 8.0);
    }

    #[test]
    fn pool_table_covers_the_layout_types() {
        let types: Vec<_> = DESCRIPTOR_POOL_SIZES.iter().map(|&(t, _)| t).collect();
        assert!(types.contains(&vk::DescriptorType::UNIFORM_BUFFER));
        assert!(types.contains(&vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
    }
}
