//! Load-time resource ingestion
//!
//! Turns CPU-side mesh and pixel payloads into GPU-resident resources. All
//! uploads on this path block on queue idle; that is the intended load-time
//! behavior, not a frame-loop facility.

use ash::vk;
use nalgebra::Matrix4;

use crate::assets::{ImageData, MeshData, SamplerDesc};
use crate::render::frame_data::SceneUniforms;
use crate::render::vulkan::buffer::{IndexBuffer, UniformBuffer, VertexBuffer};
use crate::render::vulkan::context::DeviceContext;
use crate::render::vulkan::descriptor::{self, DescriptorSetLayout};
use crate::render::vulkan::image::Texture;
use crate::render::vulkan::VulkanResult;

/// A mesh living on the GPU, ready to record draws against.
pub struct RenderMesh {
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
    texture: Texture,
    descriptor_set: vk::DescriptorSet,
    /// Model transform, pushed per draw; the caller updates it freely.
    pub model: Matrix4<f32>,
}

impl RenderMesh {
    /// Get the vertex buffer.
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertex_buffer
    }

    /// Get the index buffer.
    pub fn index_buffer(&self) -> &IndexBuffer {
        &self.index_buffer
    }

    /// Get the texture.
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Get the descriptor set binding this mesh's resources.
    ///
    /// Allocated from the shared pool; it is reclaimed only by a pool-wide
    /// reset at teardown, never freed individually.
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

/// Turns ingestion payloads into [`RenderMesh`]es against one device context.
pub struct ResourceUploader<'a> {
    context: &'a DeviceContext,
    max_anisotropy: f32,
}

impl<'a> ResourceUploader<'a> {
    /// Create an uploader for the context.
    pub fn new(context: &'a DeviceContext, max_anisotropy: f32) -> Self {
        let limit = context
            .physical_device()
            .properties
            .limits
            .max_sampler_anisotropy;
        Self {
            context,
            max_anisotropy: max_anisotropy.min(limit),
        }
    }

    /// Upload a mesh and its texture, and bind them into a descriptor set.
    ///
    /// Fails with an `InvalidData` error on degenerate payloads and with a
    /// pool or memory error when the static sizing tables are too small;
    /// neither is retried.
    pub fn upload_mesh(
        &self,
        layout: &DescriptorSetLayout,
        scene_uniforms: &UniformBuffer<SceneUniforms>,
        mesh: &MeshData,
        image: &ImageData,
        sampler: &SamplerDesc,
    ) -> VulkanResult<RenderMesh> {
        let device = self.context.raw_device();
        let memory_properties = self.context.memory_properties();

        log::info!(
            "uploading mesh: {} vertices, {} indices, {}x{} texture",
            mesh.vertices.len(),
            mesh.indices.len(),
            image.width,
            image.height
        );

        let vertex_buffer = VertexBuffer::new(
            device.clone(),
            memory_properties,
            self.context.command_pool(),
            self.context.graphics_queue(),
            &mesh.vertices,
        )?;
        let index_buffer = IndexBuffer::new(
            device.clone(),
            memory_properties,
            self.context.command_pool(),
            self.context.graphics_queue(),
            &mesh.indices,
        )?;

        let texture = self.upload_texture(image, sampler)?;

        let descriptor_set = self.context.descriptor_pool().allocate(layout)?;
        descriptor::write_uniform_and_sampler(
            &device,
            descriptor_set,
            scene_uniforms.handle(),
            scene_uniforms.size(),
            texture.image_view(),
            texture.sampler(),
        );

        Ok(RenderMesh {
            vertex_buffer,
            index_buffer,
            texture,
            descriptor_set,
            model: Matrix4::identity(),
        })
    }

    /// Upload a pixel payload into a mip-mapped, sampled texture.
    pub fn upload_texture(
        &self,
        image: &ImageData,
        sampler: &SamplerDesc,
    ) -> VulkanResult<Texture> {
        let format_properties = self.context.format_properties(vk::Format::R8G8B8A8_UNORM);
        Texture::from_image_data(
            self.context.raw_device(),
            self.context.memory_properties(),
            format_properties,
            self.context.command_pool(),
            self.context.graphics_queue(),
            image,
            sampler,
            self.max_anisotropy,
        )
    }
}
