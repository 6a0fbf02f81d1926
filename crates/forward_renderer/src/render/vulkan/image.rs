//! Image resources and the mip-chain generation protocol
//!
//! A texture owns its image, backing memory, view, and sampler. Mip levels
//! are produced by a sequential blit-down chain; every blit is fenced by
//! explicit layout transitions, and the interleave is recorded through the
//! [`BlitEncoder`] seam so its ordering can be checked without a device.

use ash::{vk, Device};

use crate::assets::{AddressMode, Filter, ImageData, SamplerDesc};
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::commands::{CommandPool, OneTimeCommands};
use crate::render::vulkan::memory;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Number of mip levels for a base extent: `floor(log2(max(w, h))) + 1`.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    (f64::from(width.max(height)).log2().floor() as u32) + 1
}

/// Stage/access masks for the layout transitions the mip pipeline performs.
///
/// The image layout is a finite-state value per level; only these edges are
/// legal here: Undefined → TransferDst → TransferSrc → ShaderReadOnly.
fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VulkanResult<(
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
    vk::AccessFlags,
    vk::AccessFlags,
)> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL) => Ok((
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        )),
        (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
        )),
        _ => Err(VulkanError::InvalidOperation(format!(
            "illegal image layout transition {old:?} -> {new:?}"
        ))),
    }
}

/// Recording surface for the mip pipeline.
///
/// The real implementation writes barriers and blits into a command buffer;
/// tests substitute a recorder that captures the sequence.
pub trait BlitEncoder {
    /// Transition `level_count` levels starting at `base_level`.
    fn transition_levels(
        &mut self,
        base_level: u32,
        level_count: u32,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()>;

    /// Blit one full level into another with linear filtering.
    fn blit_level(
        &mut self,
        src_level: u32,
        dst_level: u32,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    );
}

/// Extent of a given mip level (right-shift, clamped to 1).
fn level_extent(base: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: (base.width >> level).max(1),
        height: (base.height >> level).max(1),
    }
}

/// Record the blit-down chain for levels 1..`mip_levels`.
///
/// Precondition: level 0 is in TRANSFER_SRC_OPTIMAL (the upload path leaves
/// it there). For each level i: transition i to TRANSFER_DST, blit i-1 into
/// i, transition i to TRANSFER_SRC. The pairs must not be reordered; a blit
/// into a level whose predecessor has not reached TRANSFER_SRC is undefined
/// behavior on the GPU side. One final whole-range transition moves every
/// level to SHADER_READ_ONLY.
pub fn record_mip_chain(
    encoder: &mut impl BlitEncoder,
    base_extent: vk::Extent2D,
    mip_levels: u32,
) -> VulkanResult<()> {
    for level in 1..mip_levels {
        encoder.transition_levels(
            level,
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        encoder.blit_level(
            level - 1,
            level,
            level_extent(base_extent, level - 1),
            level_extent(base_extent, level),
        );

        encoder.transition_levels(
            level,
            1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )?;
    }

    encoder.transition_levels(
        0,
        mip_levels,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )
}

/// [`BlitEncoder`] writing into a live command buffer.
struct AshBlitEncoder<'a> {
    device: &'a Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
}

impl BlitEncoder for AshBlitEncoder<'_> {
    fn transition_levels(
        &mut self,
        base_level: u32,
        level_count: u32,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let (src_stage, dst_stage, src_access, dst_access) = transition_masks(old, new)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: base_level,
                level_count,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }
        Ok(())
    }

    fn blit_level(
        &mut self,
        src_level: u32,
        dst_level: u32,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    ) {
        let blit = vk::ImageBlit::builder()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: src_level,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: src_extent.width as i32,
                    y: src_extent.height as i32,
                    z: 1,
                },
            ])
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: dst_level,
                base_array_layer: 0,
                layer_count: 1,
            })
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst_extent.width as i32,
                    y: dst_extent.height as i32,
                    z: 1,
                },
            ]);

        unsafe {
            self.device.cmd_blit_image(
                self.command_buffer,
                self.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit.build()],
                vk::Filter::LINEAR,
            );
        }
    }
}

/// Expand an ingested pixel payload to tightly packed RGBA8.
///
/// Payloads with fewer than four channels get alpha 255; four-channel
/// payloads are copied through. Channel counts outside 1..=4 and undersized
/// buffers are creation errors.
pub fn expand_to_rgba(
    bytes: &[u8],
    width: u32,
    height: u32,
    channel_count: u32,
) -> VulkanResult<Vec<u8>> {
    if !(1..=4).contains(&channel_count) {
        return Err(VulkanError::InvalidData(format!(
            "unsupported channel count {channel_count}"
        )));
    }
    let pixel_count = (width as usize) * (height as usize);
    if pixel_count == 0 {
        return Err(VulkanError::InvalidData(
            "image has a zero-sized extent".to_string(),
        ));
    }
    let expected = pixel_count * channel_count as usize;
    if bytes.len() < expected {
        return Err(VulkanError::InvalidData(format!(
            "pixel payload holds {} bytes, {} expected",
            bytes.len(),
            expected
        )));
    }

    let mut rgba = vec![255u8; pixel_count * 4];
    let channels = channel_count as usize;
    for pixel in 0..pixel_count {
        let src = &bytes[pixel * channels..pixel * channels + channels];
        rgba[pixel * 4..pixel * 4 + channels].copy_from_slice(src);
    }
    Ok(rgba)
}

fn vk_filter(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

fn vk_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

/// Sampled 2D texture with a full mip chain.
pub struct Texture {
    device: Device,
    image: vk::Image,
    image_memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Texture {
    /// Upload an ingested pixel payload and generate its mip chain.
    ///
    /// The caller supplies the format properties the adapter reported for
    /// `R8G8B8A8_UNORM`; blitting requires BLIT_SRC and BLIT_DST support
    /// under optimal tiling, and a format without them fails the load.
    pub fn from_image_data(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        format_properties: vk::FormatProperties,
        command_pool: &CommandPool,
        queue: vk::Queue,
        image_data: &ImageData,
        sampler_desc: &SamplerDesc,
        max_anisotropy: f32,
    ) -> VulkanResult<Self> {
        let format = vk::Format::R8G8B8A8_UNORM;
        if !format_properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::BLIT_SRC | vk::FormatFeatureFlags::BLIT_DST)
        {
            return Err(VulkanError::InvalidOperation(format!(
                "adapter cannot blit {format:?} under optimal tiling"
            )));
        }

        let rgba = expand_to_rgba(
            &image_data.bytes,
            image_data.width,
            image_data.height,
            image_data.channel_count,
        )?;

        let extent = vk::Extent2D {
            width: image_data.width,
            height: image_data.height,
        };
        let mip_levels = mip_level_count(extent.width, extent.height);
        log::debug!(
            "creating {}x{} texture with {} mip levels",
            extent.width,
            extent.height,
            mip_levels
        );

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(
                vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = memory::find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let image_memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };
        unsafe {
            device
                .bind_image_memory(image, image_memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Self::upload_base_level(
            &device,
            memory_properties,
            command_pool,
            queue,
            image,
            extent,
            &rgba,
        )?;

        // The upload left level 0 in TRANSFER_SRC; blit the chain down.
        let commands = OneTimeCommands::begin(&device, command_pool)?;
        let mut encoder = AshBlitEncoder {
            device: &device,
            command_buffer: commands.command_buffer(),
            image,
        };
        record_mip_chain(&mut encoder, extent, mip_levels)?;
        commands.submit_and_wait(queue)?;

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        let image_view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk_filter(sampler_desc.mag_filter))
            .min_filter(vk_filter(sampler_desc.min_filter))
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk_address_mode(sampler_desc.address_mode_u))
            .address_mode_v(vk_address_mode(sampler_desc.address_mode_v))
            .address_mode_w(vk_address_mode(sampler_desc.address_mode_w))
            .anisotropy_enable(true)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
            .compare_enable(false)
            .compare_op(vk::CompareOp::NEVER)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);
        let sampler = unsafe {
            device
                .create_sampler(&sampler_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            image,
            image_memory,
            image_view,
            sampler,
            extent,
            mip_levels,
        })
    }

    /// Stage the RGBA payload into mip level 0.
    ///
    /// Leaves the level in TRANSFER_SRC_OPTIMAL, ready to seed the chain.
    fn upload_base_level(
        device: &Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        command_pool: &CommandPool,
        queue: vk::Queue,
        image: vk::Image,
        extent: vk::Extent2D,
        rgba: &[u8],
    ) -> VulkanResult<()> {
        let staging = Buffer::new(
            device.clone(),
            memory_properties,
            rgba.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(rgba)?;

        let commands = OneTimeCommands::begin(device, command_pool)?;
        let mut encoder = AshBlitEncoder {
            device,
            command_buffer: commands.command_buffer(),
            image,
        };

        encoder.transition_levels(
            0,
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let region = vk::BufferImageCopy::builder()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        unsafe {
            device.cmd_copy_buffer_to_image(
                commands.command_buffer(),
                staging.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region.build()],
            );
        }

        encoder.transition_levels(
            0,
            1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )?;

        commands.submit_and_wait(queue)
    }

    /// Get the image view for descriptor writes.
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Get the sampler for descriptor writes.
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Get the base extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the mip level count.
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.image_view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.image_memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn mip_count_matches_log2_floor_plus_one() {
        assert_eq!(mip_level_count(512, 512), 10);
        assert_eq!(mip_level_count(300, 200), 9);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(1024, 1), 11);
        assert_eq!(mip_level_count(2, 2), 2);
    }

    #[test]
    fn level_extent_halves_and_clamps() {
        let base = vk::Extent2D {
            width: 300,
            height: 200,
        };
        assert_eq!(level_extent(base, 1).width, 150);
        assert_eq!(level_extent(base, 8).width, 1);
        assert_eq!(level_extent(base, 8).height, 1);
    }

    #[derive(Debug, PartialEq)]
    enum Op {
        Transition {
            base: u32,
            count: u32,
            old: vk::ImageLayout,
            new: vk::ImageLayout,
        },
        Blit {
            src: u32,
            dst: u32,
        },
    }

    /// Captures the recorded sequence and tracks per-level layout state.
    #[derive(Default)]
    struct MockEncoder {
        ops: Vec<Op>,
        layouts: HashMap<u32, vk::ImageLayout>,
    }

    impl BlitEncoder for MockEncoder {
        fn transition_levels(
            &mut self,
            base_level: u32,
            level_count: u32,
            old: vk::ImageLayout,
            new: vk::ImageLayout,
        ) -> VulkanResult<()> {
            transition_masks(old, new)?;
            for level in base_level..base_level + level_count {
                let current = *self
                    .layouts
                    .get(&level)
                    .unwrap_or(&vk::ImageLayout::UNDEFINED);
                assert_eq!(current, old, "transition from wrong layout on level {level}");
                self.layouts.insert(level, new);
            }
            self.ops.push(Op::Transition {
                base: base_level,
                count: level_count,
                old,
                new,
            });
            Ok(())
        }

        fn blit_level(
            &mut self,
            src_level: u32,
            dst_level: u32,
            _src_extent: vk::Extent2D,
            _dst_extent: vk::Extent2D,
        ) {
            assert_eq!(
                self.layouts.get(&src_level),
                Some(&vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                "blit source level {src_level} not transfer-source-ready"
            );
            assert_eq!(
                self.layouts.get(&dst_level),
                Some(&vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                "blit destination level {dst_level} not transfer-dst-ready"
            );
            self.ops.push(Op::Blit {
                src: src_level,
                dst: dst_level,
            });
        }
    }

    fn seeded_encoder() -> MockEncoder {
        // The upload path leaves level 0 transfer-source-ready.
        let mut encoder = MockEncoder::default();
        encoder
            .layouts
            .insert(0, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        encoder
    }

    #[test]
    fn mip_chain_blits_in_strict_level_order() {
        let mut encoder = seeded_encoder();
        let extent = vk::Extent2D {
            width: 16,
            height: 16,
        };

        record_mip_chain(&mut encoder, extent, 5).unwrap();

        let blits: Vec<(u32, u32)> = encoder
            .ops
            .iter()
            .filter_map(|op| match op {
                Op::Blit { src, dst } => Some((*src, *dst)),
                Op::Transition { .. } => None,
            })
            .collect();
        assert_eq!(blits, vec![(0, 1), (1, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn all_levels_end_shader_read_only() {
        let mut encoder = seeded_encoder();
        let extent = vk::Extent2D {
            width: 512,
            height: 512,
        };
        let levels = mip_level_count(extent.width, extent.height);

        record_mip_chain(&mut encoder, extent, levels).unwrap();

        for level in 0..levels {
            assert_eq!(
                encoder.layouts.get(&level),
                Some(&vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                "level {level} not shader-readable after the chain"
            );
        }
        // The whole-range transition is the final recorded command.
        assert!(matches!(
            encoder.ops.last(),
            Some(Op::Transition {
                base: 0,
                count,
                new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ..
            }) if *count == levels
        ));
    }

    #[test]
    fn single_level_image_skips_blits() {
        let mut encoder = seeded_encoder();
        let extent = vk::Extent2D {
            width: 1,
            height: 1,
        };

        record_mip_chain(&mut encoder, extent, 1).unwrap();

        assert!(encoder
            .ops
            .iter()
            .all(|op| matches!(op, Op::Transition { .. })));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let result = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(matches!(result, Err(VulkanError::InvalidOperation(_))));
    }

    #[test]
    fn rgba_expansion_fills_alpha() {
        let rgb = vec![10u8, 20, 30, 40, 50, 60];
        let rgba = expand_to_rgba(&rgb, 2, 1, 3).unwrap();
        assert_eq!(rgba, vec![10, 20, 30, 255, 40, 50, 60, 255]);

        let gray = vec![7u8];
        let rgba = expand_to_rgba(&gray, 1, 1, 1).unwrap();
        assert_eq!(rgba, vec![7, 255, 255, 255]);
    }

    #[test]
    fn rgba_expansion_passes_four_channels_through() {
        let src = vec![1u8, 2, 3, 4];
        assert_eq!(expand_to_rgba(&src, 1, 1, 4).unwrap(), src);
    }

    #[test]
    fn rgba_expansion_rejects_bad_payloads() {
        assert!(expand_to_rgba(&[0u8; 4], 1, 1, 5).is_err());
        assert!(expand_to_rgba(&[0u8; 2], 1, 1, 3).is_err());
        assert!(expand_to_rgba(&[], 0, 4, 1).is_err());
    }
}
