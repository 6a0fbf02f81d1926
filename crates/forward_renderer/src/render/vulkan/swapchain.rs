//! Swapchain creation and recreation
//!
//! Format, present mode, and extent selection are split out as pure helpers;
//! the wrapper owns the swapchain handle and its per-image views and can be
//! rebuilt without disturbing the device context.

use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::{vk, Device};

use crate::render::vulkan::context::PhysicalDeviceInfo;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Preferred surface format: BGRA8 unorm in the sRGB color space.
const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the surface format, preferring the BGRA8/sRGB pair.
///
/// Falls back to the first advertised format; the adapter suitability check
/// guarantees the list is non-empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|sf| {
            sf.format == PREFERRED_FORMAT.format && sf.color_space == PREFERRED_FORMAT.color_space
        })
        .copied()
        .unwrap_or(formats[0])
}

/// Pick the present mode, preferring low-latency MAILBOX over FIFO.
///
/// FIFO is the only mode the API guarantees, so it is the fallback.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Resolve the swapchain extent from the surface capabilities.
///
/// When the surface reports a fixed extent that wins; otherwise the request
/// is clamped into the reported min/max range.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    requested: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: requested.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: requested.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Pick the image count: one above the minimum, respecting the maximum.
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Swapchain with its images and views, RAII cleanup.
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the surface.
    pub fn new(
        swapchain_loader: SwapchainLoader,
        device: Device,
        surface: vk::SurfaceKHR,
        surface_loader: &SurfaceLoader,
        physical_device: &PhysicalDeviceInfo,
        requested_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        Self::build(
            swapchain_loader,
            device,
            surface,
            surface_loader,
            physical_device,
            requested_extent,
            vk::SwapchainKHR::null(),
        )
    }

    /// Rebuild in place after an out-of-date or resize signal.
    ///
    /// The caller must have waited for the device to go idle first; the old
    /// swapchain handle is passed through so the driver can recycle its
    /// images, then the retired views and swapchain are destroyed.
    pub fn recreate(
        &mut self,
        surface: vk::SurfaceKHR,
        surface_loader: &SurfaceLoader,
        physical_device: &PhysicalDeviceInfo,
        requested_extent: vk::Extent2D,
    ) -> VulkanResult<()> {
        let replacement = Self::build(
            self.swapchain_loader.clone(),
            self.device.clone(),
            surface,
            surface_loader,
            physical_device,
            requested_extent,
            self.swapchain,
        )?;
        // The retired swapchain drops here, after its successor exists.
        let _retired = std::mem::replace(self, replacement);
        Ok(())
    }

    fn build(
        swapchain_loader: SwapchainLoader,
        device: Device,
        surface: vk::SurfaceKHR,
        surface_loader: &SurfaceLoader,
        physical_device: &PhysicalDeviceInfo,
        requested_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device.device, surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device.device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device.device, surface)
                .map_err(VulkanError::Api)?
        };

        let format = choose_surface_format(&formats);
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&capabilities, requested_extent);
        let image_count = choose_image_count(&capabilities);

        log::debug!(
            "swapchain: {:?}/{:?}, {:?}, {}x{}, {} images",
            format.format,
            format.color_space,
            present_mode,
            extent.width,
            extent.height,
            image_count
        );

        let queue_family_indices = [
            physical_device.graphics_family,
            physical_device.present_family,
        ];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // Distinct graphics/present families need concurrent image access.
        create_info = if physical_device.graphics_family == physical_device.present_family {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        };

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let image_views: Result<Vec<_>, _> = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                unsafe { device.create_image_view(&view_info, None) }
            })
            .collect();
        let image_views = image_views.map_err(VulkanError::Api)?;

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Get the swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get the loader used for acquire/present calls.
    pub fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Get the chosen surface format.
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get the swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the per-image views.
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get the number of presentable images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_bgra8_srgb_pair() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn sole_advertised_pair_is_selected() {
        // A surface with exactly one format and FIFO only: no alternatives,
        // the selection must land on them.
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let modes = [vk::PresentModeKHR::FIFO];

        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, formats[0].format);
        assert_eq!(chosen.color_space, formats[0].color_space);
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R16G16B16A16_SFLOAT,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, formats[0].format);
        assert_eq!(chosen.color_space, formats[0].color_space);
    }

    #[test]
    fn prefers_mailbox_when_available() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let requested = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert_eq!(choose_extent(&capabilities, requested).width, 800);
    }

    #[test]
    fn requested_extent_is_clamped_to_surface_bounds() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1600,
                height: 900,
            },
            ..Default::default()
        };

        let oversized = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 4000,
                height: 50,
            },
        );
        assert_eq!(oversized.width, 1600);
        assert_eq!(oversized.height, 100);
    }

    #[test]
    fn image_count_respects_maximum() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capped), 2);

        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&unbounded), 3);
    }
}
