//! Device context: instance, adapter selection, logical device, shared pools
//!
//! Everything else in the renderer is scoped to the [`DeviceContext`]; no
//! GPU resource may outlive it.

#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use thiserror::Error;

use crate::config::{RendererConfig, DESCRIPTOR_POOL_SIZES, MAX_DESCRIPTOR_SETS};
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::descriptor::DescriptorPool;
use crate::render::window::Window;

/// Vulkan-layer error types.
#[derive(Error, Debug)]
pub enum VulkanError {
    /// Raw API error with its result code.
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// No enumerated adapter satisfied the suitability checks.
    #[error("no suitable GPU adapter found")]
    NoSuitableAdapter,

    /// The windowing collaborator could not bind a surface.
    #[error("surface creation failed: {0}")]
    SurfaceCreationFailed(String),

    /// Logical device creation failed at the API level.
    #[error("device creation failed: {0:?}")]
    DeviceCreationFailed(vk::Result),

    /// No memory type satisfies both the resource and property constraints.
    #[error("no compatible memory type")]
    NoCompatibleMemoryType,

    /// The fixed descriptor pool ran out of capacity.
    #[error("descriptor pool exhausted: {0}")]
    DescriptorPoolExhausted(String),

    /// An ingested payload failed validation.
    #[error("invalid resource data: {0}")]
    InvalidData(String),

    /// An operation was attempted in an illegal state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Initialization failed outside a specific API call.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
}

/// Result alias for Vulkan operations.
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Vulkan instance wrapper with RAII cleanup.
pub struct VulkanInstance {
    /// Loaded entry points.
    pub entry: Entry,
    /// Instance handle.
    pub instance: Instance,
    #[cfg(debug_assertions)]
    debug_utils: Option<DebugUtils>,
    #[cfg(debug_assertions)]
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create the instance with the window's required extensions.
    ///
    /// Debug builds add the validation layer and a debug-utils messenger
    /// routed into the `log` crate.
    pub fn new(window: &Window, app_name: &str) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| {
            VulkanError::InitializationFailed(format!("failed to load Vulkan: {e:?}"))
        })?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("app name contains NUL".to_string()))?;
        let engine_name_cstr = CString::new("forward_renderer").expect("static name");
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window.required_instance_extensions().map_err(|e| {
            VulkanError::InitializationFailed(format!("failed to query extensions: {e}"))
        })?;
        let cstr_extensions: Vec<CString> = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()).expect("extension name"))
            .collect();

        #[allow(unused_mut)]
        let mut extensions: Vec<*const i8> =
            cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        #[cfg(debug_assertions)]
        extensions.push(DebugUtils::name().as_ptr());

        let layer_names: Vec<CString> = if cfg!(debug_assertions) {
            vec![CString::new("VK_LAYER_KHRONOS_validation").expect("static name")]
        } else {
            vec![]
        };
        let layer_name_ptrs: Vec<*const i8> =
            layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_name_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::create_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(messenger))
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn create_debug_messenger(
        debug_utils: &DebugUtils,
    ) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(messenger)) =
                (&self.debug_utils, &self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Validation-layer callback: a structured log sink, never control flow.
///
/// A message here signals a programming defect; it is logged and the frame
/// proceeds.
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[vulkan] {message_type:?} - {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("[vulkan] {message_type:?} - {message}");
    } else {
        log::debug!("[vulkan] {message_type:?} - {message}");
    }

    vk::FALSE
}

/// A selected adapter and its queried properties.
pub struct PhysicalDeviceInfo {
    /// Adapter handle.
    pub device: vk::PhysicalDevice,
    /// Device properties and limits.
    pub properties: vk::PhysicalDeviceProperties,
    /// Graphics queue family index.
    pub graphics_family: u32,
    /// Present queue family index.
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Pick the first suitable adapter in enumeration order.
    ///
    /// Suitable means: graphics and present queue families exist for the
    /// surface, the swapchain extension is supported, the surface reports at
    /// least one format and one present mode, and anisotropic sampling is
    /// available. No scoring beyond that.
    pub fn select(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &SurfaceLoader,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            match Self::evaluate(instance, device, surface, surface_loader) {
                Ok(Some(info)) => {
                    log::info!("selected GPU: {}", unsafe {
                        CStr::from_ptr(info.properties.device_name.as_ptr()).to_string_lossy()
                    });
                    return Ok(info);
                }
                Ok(None) => {}
                Err(e) => return Err(e),
            }
        }

        Err(VulkanError::NoSuitableAdapter)
    }

    fn evaluate(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &SurfaceLoader,
    ) -> VulkanResult<Option<Self>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }
        let (Some(graphics_family), Some(present_family)) = (graphics_family, present_family)
        else {
            return Ok(None);
        };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Ok(None);
        }

        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };
        if formats.is_empty() || present_modes.is_empty() {
            return Ok(None);
        }

        if features.sampler_anisotropy != vk::TRUE {
            return Ok(None);
        }

        Ok(Some(Self {
            device,
            properties,
            graphics_family,
            present_family,
        }))
    }
}

/// Logical device with its queues and swapchain loader, RAII cleanup.
pub struct LogicalDevice {
    /// Device handle.
    pub device: Device,
    /// Graphics queue.
    pub graphics_queue: vk::Queue,
    /// Present queue.
    pub present_queue: vk::Queue,
    /// Swapchain extension loader.
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Open the device with one queue per unique family.
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: std::collections::HashSet<u32> = [
            physical_device.graphics_family,
            physical_device.present_family,
        ]
        .into_iter()
        .collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::DeviceCreationFailed)?
        };

        let graphics_queue =
            unsafe { device.get_device_queue(physical_device.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device.present_family, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Owner of the instance, adapter, device, queues, and shared pools.
///
/// Exactly one per process. Field order matters: pools drop before the
/// logical device, which drops before the instance.
pub struct DeviceContext {
    descriptor_pool: DescriptorPool,
    command_pool: CommandPool,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    surface: vk::SurfaceKHR,
    surface_loader: SurfaceLoader,
    instance: VulkanInstance,
}

impl DeviceContext {
    /// Negotiate the device and create the process-lifetime pools.
    pub fn new(window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, &config.app_name)?;

        let surface_loader = SurfaceLoader::new(&instance.entry, &instance.instance);
        let surface = window
            .create_surface(instance.instance.handle())
            .map_err(|e| VulkanError::SurfaceCreationFailed(e.to_string()))?;

        let physical_device =
            PhysicalDeviceInfo::select(&instance.instance, surface, &surface_loader)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;

        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical_device.device)
        };

        let command_pool =
            CommandPool::new(device.device.clone(), physical_device.graphics_family)?;
        let descriptor_pool = DescriptorPool::new(
            device.device.clone(),
            MAX_DESCRIPTOR_SETS,
            DESCRIPTOR_POOL_SIZES,
        )?;

        Ok(Self {
            descriptor_pool,
            command_pool,
            device,
            physical_device,
            memory_properties,
            surface,
            surface_loader,
            instance,
        })
    }

    /// Get the logical device handle (cloned; ash devices are refcounted
    /// function tables).
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the logical device wrapper.
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Get the selected adapter info.
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the adapter's memory heap layout (queried once at creation).
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Query format properties for the adapter.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical_device.device, format)
        }
    }

    /// Get the surface handle (owned by the windowing side, referenced here).
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader.
    pub fn surface_loader(&self) -> &SurfaceLoader {
        &self.surface_loader
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the shared transient command pool.
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    /// Get the shared fixed-capacity descriptor pool.
    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    /// Block until all submitted GPU work retires.
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .device
                .device_wait_idle()
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        // In-flight work must retire before anything it references dies.
        let _ = self.wait_idle();
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
        // Remaining fields drop in declaration order: pools, device, instance.
    }
}
