//! Staged-upload round-trip against a real device.
//!
//! These tests need a Vulkan driver and run headless (no surface), so they
//! are ignored by default: `cargo test -- --ignored` on a machine with a GPU.

use ash::{vk, Device, Entry, Instance};

use forward_renderer::render::vulkan::buffer::Buffer;
use forward_renderer::render::vulkan::commands::CommandPool;
use forward_renderer::render::vulkan::VulkanError;

struct HeadlessGpu {
    _entry: Entry,
    instance: Instance,
    device: Device,
    queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_family: u32,
}

impl HeadlessGpu {
    fn open() -> Option<Self> {
        let entry = unsafe { Entry::load().ok()? };
        let app_info = vk::ApplicationInfo::builder().api_version(vk::API_VERSION_1_0);
        let create_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&create_info, None).ok()? };

        let physical = unsafe { instance.enumerate_physical_devices().ok()? }
            .into_iter()
            .next()?;
        let queue_family = unsafe {
            instance.get_physical_device_queue_family_properties(physical)
        }
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))?
            as u32;

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)
            .build()];
        let device_info = vk::DeviceCreateInfo::builder().queue_create_infos(&queue_infos);
        let device = unsafe { instance.create_device(physical, &device_info, None).ok()? };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical) };

        Some(Self {
            _entry: entry,
            instance,
            device,
            queue,
            memory_properties,
            queue_family,
        })
    }
}

impl Drop for HeadlessGpu {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn staged_upload_roundtrips_bytes() {
    let Some(gpu) = HeadlessGpu::open() else {
        eprintln!("no Vulkan driver available, skipping");
        return;
    };

    let pool = CommandPool::new(gpu.device.clone(), gpu.queue_family).unwrap();

    for size in [1usize, 4096, 16 * 1024 * 1024] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();

        let destination = Buffer::new(
            gpu.device.clone(),
            &gpu.memory_properties,
            size as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        destination
            .upload_via_staging(&gpu.memory_properties, &pool, gpu.queue, &payload)
            .unwrap();

        let readback = destination.read_bytes().unwrap();
        assert_eq!(readback, payload, "mismatch at size {size}");
    }
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn zero_sized_uploads_are_rejected() {
    let Some(gpu) = HeadlessGpu::open() else {
        eprintln!("no Vulkan driver available, skipping");
        return;
    };

    // A zero-sized buffer is rejected at creation time.
    let result = Buffer::new(
        gpu.device.clone(),
        &gpu.memory_properties,
        0,
        vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::HOST_VISIBLE,
    );
    assert!(matches!(result, Err(VulkanError::InvalidData(_))));

    // And an empty payload is rejected at the upload edge.
    let pool = CommandPool::new(gpu.device.clone(), gpu.queue_family).unwrap();
    let destination = Buffer::new(
        gpu.device.clone(),
        &gpu.memory_properties,
        4,
        vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )
    .unwrap();
    let result = destination.upload_via_staging(&gpu.memory_properties, &pool, gpu.queue, &[]);
    assert!(matches!(result, Err(VulkanError::InvalidData(_))));
}
