//! Buffer resources and the staged upload path
//!
//! Every buffer owns its backing memory; device-local buffers are filled
//! through a temporary host-visible staging buffer and a one-time copy
//! command.

use ash::{vk, Device};
use std::mem;

use crate::render::vulkan::commands::{CommandPool, OneTimeCommands};
use crate::render::vulkan::memory;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Buffer plus backing memory with RAII cleanup.
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    buffer_memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it.
    ///
    /// Memory-type selection happens here; a zero byte size is rejected
    /// before touching the API.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        required: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidData(
                "cannot create a zero-sized buffer".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match memory::find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            required,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let buffer_memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        unsafe {
            device
                .bind_buffer_memory(buffer, buffer_memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            buffer,
            buffer_memory,
            size,
        })
    }

    /// Write bytes into a host-visible buffer through a transient mapping.
    pub fn write_bytes(&self, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidData(format!(
                "write of {} bytes exceeds buffer size {}",
                bytes.len(),
                self.size
            )));
        }

        unsafe {
            let mapped = self
                .device
                .map_memory(
                    self.buffer_memory,
                    0,
                    self.size,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.buffer_memory);
        }

        Ok(())
    }

    /// Read the buffer's contents back through a transient mapping.
    ///
    /// Host-visible buffers only; used by readback paths and test harnesses.
    pub fn read_bytes(&self) -> VulkanResult<Vec<u8>> {
        let mut bytes = vec![0u8; self.size as usize];
        unsafe {
            let mapped = self
                .device
                .map_memory(
                    self.buffer_memory,
                    0,
                    self.size,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(mapped.cast::<u8>(), bytes.as_mut_ptr(), bytes.len());
            self.device.unmap_memory(self.buffer_memory);
        }
        Ok(bytes)
    }

    /// Fill a device-local buffer from CPU bytes via a staging buffer.
    ///
    /// Allocates a temporary host-visible staging buffer, copies `bytes` into
    /// it, records a one-time buffer copy, submits, and blocks until the
    /// queue drains. The staging buffer is freed on return. Synchronous on
    /// purpose: this is the load-time ingestion path, not the per-frame one.
    pub fn upload_via_staging(
        &self,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        command_pool: &CommandPool,
        queue: vk::Queue,
        bytes: &[u8],
    ) -> VulkanResult<()> {
        if bytes.is_empty() {
            return Err(VulkanError::InvalidData(
                "refusing to upload an empty payload".to_string(),
            ));
        }

        let staging = Buffer::new(
            self.device.clone(),
            memory_properties,
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(bytes)?;

        let commands = OneTimeCommands::begin(&self.device, command_pool)?;
        let region = vk::BufferCopy::builder().size(bytes.len() as vk::DeviceSize);
        unsafe {
            self.device.cmd_copy_buffer(
                commands.command_buffer(),
                staging.handle(),
                self.buffer,
                &[region.build()],
            );
        }
        commands.submit_and_wait(queue)?;

        // Staging buffer and its memory drop here, after the copy retired.
        Ok(())
    }

    /// Get the buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.buffer_memory, None);
        }
    }
}

/// Device-local vertex buffer filled through the staging path.
pub struct VertexBuffer {
    buffer: Buffer,
    vertex_count: u32,
}

impl VertexBuffer {
    /// Create and fill a vertex buffer from CPU-side vertex records.
    pub fn new<T: bytemuck::Pod>(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        command_pool: &CommandPool,
        queue: vk::Queue,
        vertices: &[T],
    ) -> VulkanResult<Self> {
        if vertices.is_empty() {
            return Err(VulkanError::InvalidData(
                "mesh has no vertices".to_string(),
            ));
        }

        let size = mem::size_of_val(vertices) as vk::DeviceSize;
        let buffer = Buffer::new(
            device,
            memory_properties,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        buffer.upload_via_staging(
            memory_properties,
            command_pool,
            queue,
            bytemuck::cast_slice(vertices),
        )?;

        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
        })
    }

    /// Get the buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get the vertex count.
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// Device-local index buffer (32-bit indices) filled through staging.
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Create and fill an index buffer.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        command_pool: &CommandPool,
        queue: vk::Queue,
        indices: &[u32],
    ) -> VulkanResult<Self> {
        if indices.is_empty() {
            return Err(VulkanError::InvalidData("mesh has no indices".to_string()));
        }

        let size = mem::size_of_val(indices) as vk::DeviceSize;
        let buffer = Buffer::new(
            device,
            memory_properties,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        buffer.upload_via_staging(
            memory_properties,
            command_pool,
            queue,
            bytemuck::cast_slice(indices),
        )?;

        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Get the buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get the index count.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Host-visible uniform buffer with a persistent mapping.
///
/// Mapped once at creation and written every frame with a plain memcpy; no
/// staging round-trip on this path, it has to stay cheap.
pub struct UniformBuffer<T: bytemuck::Pod> {
    buffer: Buffer,
    mapped: *mut u8,
    _marker: std::marker::PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformBuffer<T> {
    /// Create the buffer and establish the persistent mapping.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
    ) -> VulkanResult<Self> {
        let size = mem::size_of::<T>() as vk::DeviceSize;
        let buffer = Buffer::new(
            device,
            memory_properties,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let mapped = unsafe {
            buffer
                .device
                .map_memory(buffer.buffer_memory, 0, size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
                .cast::<u8>()
        };

        Ok(Self {
            buffer,
            mapped,
            _marker: std::marker::PhantomData,
        })
    }

    /// Write the whole uniform block through the persistent mapping.
    pub fn update(&self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped, bytes.len());
        }
    }

    /// Get the buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

impl<T: bytemuck::Pod> Drop for UniformBuffer<T> {
    fn drop(&mut self) {
        unsafe {
            self.buffer.device.unmap_memory(self.buffer.buffer_memory);
        }
        // self.buffer drops next and releases the handle and memory.
    }
}
