//! Vulkan implementation of the buffer, descriptor and command services
//!
//! The instance, device and physical device are created and owned by the
//! host application and passed in as shared context; this module only
//! manages the resources it creates itself (buffers and their allocations).

use crate::backend::traits::*;
use crate::backend::types::*;
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Vulkan-backed GPU context implementing the service traits
pub struct VulkanGpuContext {
    device: ash::Device,
    allocator: Option<Arc<Mutex<Allocator>>>,

    // Resource storage
    buffers: HashMap<u64, VkBuffer>,
    descriptor_pools: HashMap<u64, vk::DescriptorPool>,
    set_layouts: HashMap<u64, vk::DescriptorSetLayout>,
    descriptor_sets: HashMap<u64, vk::DescriptorSet>,
    pipeline_layouts: HashMap<u64, vk::PipelineLayout>,

    // Command buffer currently being recorded, installed per frame
    command_buffer: Option<vk::CommandBuffer>,

    // Handle counters
    next_buffer_id: u64,
    next_pool_id: u64,
    next_set_layout_id: u64,
    next_set_id: u64,
    next_pipeline_layout_id: u64,
}

struct VkBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

impl VulkanGpuContext {
    /// Create a context over a host-owned instance, device and physical device
    pub fn new(
        instance: &ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> BackendResult<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| BackendError::AllocationFailed(e.to_string()))?;

        log::info!("Vulkan GPU context created");

        Ok(Self {
            device,
            allocator: Some(Arc::new(Mutex::new(allocator))),
            buffers: HashMap::new(),
            descriptor_pools: HashMap::new(),
            set_layouts: HashMap::new(),
            descriptor_sets: HashMap::new(),
            pipeline_layouts: HashMap::new(),
            command_buffer: None,
            next_buffer_id: 1,
            next_pool_id: 1,
            next_set_layout_id: 1,
            next_set_id: 1,
            next_pipeline_layout_id: 1,
        })
    }

    /// Admit a host-owned descriptor pool, returning an opaque handle
    pub fn register_descriptor_pool(&mut self, pool: vk::DescriptorPool) -> DescriptorPoolHandle {
        let id = self.next_pool_id;
        self.next_pool_id += 1;
        self.descriptor_pools.insert(id, pool);
        DescriptorPoolHandle(id)
    }

    /// Admit a host-owned descriptor set layout
    pub fn register_set_layout(
        &mut self,
        layout: vk::DescriptorSetLayout,
    ) -> DescriptorSetLayoutHandle {
        let id = self.next_set_layout_id;
        self.next_set_layout_id += 1;
        self.set_layouts.insert(id, layout);
        DescriptorSetLayoutHandle(id)
    }

    /// Admit a host-owned pipeline layout
    pub fn register_pipeline_layout(&mut self, layout: vk::PipelineLayout) -> PipelineLayoutHandle {
        let id = self.next_pipeline_layout_id;
        self.next_pipeline_layout_id += 1;
        self.pipeline_layouts.insert(id, layout);
        PipelineLayoutHandle(id)
    }

    /// Install the command buffer that subsequent recording targets.
    ///
    /// The buffer must already be in the recording state; the host begins and
    /// ends it around the frame.
    pub fn begin_recording(&mut self, command_buffer: vk::CommandBuffer) {
        self.command_buffer = Some(command_buffer);
    }

    /// Detach the current command buffer
    pub fn end_recording(&mut self) {
        self.command_buffer = None;
    }

    fn recording_target(&self) -> Option<vk::CommandBuffer> {
        if self.command_buffer.is_none() {
            log::warn!("command recorded outside begin_recording/end_recording; ignored");
        }
        self.command_buffer
    }

    fn convert_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
        let mut flags = vk::BufferUsageFlags::empty();
        if usage.contains(BufferUsage::VERTEX) {
            flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }
        if usage.contains(BufferUsage::INDEX) {
            flags |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
        }
        if usage.contains(BufferUsage::COPY_SRC) {
            flags |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            flags |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        flags
    }
}

impl BufferAllocator for VulkanGpuContext {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo {
                size: desc.size,
                usage: Self::convert_usage(desc.usage),
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };

            let buffer = self
                .device
                .create_buffer(&buffer_info, None)
                .map_err(|e| BackendError::BufferCreationFailed(e.to_string()))?;

            let requirements = self.device.get_buffer_memory_requirements(buffer);

            let location = if desc.usage.contains(BufferUsage::MAP_WRITE) {
                MemoryLocation::CpuToGpu
            } else {
                MemoryLocation::GpuOnly
            };

            let allocation = match self
                .allocator
                .as_ref()
                .ok_or_else(|| BackendError::AllocationFailed("Allocator not available".into()))?
                .lock()
                .allocate(&AllocationCreateDesc {
                    name: desc.label.as_deref().unwrap_or("buffer"),
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(BackendError::AllocationFailed(e.to_string()));
                }
            };

            if let Err(e) =
                self.device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
            {
                self.device.destroy_buffer(buffer, None);
                if let Some(ref allocator) = self.allocator {
                    let _ = allocator.lock().free(allocation);
                }
                return Err(BackendError::BufferCreationFailed(e.to_string()));
            }

            let id = self.next_buffer_id;
            self.next_buffer_id += 1;
            self.buffers.insert(
                id,
                VkBuffer {
                    buffer,
                    allocation,
                    size: desc.size,
                },
            );

            Ok(BufferHandle(id))
        }
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let handle = self.create_buffer(desc)?;
        if let Err(e) = self.write_buffer(handle, 0, data) {
            self.destroy_buffer(handle);
            return Err(e);
        }
        Ok(handle)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> BackendResult<()> {
        let vk_buffer = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::UnknownHandle)?;

        if offset + data.len() as u64 > vk_buffer.size {
            return Err(BackendError::WriteOutOfRange {
                offset,
                len: data.len() as u64,
                size: vk_buffer.size,
            });
        }

        let mapped = vk_buffer
            .allocation
            .mapped_slice_mut()
            .ok_or_else(|| BackendError::MapFailed("allocation is not host-visible".into()))?;

        let start = offset as usize;
        mapped[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(vk_buffer) = self.buffers.remove(&buffer.0) {
            unsafe {
                self.device.destroy_buffer(vk_buffer.buffer, None);
                if let Some(ref allocator) = self.allocator {
                    let _ = allocator.lock().free(vk_buffer.allocation);
                }
            }
        }
    }
}

impl DescriptorBinder for VulkanGpuContext {
    fn allocate_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> BackendResult<DescriptorSetHandle> {
        let vk_pool = *self
            .descriptor_pools
            .get(&pool.0)
            .ok_or(BackendError::UnknownHandle)?;
        let vk_layout = self
            .set_layouts
            .get(&layout.0)
            .ok_or(BackendError::UnknownHandle)?;

        let alloc_info = vk::DescriptorSetAllocateInfo {
            descriptor_pool: vk_pool,
            descriptor_set_count: 1,
            p_set_layouts: vk_layout,
            ..Default::default()
        };

        let descriptor_set = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(|e| BackendError::DescriptorAllocationFailed(e.to_string()))?[0]
        };

        let id = self.next_set_id;
        self.next_set_id += 1;
        self.descriptor_sets.insert(id, descriptor_set);

        Ok(DescriptorSetHandle(id))
    }

    fn bind_uniform_buffer(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> BackendResult<()> {
        let vk_set = *self
            .descriptor_sets
            .get(&set.0)
            .ok_or(BackendError::UnknownHandle)?;
        let vk_buffer = self
            .buffers
            .get(&buffer.0)
            .ok_or(BackendError::UnknownHandle)?;

        let buffer_info = vk::DescriptorBufferInfo {
            buffer: vk_buffer.buffer,
            offset,
            range: size,
        };

        let write = vk::WriteDescriptorSet {
            dst_set: vk_set,
            dst_binding: binding,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &buffer_info,
            ..Default::default()
        };

        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }

        Ok(())
    }
}

impl CommandSink for VulkanGpuContext {
    fn bind_descriptor_set(
        &mut self,
        layout: PipelineLayoutHandle,
        index: u32,
        set: DescriptorSetHandle,
    ) {
        let Some(cmd) = self.recording_target() else {
            return;
        };
        let (Some(&vk_layout), Some(&vk_set)) = (
            self.pipeline_layouts.get(&layout.0),
            self.descriptor_sets.get(&set.0),
        ) else {
            log::warn!("bind_descriptor_set with unknown handle; ignored");
            return;
        };
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                vk_layout,
                index,
                &[vk_set],
                &[],
            );
        }
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        let Some(cmd) = self.recording_target() else {
            return;
        };
        let Some(vk_buffer) = self.buffers.get(&buffer.0) else {
            log::warn!("bind_vertex_buffer with unknown handle; ignored");
            return;
        };
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(cmd, slot, &[vk_buffer.buffer], &[offset]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        let Some(cmd) = self.recording_target() else {
            return;
        };
        let Some(vk_buffer) = self.buffers.get(&buffer.0) else {
            log::warn!("bind_index_buffer with unknown handle; ignored");
            return;
        };
        let index_type = match format {
            IndexFormat::Uint16 => vk::IndexType::UINT16,
            IndexFormat::Uint32 => vk::IndexType::UINT32,
        };
        unsafe {
            self.device
                .cmd_bind_index_buffer(cmd, vk_buffer.buffer, offset, index_type);
        }
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        let Some(cmd) = self.recording_target() else {
            return;
        };
        unsafe {
            self.device.cmd_draw_indexed(
                cmd,
                indices.end - indices.start,
                instances.end - instances.start,
                indices.start,
                base_vertex,
                instances.start,
            );
        }
    }
}

impl Drop for VulkanGpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            if !self.buffers.is_empty() {
                log::warn!("{} buffers still alive at context drop", self.buffers.len());
            }

            if let Some(ref allocator) = self.allocator {
                for (_, buffer) in self.buffers.drain() {
                    self.device.destroy_buffer(buffer.buffer, None);
                    let _ = allocator.lock().free(buffer.allocation);
                }
            }

            // Allocator must go before the device handle it references.
            // Pools, layouts and the device itself are host-owned and not
            // destroyed here.
            drop(self.allocator.take());
        }
    }
}
