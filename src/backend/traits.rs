//! Narrow service interfaces supplied by the surrounding renderer
//!
//! The host application owns the device, swapchain, pipelines and frame
//! submission. This crate only consumes three slices of that machinery:
//! buffer allocation, descriptor binding and command recording.

use crate::backend::types::BufferDescriptor;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to allocate device memory: {0}")]
    AllocationFailed(String),
    #[error("Failed to map buffer memory: {0}")]
    MapFailed(String),
    #[error("Buffer write out of range: offset {offset} + {len} bytes exceeds allocation of {size}")]
    WriteOutOfRange { offset: u64, len: u64, size: u64 },
    #[error("Failed to allocate descriptor set: {0}")]
    DescriptorAllocationFailed(String),
    #[error("Failed to update descriptor set: {0}")]
    DescriptorUpdateFailed(String),
    #[error("Unknown resource handle")]
    UnknownHandle,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a descriptor pool owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPoolHandle(pub u64);

/// Handle to a descriptor set layout owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutHandle(pub u64);

/// Handle to an allocated descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetHandle(pub u64);

/// Handle to a pipeline layout owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineLayoutHandle(pub u64);

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Device-memory-backed buffer service.
///
/// Allocation failures are terminal: GPU memory pressure does not resolve
/// within a frame, so callers propagate instead of retrying.
pub trait BufferAllocator {
    /// Create a buffer and back it with bound device memory
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Create a buffer and fill it with initial data
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle>;

    /// Overwrite part of a buffer through its host-visible mapping.
    ///
    /// The copy happens only after a successful map; a failed map leaves the
    /// buffer contents untouched.
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> BackendResult<()>;

    /// Destroy a buffer and release its memory
    fn destroy_buffer(&mut self, buffer: BufferHandle);
}

/// Descriptor set allocation and uniform-buffer binding
pub trait DescriptorBinder {
    /// Allocate a descriptor set from a host-owned pool and layout
    fn allocate_set(
        &mut self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> BackendResult<DescriptorSetHandle>;

    /// Point a uniform-buffer binding of a set at a buffer range
    fn bind_uniform_buffer(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> BackendResult<()>;
}

/// Command-recording sink for draw submission.
///
/// Recording is stateless per gear: each draw binds everything it needs, so
/// ordering across gears is the caller's choice.
pub trait CommandSink {
    /// Bind a descriptor set at the given set index
    fn bind_descriptor_set(
        &mut self,
        layout: PipelineLayoutHandle,
        index: u32,
        set: DescriptorSetHandle,
    );

    /// Bind a vertex buffer to a binding slot
    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);

    /// Bind an index buffer
    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat);

    /// Record an indexed draw
    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    );
}
