//! Gears Engine - procedural spur-gear meshes and their animated rendering
//!
//! The crate synthesizes closed, consistently wound spur-gear solids from six
//! geometric parameters and drives them through a per-frame upload pipeline:
//!
//! - [`resources::gear`] generates the vertex and index arrays (pure CPU)
//! - [`GearMesh`] uploads them once and owns the backing device buffers
//! - [`scene`] recomputes each gear's uniform block every frame
//! - [`GearRenderer`] records the bind-and-draw commands
//!
//! Window, device, swapchain, pipelines and frame submission belong to the
//! host application; they are consumed through the narrow service traits in
//! [`backend::traits`], with a Vulkan implementation in [`backend::vulkan`].

pub mod backend;
pub mod gear_mesh;
pub mod renderer;
pub mod resources;
pub mod scene;

pub use backend::traits::{
    BackendError, BackendResult, BufferAllocator, BufferHandle, CommandSink, DescriptorBinder,
    DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle, IndexFormat,
    PipelineLayoutHandle,
};
pub use backend::types::{BufferDescriptor, BufferUsage, GearUniform, Vertex};
pub use backend::vulkan::VulkanGpuContext;
pub use gear_mesh::{GearDesc, GearError, GearMesh};
pub use renderer::GearRenderer;
pub use resources::{gear::GearParams, Mesh};
pub use scene::{FrameInput, GearPlacement};
