//! GPU-resident gear meshes
//!
//! A [`GearMesh`] owns the generated geometry and the three device buffers
//! backing it. The vertex and index buffers are filled once at construction;
//! only the uniform block is rewritten, every frame.

use crate::backend::traits::{
    BackendError, BackendResult, BufferAllocator, BufferHandle, DescriptorBinder,
    DescriptorPoolHandle, DescriptorSetHandle, DescriptorSetLayoutHandle,
};
use crate::backend::types::{BufferDescriptor, BufferUsage, GearUniform};
use crate::resources::gear::{self, GearParams, GeometryError};
use crate::resources::Mesh;
use crate::scene::{gear_uniform, FrameInput, GearPlacement};
use glam::Vec3;
use thiserror::Error;

/// Failure surface of gear construction
#[derive(Error, Debug)]
pub enum GearError {
    #[error("invalid gear geometry: {0}")]
    Geometry(#[from] GeometryError),
    #[error("gpu resource allocation failed: {0}")]
    Gpu(#[from] BackendError),
}

/// Everything needed to build one gear
#[derive(Debug, Clone)]
pub struct GearDesc {
    pub params: GearParams,
    pub color: Vec3,
    pub placement: GearPlacement,
}

/// A gear with its geometry uploaded to device memory.
///
/// Each instance exclusively owns its buffers; [`GearMesh::destroy`] consumes
/// the mesh so they are released exactly once, newest first.
#[derive(Debug)]
pub struct GearMesh {
    mesh: Mesh,
    placement: GearPlacement,
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    uniform_buffer: BufferHandle,
    descriptor_set: Option<DescriptorSetHandle>,
}

impl GearMesh {
    /// Validate, generate and upload a gear.
    ///
    /// Construction is atomic: if any allocation fails, buffers created so
    /// far are destroyed before the error is returned.
    pub fn new(allocator: &mut dyn BufferAllocator, desc: &GearDesc) -> Result<Self, GearError> {
        let mesh = gear::generate(&desc.params, desc.color)?;

        let vertex_buffer = allocator.create_buffer_init(
            &BufferDescriptor {
                label: Some("gear vertices".into()),
                size: mesh.vertex_bytes().len() as u64,
                usage: BufferUsage::VERTEX | BufferUsage::MAP_WRITE,
            },
            mesh.vertex_bytes(),
        )?;

        let index_buffer = match allocator.create_buffer_init(
            &BufferDescriptor {
                label: Some("gear indices".into()),
                size: mesh.index_bytes().len() as u64,
                usage: BufferUsage::INDEX | BufferUsage::MAP_WRITE,
            },
            mesh.index_bytes(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                allocator.destroy_buffer(vertex_buffer);
                return Err(e.into());
            }
        };

        let uniform_buffer = match allocator.create_buffer(&BufferDescriptor {
            label: Some("gear uniforms".into()),
            size: std::mem::size_of::<GearUniform>() as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::MAP_WRITE,
        }) {
            Ok(handle) => handle,
            Err(e) => {
                allocator.destroy_buffer(index_buffer);
                allocator.destroy_buffer(vertex_buffer);
                return Err(e.into());
            }
        };

        Ok(Self {
            mesh,
            placement: desc.placement,
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            descriptor_set: None,
        })
    }

    /// Allocate this gear's descriptor set and point binding 0 at the
    /// uniform buffer
    pub fn bind_descriptors(
        &mut self,
        descriptors: &mut dyn DescriptorBinder,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<(), GearError> {
        let set = descriptors.allocate_set(pool, layout)?;
        descriptors.bind_uniform_buffer(
            set,
            0,
            self.uniform_buffer,
            0,
            std::mem::size_of::<GearUniform>() as u64,
        )?;
        self.descriptor_set = Some(set);
        Ok(())
    }

    /// Recompute the uniform block for this frame and overwrite the uniform
    /// buffer in place.
    ///
    /// The write is exactly the buffer's allocated size; a failed map leaves
    /// the previous frame's block intact.
    pub fn update_uniform(
        &self,
        allocator: &mut dyn BufferAllocator,
        frame: &FrameInput,
    ) -> BackendResult<()> {
        let block = gear_uniform(frame, &self.placement);
        allocator.write_buffer(self.uniform_buffer, 0, bytemuck::bytes_of(&block))
    }

    /// Generated geometry kept on the CPU side
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn placement(&self) -> &GearPlacement {
        &self.placement
    }

    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    pub fn descriptor_set(&self) -> Option<DescriptorSetHandle> {
        self.descriptor_set
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.mesh.index_count() as u32
    }

    /// Release the GPU buffers, newest first
    pub fn destroy(self, allocator: &mut dyn BufferAllocator) {
        allocator.destroy_buffer(self.uniform_buffer);
        allocator.destroy_buffer(self.index_buffer);
        allocator.destroy_buffer(self.vertex_buffer);
    }
}
