//! End-to-end pipeline tests against recording mock services

use std::collections::HashMap;

use gears_engine::scene::gear_uniform;
use gears_engine::{
    BackendError, BackendResult, BufferAllocator, BufferDescriptor, BufferHandle, BufferUsage,
    CommandSink, DescriptorBinder, DescriptorPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, FrameInput, GearDesc, GearError, GearMesh, GearParams,
    GearPlacement, GearRenderer, GearUniform, IndexFormat, PipelineLayoutHandle,
};
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    CreateBuffer {
        id: u64,
        size: u64,
        usage: BufferUsage,
    },
    WriteBuffer {
        id: u64,
        offset: u64,
        len: u64,
    },
    DestroyBuffer {
        id: u64,
    },
    AllocateSet {
        id: u64,
    },
    BindUniformBuffer {
        set: u64,
        binding: u32,
        buffer: u64,
        offset: u64,
        size: u64,
    },
    BindDescriptorSet {
        layout: u64,
        index: u32,
        set: u64,
    },
    BindVertexBuffer {
        slot: u32,
        buffer: u64,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: u64,
        offset: u64,
        format: IndexFormat,
    },
    DrawIndexed {
        count: u32,
        first: u32,
        base_vertex: i32,
        instances: u32,
    },
}

/// Records every service call and keeps buffer contents for inspection
#[derive(Default)]
struct MockGpu {
    events: Vec<Event>,
    buffers: HashMap<u64, Vec<u8>>,
    next_buffer_id: u64,
    next_set_id: u64,
    // Buffer creations remaining before an induced out-of-memory failure
    creations_until_failure: Option<u32>,
}

impl MockGpu {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self::default()
    }

    fn failing_after(creations: u32) -> Self {
        Self {
            creations_until_failure: Some(creations),
            ..Self::new()
        }
    }

    fn alive_buffers(&self) -> usize {
        self.buffers.len()
    }
}

impl BufferAllocator for MockGpu {
    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        if let Some(remaining) = self.creations_until_failure.as_mut() {
            if *remaining == 0 {
                return Err(BackendError::OutOfMemory);
            }
            *remaining -= 1;
        }

        self.next_buffer_id += 1;
        let id = self.next_buffer_id;
        self.buffers.insert(id, vec![0; desc.size as usize]);
        self.events.push(Event::CreateBuffer {
            id,
            size: desc.size,
            usage: desc.usage,
        });
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let handle = self.create_buffer(desc)?;
        self.write_buffer(handle, 0, data)?;
        Ok(handle)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> BackendResult<()> {
        let contents = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::UnknownHandle)?;
        if offset as usize + data.len() > contents.len() {
            return Err(BackendError::WriteOutOfRange {
                offset,
                len: data.len() as u64,
                size: contents.len() as u64,
            });
        }
        contents[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        self.events.push(Event::WriteBuffer {
            id: buffer.0,
            offset,
            len: data.len() as u64,
        });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
        self.events.push(Event::DestroyBuffer { id: buffer.0 });
    }
}

impl DescriptorBinder for MockGpu {
    fn allocate_set(
        &mut self,
        _pool: DescriptorPoolHandle,
        _layout: DescriptorSetLayoutHandle,
    ) -> BackendResult<DescriptorSetHandle> {
        self.next_set_id += 1;
        self.events.push(Event::AllocateSet {
            id: self.next_set_id,
        });
        Ok(DescriptorSetHandle(self.next_set_id))
    }

    fn bind_uniform_buffer(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> BackendResult<()> {
        self.events.push(Event::BindUniformBuffer {
            set: set.0,
            binding,
            buffer: buffer.0,
            offset,
            size,
        });
        Ok(())
    }
}

impl CommandSink for MockGpu {
    fn bind_descriptor_set(
        &mut self,
        layout: PipelineLayoutHandle,
        index: u32,
        set: DescriptorSetHandle,
    ) {
        self.events.push(Event::BindDescriptorSet {
            layout: layout.0,
            index,
            set: set.0,
        });
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.events.push(Event::BindVertexBuffer {
            slot,
            buffer: buffer.0,
            offset,
        });
    }

    fn bind_index_buffer(&mut self, buffer: BufferHandle, offset: u64, format: IndexFormat) {
        self.events.push(Event::BindIndexBuffer {
            buffer: buffer.0,
            offset,
            format,
        });
    }

    fn draw_indexed(
        &mut self,
        indices: std::ops::Range<u32>,
        base_vertex: i32,
        instances: std::ops::Range<u32>,
    ) {
        self.events.push(Event::DrawIndexed {
            count: indices.end - indices.start,
            first: indices.start,
            base_vertex,
            instances: instances.end - instances.start,
        });
    }
}

fn gear_desc() -> GearDesc {
    GearDesc {
        params: GearParams {
            inner_radius: 1.0,
            outer_radius: 4.0,
            width: 0.5,
            teeth: 10,
            tooth_depth: 0.2,
        },
        color: Vec3::new(1.0, 0.0, 0.0),
        placement: GearPlacement {
            position: Vec3::new(-3.0, 0.0, 0.0),
            rotation_speed: 1.0,
            rotation_offset: 0.0,
        },
    }
}

fn frame_input(time: f32) -> FrameInput {
    FrameInput {
        projection: Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 256.0),
        view_rotation: Vec3::new(-23.75, 41.25, 0.0),
        zoom: 16.0,
        time,
    }
}

const UNIFORM_SIZE: u64 = std::mem::size_of::<GearUniform>() as u64;

#[test]
fn construction_uploads_vertex_index_and_uniform_buffers() {
    let mut gpu = MockGpu::new();
    let gear = GearMesh::new(&mut gpu, &gear_desc()).unwrap();

    // 400 vertices of 36 bytes, 660 indices of 4 bytes, one uniform block.
    assert_eq!(
        gpu.events,
        vec![
            Event::CreateBuffer {
                id: 1,
                size: 400 * 36,
                usage: BufferUsage::VERTEX | BufferUsage::MAP_WRITE,
            },
            Event::WriteBuffer {
                id: 1,
                offset: 0,
                len: 400 * 36,
            },
            Event::CreateBuffer {
                id: 2,
                size: 660 * 4,
                usage: BufferUsage::INDEX | BufferUsage::MAP_WRITE,
            },
            Event::WriteBuffer {
                id: 2,
                offset: 0,
                len: 660 * 4,
            },
            Event::CreateBuffer {
                id: 3,
                size: UNIFORM_SIZE,
                usage: BufferUsage::UNIFORM | BufferUsage::MAP_WRITE,
            },
        ]
    );
    assert_eq!(gear.index_count(), 660);
    assert_eq!(gpu.alive_buffers(), 3);

    // Uploaded bytes match the generated geometry.
    assert_eq!(gpu.buffers[&1], gear.mesh().vertex_bytes());
    assert_eq!(gpu.buffers[&2], gear.mesh().index_bytes());
}

#[test]
fn invalid_parameters_reject_before_any_allocation() {
    let mut gpu = MockGpu::new();
    let mut desc = gear_desc();
    desc.params.teeth = 0;

    let err = GearMesh::new(&mut gpu, &desc).unwrap_err();
    assert!(matches!(err, GearError::Geometry(_)));
    assert!(gpu.events.is_empty());
}

#[test]
fn failed_allocation_rolls_back_created_buffers() {
    // Index buffer creation fails: the vertex buffer must be released.
    let mut gpu = MockGpu::failing_after(1);
    let err = GearMesh::new(&mut gpu, &gear_desc()).unwrap_err();
    assert!(matches!(err, GearError::Gpu(BackendError::OutOfMemory)));
    assert_eq!(gpu.events.last(), Some(&Event::DestroyBuffer { id: 1 }));
    assert_eq!(gpu.alive_buffers(), 0);

    // Uniform buffer creation fails: index then vertex are released.
    let mut gpu = MockGpu::failing_after(2);
    let err = GearMesh::new(&mut gpu, &gear_desc()).unwrap_err();
    assert!(matches!(err, GearError::Gpu(BackendError::OutOfMemory)));
    let destroys: Vec<_> = gpu
        .events
        .iter()
        .filter(|e| matches!(e, Event::DestroyBuffer { .. }))
        .cloned()
        .collect();
    assert_eq!(
        destroys,
        vec![
            Event::DestroyBuffer { id: 2 },
            Event::DestroyBuffer { id: 1 },
        ]
    );
    assert_eq!(gpu.alive_buffers(), 0);
}

#[test]
fn descriptor_binding_targets_the_uniform_buffer() {
    let mut gpu = MockGpu::new();
    let mut gear = GearMesh::new(&mut gpu, &gear_desc()).unwrap();
    gear.bind_descriptors(&mut gpu, DescriptorPoolHandle(7), DescriptorSetLayoutHandle(9))
        .unwrap();

    assert_eq!(gear.descriptor_set(), Some(DescriptorSetHandle(1)));
    assert_eq!(
        &gpu.events[5..],
        &[
            Event::AllocateSet { id: 1 },
            Event::BindUniformBuffer {
                set: 1,
                binding: 0,
                buffer: 3,
                offset: 0,
                size: UNIFORM_SIZE,
            },
        ]
    );
}

#[test]
fn per_frame_update_overwrites_the_exact_uniform_block() {
    let mut gpu = MockGpu::new();
    let gear = GearMesh::new(&mut gpu, &gear_desc()).unwrap();

    let frame = frame_input(42.0);
    gear.update_uniform(&mut gpu, &frame).unwrap();

    assert_eq!(
        gpu.events.last(),
        Some(&Event::WriteBuffer {
            id: 3,
            offset: 0,
            len: UNIFORM_SIZE,
        })
    );

    // The device-visible bytes are the recomputed block for this instant.
    let expected = gear_uniform(&frame, gear.placement());
    assert_eq!(gpu.buffers[&3], bytemuck::bytes_of(&expected));

    // A later frame rewrites in place without reallocating.
    let events_before = gpu.events.len();
    gear.update_uniform(&mut gpu, &frame_input(43.0)).unwrap();
    assert_eq!(gpu.events.len(), events_before + 1);
    assert_eq!(gpu.alive_buffers(), 3);
    assert_ne!(gpu.buffers[&3], bytemuck::bytes_of(&expected));
}

#[test]
fn draw_records_the_full_bind_and_draw_sequence() {
    let mut gpu = MockGpu::new();
    let mut gear = GearMesh::new(&mut gpu, &gear_desc()).unwrap();
    gear.bind_descriptors(&mut gpu, DescriptorPoolHandle(1), DescriptorSetLayoutHandle(1))
        .unwrap();

    let renderer = GearRenderer::new(PipelineLayoutHandle(11));
    let start = gpu.events.len();
    renderer.draw(&mut gpu, &gear);

    assert_eq!(
        &gpu.events[start..],
        &[
            Event::BindDescriptorSet {
                layout: 11,
                index: 0,
                set: 1,
            },
            Event::BindVertexBuffer {
                slot: 0,
                buffer: 1,
                offset: 0,
            },
            Event::BindIndexBuffer {
                buffer: 2,
                offset: 0,
                format: IndexFormat::Uint32,
            },
            Event::DrawIndexed {
                count: 660,
                first: 0,
                base_vertex: 0,
                instances: 1,
            },
        ]
    );
}

#[test]
fn draw_is_skipped_until_descriptors_are_bound() {
    let mut gpu = MockGpu::new();
    let gear = GearMesh::new(&mut gpu, &gear_desc()).unwrap();

    let renderer = GearRenderer::new(PipelineLayoutHandle(11));
    let start = gpu.events.len();
    renderer.draw(&mut gpu, &gear);
    assert_eq!(gpu.events.len(), start);
}

#[test]
fn destroy_releases_buffers_in_reverse_creation_order() {
    let mut gpu = MockGpu::new();
    let gear = GearMesh::new(&mut gpu, &gear_desc()).unwrap();
    let start = gpu.events.len();
    gear.destroy(&mut gpu);

    assert_eq!(
        &gpu.events[start..],
        &[
            Event::DestroyBuffer { id: 3 },
            Event::DestroyBuffer { id: 2 },
            Event::DestroyBuffer { id: 1 },
        ]
    );
    assert_eq!(gpu.alive_buffers(), 0);
}

#[test]
fn multiple_gears_own_disjoint_buffers() {
    let mut gpu = MockGpu::new();
    let large = GearMesh::new(&mut gpu, &gear_desc()).unwrap();

    let mut small = gear_desc();
    small.params.teeth = 6;
    small.placement.rotation_offset = -9.0;
    let small = GearMesh::new(&mut gpu, &small).unwrap();

    assert_eq!(gpu.alive_buffers(), 6);
    assert_ne!(large.vertex_buffer(), small.vertex_buffer());
    assert_ne!(large.index_buffer(), small.index_buffer());
    assert_eq!(small.index_count(), 6 * 22 * 3);

    // Caller-ordered batch drawing records one sequence per gear.
    let mut batch_gpu = MockGpu::new();
    let mut gears = Vec::new();
    for offset in [0.0, -9.0] {
        let mut desc = gear_desc();
        desc.placement.rotation_offset = offset;
        let mut gear = GearMesh::new(&mut batch_gpu, &desc).unwrap();
        gear.bind_descriptors(
            &mut batch_gpu,
            DescriptorPoolHandle(1),
            DescriptorSetLayoutHandle(1),
        )
        .unwrap();
        gears.push(gear);
    }

    let renderer = GearRenderer::new(PipelineLayoutHandle(1));
    let start = batch_gpu.events.len();
    renderer.draw_all(&mut batch_gpu, &gears);
    let draws = batch_gpu.events[start..]
        .iter()
        .filter(|e| matches!(e, Event::DrawIndexed { .. }))
        .count();
    assert_eq!(draws, 2);
}
