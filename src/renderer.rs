//! Draw-command recording for gears

use crate::backend::traits::{CommandSink, IndexFormat, PipelineLayoutHandle};
use crate::gear_mesh::GearMesh;

/// Records indexed draws for gears into a command sink.
///
/// One stateless recording per gear per frame: every draw binds its own
/// descriptor set and buffers, so gears can be recorded in any order.
pub struct GearRenderer {
    pipeline_layout: PipelineLayoutHandle,
}

impl GearRenderer {
    pub fn new(pipeline_layout: PipelineLayoutHandle) -> Self {
        Self { pipeline_layout }
    }

    /// Record one indexed draw for a gear
    pub fn draw(&self, sink: &mut dyn CommandSink, gear: &GearMesh) {
        let Some(set) = gear.descriptor_set() else {
            log::warn!("gear drawn before its descriptor set was bound; skipping");
            return;
        };

        sink.bind_descriptor_set(self.pipeline_layout, 0, set);
        sink.bind_vertex_buffer(0, gear.vertex_buffer(), 0);
        sink.bind_index_buffer(gear.index_buffer(), 0, IndexFormat::Uint32);
        sink.draw_indexed(0..gear.index_count(), 0, 0..1);
    }

    /// Record draws for a batch of gears in caller order
    pub fn draw_all(&self, sink: &mut dyn CommandSink, gears: &[GearMesh]) {
        for gear in gears {
            self.draw(sink, gear);
        }
    }
}
