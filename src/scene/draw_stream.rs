use crate::gfx::{
    BindGroupId, BindPoint, BufferId, CommandBufferId, GfxBackend, IndexFormat, PipelineId,
};

/// Bind group set that material groups are bound at. Set 0 is the global group.
pub const MATERIAL_SET: u32 = 1;

/// One indexed draw.
///
/// Every field is an index or handle; nothing refers to proxy memory, so
/// proxies may move between recording and execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    pub priority: u32,
    pub pipeline: PipelineId,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub index_format: IndexFormat,
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    /// Element index of this draw's instance record in the pass instance
    /// buffer, passed as `first_instance`.
    pub instance_offset: u32,
    pub object_id: u32,
    /// Material bind group for the recording frame slot.
    pub material: BindGroupId,
}

impl DrawCommand {
    /// State-change ordering key.
    #[inline]
    pub fn sort_key(&self) -> (u32, u64, u64, u64) {
        (
            self.priority,
            self.pipeline.raw(),
            self.vertex_buffer.raw(),
            self.index_buffer.raw(),
        )
    }
}

/// Counters of one [`DrawStream::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawStreamStats {
    pub draws: usize,
    pub pipeline_binds: usize,
    pub vertex_buffer_binds: usize,
    pub index_buffer_binds: usize,
    pub material_binds: usize,
}

/// Fixed-capacity list of draws, sorted once and recorded in one pass.
#[derive(Debug, Clone)]
pub struct DrawStream {
    label: &'static str,
    commands: Vec<DrawCommand>,
    capacity: usize,
}

impl DrawStream {
    pub fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            label,
            commands: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// # Panics
    ///
    /// Panics when the stream is full.
    pub fn push(&mut self, command: DrawCommand) {
        assert!(
            self.commands.len() < self.capacity,
            "draw stream `{}` full ({} draws)",
            self.label,
            self.capacity
        );
        self.commands.push(command);
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Stable sort by [`DrawCommand::sort_key`]; equal keys keep push order.
    pub fn sort(&mut self) {
        self.commands.sort_by_key(DrawCommand::sort_key);
    }

    /// Record every draw, binding pipeline, buffers and material group only
    /// when they differ from the previous draw.
    pub fn record(&self, backend: &dyn GfxBackend, cb: CommandBufferId) -> DrawStreamStats {
        let mut stats = DrawStreamStats::default();
        let mut pipeline = PipelineId::NULL;
        let mut vertex_buffer = BufferId::NULL;
        let mut index_buffer = BufferId::NULL;
        let mut material = BindGroupId::NULL;

        for draw in &self.commands {
            if draw.pipeline != pipeline {
                backend.cmd_bind_pipeline(cb, draw.pipeline);
                pipeline = draw.pipeline;
                stats.pipeline_binds += 1;
                // A new pipeline invalidates its material binding.
                material = BindGroupId::NULL;
            }
            if draw.vertex_buffer != vertex_buffer {
                backend.cmd_bind_vertex_buffer(cb, draw.vertex_buffer, 0);
                vertex_buffer = draw.vertex_buffer;
                stats.vertex_buffer_binds += 1;
            }
            if draw.index_buffer != index_buffer {
                backend.cmd_bind_index_buffer(cb, draw.index_buffer, 0, draw.index_format);
                index_buffer = draw.index_buffer;
                stats.index_buffer_binds += 1;
            }
            if draw.material != material && !draw.material.is_null() {
                backend.cmd_bind_group(cb, BindPoint::Graphics, MATERIAL_SET, draw.material);
                material = draw.material;
                stats.material_binds += 1;
            }
            backend.cmd_draw_indexed(
                cb,
                draw.index_count,
                1,
                draw.first_index,
                draw.base_vertex,
                draw.instance_offset,
            );
            stats.draws += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{BindLayoutDesc, CommandRecord, DummyBackend, PipelineDesc, QueueType, ShaderSource};

    fn draw(priority: u32, pipeline: u64, vb: u64, object_id: u32) -> DrawCommand {
        DrawCommand {
            priority,
            pipeline: PipelineId::from_raw(pipeline),
            vertex_buffer: BufferId::from_raw(vb),
            index_buffer: BufferId::from_raw(vb + 100),
            index_format: IndexFormat::Uint32,
            index_count: 3,
            first_index: 0,
            base_vertex: 0,
            instance_offset: object_id,
            object_id,
            material: BindGroupId::NULL,
        }
    }

    #[test]
    fn test_sort_is_stable() {
        let mut stream = DrawStream::new("test", 16);
        stream.push(draw(1, 2, 1, 0));
        stream.push(draw(0, 5, 1, 1));
        stream.push(draw(1, 2, 1, 2));
        stream.push(draw(0, 1, 1, 3));
        stream.sort();
        let ids: Vec<_> = stream.commands().iter().map(|d| d.object_id).collect();
        assert_eq!(ids, vec![3, 1, 0, 2]);

        let first = stream.commands().to_vec();
        stream.sort();
        assert_eq!(stream.commands(), first.as_slice());
    }

    #[test]
    #[should_panic(expected = "full")]
    fn test_overflow_panics() {
        let mut stream = DrawStream::new("tiny", 1);
        stream.push(draw(0, 1, 1, 0));
        stream.push(draw(0, 1, 1, 1));
    }

    #[test]
    fn test_record_rebinds_on_key_change_only() {
        let backend = DummyBackend::new();
        let layout = backend.create_bind_layout(&BindLayoutDesc::default()).unwrap();
        let make = |label: &'static str| {
            backend
                .create_pipeline(&PipelineDesc::compute(label, ShaderSource::Engine(label), layout))
                .unwrap()
        };
        let a = make("a");
        let b = make("b");
        let cb = backend.create_command_buffer(QueueType::Graphics, "draws").unwrap();

        let mut stream = DrawStream::new("test", 8);
        for (pipeline, vb) in [(a, 1), (a, 1), (a, 2), (b, 2)] {
            let mut command = draw(0, 0, vb, 0);
            command.pipeline = pipeline;
            stream.push(command);
        }
        stream.sort();

        backend.begin_commands(cb);
        let stats = stream.record(&backend, cb);
        backend.end_commands(cb);

        assert_eq!(stats.draws, 4);
        assert_eq!(stats.pipeline_binds, 2);
        assert_eq!(stats.vertex_buffer_binds, 2);
        let draws = backend
            .commands(cb)
            .iter()
            .filter(|command| matches!(command, CommandRecord::DrawIndexed { .. }))
            .count();
        assert_eq!(draws, 4);
    }
}
