use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use render_core::events::{EntityPayload, EventReader, Transform3x4};
use render_core::gfx::{
    BindGroupId, BufferId, DummyBackend, GfxBackend, IndexFormat, PipelineId, QueueType,
};
use render_core::scene::{DrawCommand, DrawStream};
use render_core::{EventBatchWriter, RenderEventType};

/// Draws spread over a handful of priorities, pipelines and meshes, pushed
/// in an order that defeats the sort key.
fn scrambled_stream(count: usize) -> DrawStream {
    let mut stream = DrawStream::new("bench", count);
    for i in 0..count as u64 {
        let mixed = i.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 40;
        stream.push(DrawCommand {
            priority: (mixed % 4) as u32,
            pipeline: PipelineId::from_raw(1 + mixed % 16),
            vertex_buffer: BufferId::from_raw(100 + mixed % 64),
            index_buffer: BufferId::from_raw(200 + mixed % 64),
            index_format: IndexFormat::Uint16,
            index_count: 36,
            first_index: 0,
            base_vertex: 0,
            instance_offset: i as u32,
            object_id: i as u32 + 1,
            material: BindGroupId::from_raw(300 + mixed % 32),
        });
    }
    stream
}

// ---------------------------------------------------------------------------
// Draw stream
// ---------------------------------------------------------------------------

fn bench_draw_stream_sort(c: &mut Criterion) {
    for count in [1_000usize, 16_000] {
        let stream = scrambled_stream(count);
        c.bench_function(&format!("draw_stream_sort_{count}"), |b| {
            b.iter_batched(
                || stream.clone(),
                |mut stream| {
                    stream.sort();
                    black_box(stream)
                },
                BatchSize::LargeInput,
            );
        });
    }
}

fn bench_draw_stream_record(c: &mut Criterion) {
    let backend = DummyBackend::new();
    backend.set_call_log(false);
    let cb = backend
        .create_command_buffer(QueueType::Graphics, "bench")
        .unwrap();
    let mut stream = scrambled_stream(4_000);
    stream.sort();
    c.bench_function("draw_stream_record_4000", |b| {
        b.iter(|| {
            backend.begin_commands(cb);
            let stats = stream.record(&backend, cb);
            backend.end_commands(cb);
            black_box(stats)
        });
    });
}

// ---------------------------------------------------------------------------
// Event decoding
// ---------------------------------------------------------------------------

fn transform_batch(count: u32) -> Arc<[u8]> {
    let mut batch = EventBatchWriter::new();
    for index in 0..count {
        batch.create_entity(
            index,
            &EntityPayload {
                model: 0,
                flags: 1,
                transform: Transform3x4::IDENTITY,
            },
        );
        batch.update_entity_transform(index, &Transform3x4::IDENTITY);
    }
    batch.finish()
}

fn bench_event_decode(c: &mut Criterion) {
    let bytes = transform_batch(10_000);
    c.bench_function("event_decode_20000", |b| {
        b.iter(|| {
            let mut translations = 0.0f32;
            for event in EventReader::new(&bytes) {
                if event.event_type == RenderEventType::UpdateEntityTransform {
                    translations += event.read::<Transform3x4>().cols[3][0];
                }
            }
            black_box(translations)
        });
    });
}

criterion_group!(
    benches,
    bench_draw_stream_sort,
    bench_draw_stream_record,
    bench_event_decode,
);
criterion_main!(benches);
