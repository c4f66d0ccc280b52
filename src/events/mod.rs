//! Simulation → render event stream.
//!
//! The simulation thread never touches GPU state. It describes scene changes
//! as typed binary records, groups them into batches and pushes the batches
//! into an [`EventStream`]. Once per frame the render thread drains the
//! stream and the proxy manager applies every record in stream order.
//!
//! ```text
//! simulation thread                         render thread
//! ┌──────────────────┐   push_batch   ┌──────────────┐   fetch_render_events
//! │ EventBatchWriter │ ─────────────▶ │ EventStream  │ ─────────────────────▶ ProxyManager
//! └──────────────────┘                └──────────────┘
//! ```
//!
//! # Wire format
//!
//! `[header][payload][header][payload]...` where the 12-byte
//! [`RenderEventHeader`] carries the event type, the target pool index and
//! the payload size. See [`wire`] for payload layouts.

mod reader;
mod stream;
pub mod wire;
mod writer;

pub use reader::{EventReader, RenderEvent};
pub use stream::EventStream;
pub use wire::*;
pub use writer::EventBatchWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_in_order() {
        let mut writer = EventBatchWriter::new();
        let desc = TexturePayload {
            width: 2,
            height: 2,
            mip_levels: 1,
            array_layers: 1,
            format: 3,
        };
        writer.create_texture(5, &desc, &[7u8; 16]);
        writer.destroy_texture(5);
        writer.update_entity_flags(9, 0b11);
        let batch = writer.finish();

        let events: Vec<_> = EventReader::new(&batch).collect();
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].event_type, RenderEventType::CreateTexture);
        assert_eq!(events[0].index, 5);
        assert_eq!(events[0].read::<TexturePayload>(), desc);
        assert_eq!(events[0].trailing::<TexturePayload>(), &[7u8; 16]);

        assert_eq!(events[1].event_type, RenderEventType::DestroyTexture);
        assert!(events[1].payload.is_empty());

        assert_eq!(events[2].read::<u32>(), 0b11);
    }

    #[test]
    fn test_debug_lines_payload() {
        let lines = [
            DebugLine {
                start: [0.0; 3],
                end: [1.0, 0.0, 0.0],
                color: 0xff0000ff,
            },
            DebugLine::default(),
        ];
        let mut writer = EventBatchWriter::new();
        writer.set_physics_debug_lines(&lines);
        let batch = writer.finish();

        let event = EventReader::new(&batch).next().unwrap();
        let count = event.read::<u32>() as usize;
        let decoded: Vec<DebugLine> = event.trailing_records::<u32, DebugLine>(count);
        assert_eq!(decoded, lines.to_vec());
    }

    #[test]
    #[should_panic(expected = "truncated")]
    fn test_truncated_batch_panics() {
        let mut writer = EventBatchWriter::new();
        writer.update_entity_transform(1, &Transform3x4::IDENTITY);
        let batch = writer.finish();
        let cut = &batch[..batch.len() - 4];
        let _ = EventReader::new(cut).count();
    }
}
