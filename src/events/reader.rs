use bytemuck::Pod;

use super::wire::{RenderEventHeader, RenderEventType};

const HEADER_SIZE: usize = std::mem::size_of::<RenderEventHeader>();

/// One decoded record borrowing its payload from the batch.
#[derive(Debug, Clone, Copy)]
pub struct RenderEvent<'a> {
    pub event_type: RenderEventType,
    pub index: u32,
    pub payload: &'a [u8],
}

impl<'a> RenderEvent<'a> {
    /// Read the leading payload struct.
    ///
    /// # Panics
    ///
    /// Panics if the payload is shorter than `T`.
    pub fn read<T: Pod>(&self) -> T {
        let size = std::mem::size_of::<T>();
        assert!(
            self.payload.len() >= size,
            "{:?} payload is {} bytes, expected at least {}",
            self.event_type,
            self.payload.len(),
            size
        );
        bytemuck::pod_read_unaligned(&self.payload[..size])
    }

    /// Bytes following the leading payload struct `T`.
    pub fn trailing<T: Pod>(&self) -> &'a [u8] {
        &self.payload[std::mem::size_of::<T>()..]
    }

    /// Decode `count` trailing records of type `R` after a leading `T`.
    pub fn trailing_records<T: Pod, R: Pod>(&self, count: usize) -> Vec<R> {
        let bytes = self.trailing::<T>();
        let size = std::mem::size_of::<R>();
        assert!(
            bytes.len() >= count * size,
            "{:?} payload truncated: {} records of {} bytes do not fit in {}",
            self.event_type,
            count,
            size,
            bytes.len()
        );
        bytes
            .chunks_exact(size)
            .take(count)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

/// Forward-only cursor over one event batch.
///
/// A truncated header or payload, or an unknown event type, is a schema
/// violation between the simulation and render sides and panics.
#[derive(Debug, Clone)]
pub struct EventReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> EventReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }
}

impl<'a> Iterator for EventReader<'a> {
    type Item = RenderEvent<'a>;

    fn next(&mut self) -> Option<RenderEvent<'a>> {
        if self.cursor == self.bytes.len() {
            return None;
        }
        assert!(
            self.remaining() >= HEADER_SIZE,
            "truncated event header at byte {}",
            self.cursor
        );
        let header: RenderEventHeader =
            bytemuck::pod_read_unaligned(&self.bytes[self.cursor..self.cursor + HEADER_SIZE]);
        self.cursor += HEADER_SIZE;

        let event_type = RenderEventType::from_raw(header.event_type)
            .unwrap_or_else(|| panic!("unknown render event type {}", header.event_type));
        let size = header.payload_size as usize;
        assert!(
            self.remaining() >= size,
            "truncated {event_type:?} payload: {size} bytes announced, {} left",
            self.remaining()
        );
        let payload = &self.bytes[self.cursor..self.cursor + size];
        self.cursor += size;

        Some(RenderEvent {
            event_type,
            index: header.index,
            payload,
        })
    }
}
