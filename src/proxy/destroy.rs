//! Frame-safe deferred destruction.
//!
//! A hardware handle released during render frame `F` may still be referenced
//! by command buffers of frames `F - BACK_BUFFER_COUNT + 1 ..= F`. It is
//! therefore parked in a destroy bucket and only handed to the backend once
//! frame `F` is known to have retired.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ DestroyBuckets (BACK_BUFFER_COUNT + 1 ring) │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐   │
//! │  │ bucket 0 │  │ bucket 1 │  │ bucket 2 │   │
//! │  └──────────┘  └──────────┘  └──────────┘   │
//! └─────────────────────────────────────────────┘
//!
//! schedule(F, h): bucket[F % (N+1)].push(h)
//! flush(G):       if G >= N { destroy bucket[(G - N) % (N+1)] }
//! ```
//!
//! `flush(G)` runs after the render thread waited for the frame slot of `G`,
//! which was last used by frame `G - N`. Every handle in that bucket was
//! released during frame `G - N` and is no longer referenced.

use crate::config::{BACK_BUFFER_COUNT, DESTROY_BUCKET_COUNT};
use crate::gfx::{BindGroupId, BufferId, GfxBackend, PipelineId, SamplerId, TextureId};

/// A hardware handle awaiting destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestroyEntry {
    Texture(TextureId),
    Buffer(BufferId),
    Sampler(SamplerId),
    BindGroup(BindGroupId),
    Pipeline(PipelineId),
}

impl DestroyEntry {
    fn destroy(self, backend: &dyn GfxBackend) {
        match self {
            Self::Texture(texture) => backend.destroy_texture(texture),
            Self::Buffer(buffer) => backend.destroy_buffer(buffer),
            Self::Sampler(sampler) => backend.destroy_sampler(sampler),
            Self::BindGroup(group) => backend.destroy_bind_group(group),
            Self::Pipeline(pipeline) => backend.destroy_pipeline(pipeline),
        }
    }

    fn is_null(self) -> bool {
        match self {
            Self::Texture(id) => id.is_null(),
            Self::Buffer(id) => id.is_null(),
            Self::Sampler(id) => id.is_null(),
            Self::BindGroup(id) => id.is_null(),
            Self::Pipeline(id) => id.is_null(),
        }
    }
}

/// Ring of `BACK_BUFFER_COUNT + 1` destroy buckets.
#[derive(Debug, Default)]
pub struct DestroyBuckets {
    buckets: [Vec<DestroyEntry>; DESTROY_BUCKET_COUNT],
}

impl DestroyBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket index that handles released during `render_frame` go to.
    #[inline]
    pub fn bucket_for(render_frame: u64) -> usize {
        (render_frame % DESTROY_BUCKET_COUNT as u64) as usize
    }

    /// Park `entry` until `render_frame` retires. Null handles are ignored.
    pub fn schedule(&mut self, render_frame: u64, entry: DestroyEntry) {
        if entry.is_null() {
            return;
        }
        let bucket = Self::bucket_for(render_frame);
        log::trace!("Scheduling {entry:?} for destruction in bucket {bucket} (frame {render_frame})");
        self.buckets[bucket].push(entry);
    }

    /// Destroy the bucket whose frame retired before `render_frame` began.
    ///
    /// Returns the number of handles destroyed.
    pub fn flush(&mut self, render_frame: u64, backend: &dyn GfxBackend) -> usize {
        let Some(retired) = render_frame.checked_sub(BACK_BUFFER_COUNT as u64) else {
            return 0;
        };
        let bucket = Self::bucket_for(retired);
        let entries = std::mem::take(&mut self.buckets[bucket]);
        if !entries.is_empty() {
            log::trace!(
                "Frame {render_frame}: destroying {} handles released in frame {retired}",
                entries.len()
            );
        }
        let count = entries.len();
        entries.into_iter().for_each(|entry| entry.destroy(backend));
        count
    }

    /// Destroy every bucket. The device must be idle.
    pub fn flush_all(&mut self, backend: &dyn GfxBackend) -> usize {
        let mut total = 0;
        for bucket in &mut self.buckets {
            total += bucket.len();
            bucket.drain(..).for_each(|entry| entry.destroy(backend));
        }
        if total > 0 {
            log::debug!("Flushed {total} pending destroys");
        }
        total
    }

    /// Entries parked in `bucket`.
    pub fn bucket(&self, bucket: usize) -> &[DestroyEntry] {
        &self.buckets[bucket]
    }

    /// Total number of parked entries.
    pub fn pending(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{BufferDesc, DummyBackend};

    fn buffer(backend: &DummyBackend) -> BufferId {
        backend.create_buffer(&BufferDesc::staging("b", 16)).unwrap()
    }

    #[test]
    fn test_not_destroyed_before_retirement() {
        let backend = DummyBackend::new();
        let mut buckets = DestroyBuckets::new();
        let handle = buffer(&backend);

        buckets.schedule(5, DestroyEntry::Buffer(handle));
        for frame in 5..5 + BACK_BUFFER_COUNT as u64 {
            buckets.flush(frame, &backend);
            assert!(backend.is_buffer_live(handle), "destroyed early at frame {frame}");
        }
        assert_eq!(buckets.flush(5 + BACK_BUFFER_COUNT as u64, &backend), 1);
        assert!(!backend.is_buffer_live(handle));
    }

    #[test]
    fn test_early_frames_flush_nothing() {
        let backend = DummyBackend::new();
        let mut buckets = DestroyBuckets::new();
        buckets.schedule(0, DestroyEntry::Buffer(buffer(&backend)));
        assert_eq!(buckets.flush(0, &backend), 0);
        assert_eq!(buckets.pending(), 1);
    }

    #[test]
    fn test_null_entries_ignored() {
        let mut buckets = DestroyBuckets::new();
        buckets.schedule(1, DestroyEntry::Texture(TextureId::NULL));
        assert_eq!(buckets.pending(), 0);
    }

    #[test]
    fn test_flush_all() {
        let backend = DummyBackend::new();
        let mut buckets = DestroyBuckets::new();
        for frame in 0..DESTROY_BUCKET_COUNT as u64 {
            buckets.schedule(frame, DestroyEntry::Buffer(buffer(&backend)));
        }
        assert_eq!(buckets.flush_all(&backend), DESTROY_BUCKET_COUNT);
        assert_eq!(backend.live_object_count(), 0);
    }
}
