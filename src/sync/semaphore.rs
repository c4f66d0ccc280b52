use crate::error::BackendResult;
use crate::gfx::{GfxBackend, QueueType, SemaphoreId};

/// A named timeline semaphore.
///
/// Values only grow. [`signal`](Self::signal) always uses the next value, so
/// the protocol can never signal a value twice or go backwards.
#[derive(Debug)]
pub struct SemaphoreTimeline {
    name: &'static str,
    id: SemaphoreId,
    last_signaled: u64,
}

impl SemaphoreTimeline {
    /// Create a timeline starting at zero.
    pub fn new(backend: &dyn GfxBackend, name: &'static str) -> BackendResult<Self> {
        let id = backend.create_semaphore(0)?;
        Ok(Self {
            name,
            id,
            last_signaled: 0,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> SemaphoreId {
        self.id
    }

    /// Last value handed to `queue_signal`.
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }

    /// Signal the next value on `queue` and return it.
    pub fn signal(&mut self, backend: &dyn GfxBackend, queue: QueueType) -> u64 {
        self.last_signaled += 1;
        log::trace!("{queue:?} signals `{}` = {}", self.name, self.last_signaled);
        backend.queue_signal(queue, self.id, self.last_signaled);
        self.last_signaled
    }

    /// Make `queue`'s next submission wait for `value`.
    pub fn wait(&self, backend: &dyn GfxBackend, queue: QueueType, value: u64) {
        debug_assert!(
            value <= self.last_signaled,
            "`{}` waited for {value} before it was signaled (last {})",
            self.name,
            self.last_signaled
        );
        backend.queue_wait(queue, self.id, value);
    }

    /// Block the CPU until `value` is reached. Zero never blocks.
    pub fn cpu_wait(&self, backend: &dyn GfxBackend, value: u64) {
        if value == 0 {
            return;
        }
        backend.wait_semaphore(self.id, value);
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        backend.destroy_semaphore(self.id);
    }
}

/// The timelines one renderer uses across all of its frames.
#[derive(Debug)]
pub struct QueueSemaphores {
    /// Signaled once per frame after the swapchain pass.
    pub frame: SemaphoreTimeline,
    /// Signaled by the transfer queue after uploads.
    pub copy: SemaphoreTimeline,
    /// Graphics ↔ compute rendezvous around SSAO.
    pub ssao: SemaphoreTimeline,
    /// Graphics ↔ compute rendezvous around bloom.
    pub lighting: SemaphoreTimeline,
}

impl QueueSemaphores {
    /// Create all four timelines, destroying the ones already created if a
    /// later one fails.
    pub fn new(backend: &dyn GfxBackend) -> BackendResult<Self> {
        let mut created: Vec<SemaphoreTimeline> = Vec::with_capacity(4);
        for name in ["frame", "copy", "ssao", "lighting"] {
            match SemaphoreTimeline::new(backend, name) {
                Ok(timeline) => created.push(timeline),
                Err(err) => {
                    created.iter().for_each(|t| t.destroy(backend));
                    return Err(err);
                }
            }
        }
        let mut created = created.into_iter();
        let mut next = || match created.next() {
            Some(timeline) => timeline,
            None => unreachable!("four timelines were created"),
        };
        Ok(Self {
            frame: next(),
            copy: next(),
            ssao: next(),
            lighting: next(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SemaphoreTimeline> {
        [&self.frame, &self.copy, &self.ssao, &self.lighting].into_iter()
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        self.iter().for_each(|timeline| timeline.destroy(backend));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::DummyBackend;

    #[test]
    fn test_signal_values_increase() {
        let backend = DummyBackend::new();
        let mut timeline = SemaphoreTimeline::new(&backend, "test").unwrap();
        let first = timeline.signal(&backend, QueueType::Graphics);
        let second = timeline.signal(&backend, QueueType::Compute);
        assert!(second > first);
        assert_eq!(backend.semaphore_value(timeline.id()), second);
    }

    #[test]
    fn test_cpu_wait_zero_is_free() {
        let backend = DummyBackend::new();
        let timeline = SemaphoreTimeline::new(&backend, "frame").unwrap();
        timeline.cpu_wait(&backend, 0);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_queue_semaphores_destroyed() {
        let backend = DummyBackend::new();
        let semaphores = QueueSemaphores::new(&backend).unwrap();
        let names: Vec<_> = semaphores.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["frame", "copy", "ssao", "lighting"]);
        semaphores.destroy(&backend);
        assert_eq!(backend.live_object_count(), 0);
    }
}
