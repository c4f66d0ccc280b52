use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// FIFO of event batches shared by the simulation and render threads.
///
/// Any number of producers push finished batches. The render thread is the
/// only consumer: it peeks the front batch, decodes it outside the lock and
/// pops it only once every record has been applied. Batches are never merged
/// or reordered.
#[derive(Debug, Default)]
pub struct EventStream {
    batches: Mutex<VecDeque<Arc<[u8]>>>,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a finished batch. Empty batches are dropped.
    pub fn push_batch(&self, batch: Arc<[u8]>) {
        if batch.is_empty() {
            return;
        }
        self.batches.lock().push_back(batch);
    }

    /// Number of batches waiting to be consumed.
    pub fn pending_batches(&self) -> usize {
        self.batches.lock().len()
    }

    /// The oldest batch, left in the queue.
    pub fn front(&self) -> Option<Arc<[u8]>> {
        self.batches.lock().front().cloned()
    }

    /// Pop the front batch once it has been fully consumed.
    pub fn pop_front(&self, consumed: &Arc<[u8]>) {
        let popped = self.batches.lock().pop_front();
        debug_assert!(
            popped.as_ref().is_some_and(|batch| Arc::ptr_eq(batch, consumed)),
            "popped a batch other than the one consumed"
        );
    }

    /// Consume every batch queued at entry, oldest first.
    ///
    /// Batches pushed while draining wait for the next call. Returns the
    /// number of batches consumed.
    pub fn drain(&self, mut consume: impl FnMut(&[u8])) -> usize {
        let queued = self.pending_batches();
        let mut drained = 0;
        while drained < queued {
            let Some(batch) = self.front() else {
                break;
            };
            consume(&batch);
            self.pop_front(&batch);
            drained += 1;
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_consumed_in_order() {
        let stream = EventStream::new();
        stream.push_batch(Arc::from(vec![1u8]));
        stream.push_batch(Arc::from(vec![2u8, 2]));
        let mut seen = Vec::new();
        let drained = stream.drain(|batch| seen.push(batch.to_vec()));
        assert_eq!(drained, 2);
        assert_eq!(seen, vec![vec![1], vec![2, 2]]);
        assert_eq!(stream.pending_batches(), 0);
    }

    #[test]
    fn test_batches_pushed_while_draining_wait() {
        let stream = EventStream::new();
        stream.push_batch(Arc::from(vec![1u8]));
        stream.push_batch(Arc::from(vec![2u8]));
        let drained = stream.drain(|batch| stream.push_batch(Arc::from(vec![batch[0] + 10])));
        assert_eq!(drained, 2);
        assert_eq!(stream.pending_batches(), 2);
        assert_eq!(stream.front().as_deref(), Some(&[11u8][..]));
    }

    #[test]
    fn test_empty_batch_ignored() {
        let stream = EventStream::new();
        stream.push_batch(Arc::from(Vec::<u8>::new()));
        assert_eq!(stream.pending_batches(), 0);
    }

    #[test]
    fn test_concurrent_producers() {
        let stream = Arc::new(EventStream::new());
        let handles: Vec<_> = (0..4u8)
            .map(|id| {
                let stream = Arc::clone(&stream);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        stream.push_batch(Arc::from(vec![id]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stream.drain(|_| {}), 40);
    }
}
