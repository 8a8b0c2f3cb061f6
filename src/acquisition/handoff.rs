// src/acquisition/handoff.rs
//! Bounded producer to consumer hand-off
//!
//! Edge handlers push into a fixed-capacity lock-free queue. When the consumer
//! falls behind, the oldest entry is overwritten and an overflow counter is
//! bumped; the consumer reports the count on its next drain. Pushing never
//! blocks and never allocates.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Shared<T> {
    queue: ArrayQueue<T>,
    overflowed: AtomicU64,
}

/// Producer end, held by the edge handler
pub struct HandoffProducer<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer end, held by the window reader
pub struct HandoffConsumer<T> {
    shared: Arc<Shared<T>>,
}

/// Create a queue holding at most `capacity` items (minimum 1)
pub fn handoff<T>(capacity: usize) -> (HandoffProducer<T>, HandoffConsumer<T>) {
    let shared = Arc::new(Shared {
        queue: ArrayQueue::new(capacity.max(1)),
        overflowed: AtomicU64::new(0),
    });
    (
        HandoffProducer { shared: shared.clone() },
        HandoffConsumer { shared },
    )
}

impl<T> Clone for HandoffProducer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> HandoffProducer<T> {
    /// Enqueue, evicting the oldest item when full. Returns false if an item was evicted.
    pub fn push(&self, item: T) -> bool {
        match self.shared.queue.force_push(item) {
            None => true,
            Some(_evicted) => {
                self.shared.overflowed.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl<T> HandoffConsumer<T> {
    /// Move every item queued at the time of the call into `sink`.
    ///
    /// Items pushed while draining are left for the next call.
    pub fn drain_into<E: Extend<T>>(&self, sink: &mut E) -> usize {
        let pending = self.shared.queue.len();
        let mut moved = 0;
        sink.extend(std::iter::from_fn(|| {
            if moved == pending {
                return None;
            }
            let item = self.shared.queue.pop()?;
            moved += 1;
            Some(item)
        }));
        moved
    }

    /// Items evicted since the last call
    pub fn take_overflow(&self) -> u64 {
        self.shared.overflowed.swap(0, Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.queue.capacity()
    }
}
