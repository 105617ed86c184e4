//! Bounded task queues with byte-budget backpressure.
//!
//! Built on `crossbeam-queue::ArrayQueue` for the lock-free item bound,
//! with an atomic byte counter on top: revision texts vary by orders of
//! magnitude, so item count alone is not a usable memory bound.
//!
//! Blocking pushes and pops poll with a short sleep up to a deadline;
//! plain synchronous threads, no async runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;

/// Poll interval for deadline-bounded waits.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Items that declare their (estimated) encoded size.
pub trait ByteSized {
    fn byte_size(&self) -> usize;
}

/// A bounded queue accounting both items and bytes.
///
/// An item is admitted when there is a free slot and the byte budget
/// holds — except that an item larger than the whole budget is admitted
/// into an empty queue, so oversized tasks still make progress.
#[derive(Debug)]
pub struct TaskQueue<T: ByteSized> {
    items: ArrayQueue<T>,
    bytes: AtomicUsize,
    max_bytes: usize,
}

impl<T: ByteSized> TaskQueue<T> {
    /// Creates a queue with the given item capacity and byte budget.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            items: ArrayQueue::new(capacity),
            bytes: AtomicUsize::new(0),
            max_bytes,
        }
    }

    /// Attempts to enqueue without blocking; hands the item back when the
    /// queue is full or over its byte budget.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let size = item.byte_size();
        let over_budget = self.bytes.load(Ordering::Acquire) + size > self.max_bytes;
        if over_budget && !self.items.is_empty() {
            return Err(item);
        }
        match self.items.push(item) {
            Ok(()) => {
                self.bytes.fetch_add(size, Ordering::AcqRel);
                Ok(())
            }
            Err(item) => Err(item),
        }
    }

    /// Blocks until the item is enqueued or the deadline passes; the item
    /// is handed back on timeout so the caller can retry or escalate.
    pub fn push_timeout(&self, mut item: T, timeout: Duration) -> Result<(), T> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.try_push(item) {
                Ok(()) => return Ok(()),
                Err(back) => {
                    if Instant::now() >= deadline {
                        return Err(back);
                    }
                    item = back;
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    /// Dequeues without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.items.pop()?;
        self.bytes.fetch_sub(item.byte_size(), Ordering::AcqRel);
        Some(item)
    }

    /// Blocks until an item arrives or the deadline passes.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current byte accounting across queued items.
    pub fn byte_len(&self) -> usize {
        self.bytes.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Sized(usize);

    impl ByteSized for Sized {
        fn byte_size(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn push_pop_tracks_bytes() {
        let q = TaskQueue::new(4, 1000);
        q.try_push(Sized(100)).unwrap();
        q.try_push(Sized(200)).unwrap();
        assert_eq!(q.byte_len(), 300);
        assert_eq!(q.try_pop(), Some(Sized(100)));
        assert_eq!(q.byte_len(), 200);
    }

    #[test]
    fn byte_budget_rejects_when_nonempty() {
        let q = TaskQueue::new(16, 500);
        q.try_push(Sized(400)).unwrap();
        let rejected = q.try_push(Sized(200)).unwrap_err();
        assert_eq!(rejected, Sized(200));
    }

    #[test]
    fn oversized_item_admitted_into_empty_queue() {
        let q = TaskQueue::new(4, 10);
        q.try_push(Sized(1_000)).unwrap();
        assert_eq!(q.byte_len(), 1_000);
    }

    #[test]
    fn item_capacity_rejects_when_full() {
        let q = TaskQueue::new(2, usize::MAX);
        q.try_push(Sized(1)).unwrap();
        q.try_push(Sized(1)).unwrap();
        assert!(q.try_push(Sized(1)).is_err());
    }

    #[test]
    fn push_timeout_expires_on_full_queue() {
        let q = TaskQueue::new(1, usize::MAX);
        q.try_push(Sized(1)).unwrap();

        let started = Instant::now();
        let result = q.push_timeout(Sized(2), Duration::from_millis(50));
        assert!(result.is_err());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn push_timeout_succeeds_when_space_frees() {
        let q = Arc::new(TaskQueue::new(1, usize::MAX));
        q.try_push(Sized(1)).unwrap();

        let q2 = Arc::clone(&q);
        let drainer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            q2.try_pop()
        });

        q.push_timeout(Sized(2), Duration::from_secs(2)).unwrap();
        assert_eq!(drainer.join().unwrap(), Some(Sized(1)));
    }

    #[test]
    fn pop_timeout_returns_none_when_idle() {
        let q: TaskQueue<Sized> = TaskQueue::new(1, 100);
        assert_eq!(q.pop_timeout(Duration::from_millis(10)), None);
    }
}
