//! FIFO queue guarded by a [`SpinLock`].

use crate::sync::SpinLock;
use crossbeam_utils::Backoff;
use std::collections::VecDeque;
use std::fmt;

/// Outcome of [`ThreadSafeQueue::try_pop`].
///
/// Lock contention and a genuinely empty queue are different outcomes:
/// retry loops must stop on [`Empty`](TryPop::Empty) but keep going on
/// [`Contended`](TryPop::Contended).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TryPop<T> {
    /// The lock was taken and the head item removed
    Popped(T),
    /// The lock was taken and the queue held nothing
    Empty,
    /// The lock was held by someone else; nothing was inspected
    Contended,
}

impl<T> TryPop<T> {
    /// Whether the lock was acquired.
    pub fn succeeded(&self) -> bool {
        !matches!(self, TryPop::Contended)
    }

    /// The conservative emptiness flag: true for both an empty queue and a
    /// failed acquisition. Only meaningful together with
    /// [`succeeded`](Self::succeeded).
    pub fn reports_empty(&self) -> bool {
        !matches!(self, TryPop::Popped(_))
    }

    /// The popped item, if any.
    pub fn into_item(self) -> Option<T> {
        match self {
            TryPop::Popped(item) => Some(item),
            _ => None,
        }
    }
}

/// A FIFO queue whose every access happens under one spin lock.
///
/// The non-blocking `try_*` operations make exactly one acquisition attempt;
/// the blocking variants are retry loops around them. Queue depths are
/// expected to stay small, so the lock is held only for a `VecDeque` push or
/// pop.
///
/// ```rust
/// use rust_job_system::queue::{ThreadSafeQueue, TryPop};
///
/// let queue = ThreadSafeQueue::new();
/// queue.push("mesh");
/// queue.push("texture");
/// assert_eq!(queue.try_pop(), TryPop::Popped("mesh"));
/// assert_eq!(queue.pop(), "texture");
/// assert_eq!(queue.try_pop(), TryPop::Empty);
/// ```
pub struct ThreadSafeQueue<T> {
    items: SpinLock<VecDeque<T>>,
}

impl<T> ThreadSafeQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: SpinLock::new(VecDeque::new()),
        }
    }

    /// Append `item` if the lock can be taken right now.
    ///
    /// On contention the item is handed back as `Err(item)`.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        match self.items.try_lock() {
            Some(mut items) => {
                items.push_back(item);
                Ok(())
            }
            None => Err(item),
        }
    }

    /// Append `item`, retrying until the lock is obtained.
    pub fn push(&self, item: T) {
        let backoff = Backoff::new();
        let mut item = item;
        loop {
            match self.try_push(item) {
                Ok(()) => return,
                Err(returned) => {
                    item = returned;
                    backoff.snooze();
                }
            }
        }
    }

    /// Remove the head item if the lock can be taken right now.
    pub fn try_pop(&self) -> TryPop<T> {
        match self.items.try_lock() {
            Some(mut items) => match items.pop_front() {
                Some(item) => TryPop::Popped(item),
                None => TryPop::Empty,
            },
            None => TryPop::Contended,
        }
    }

    /// Remove the head item, retrying until one is obtained.
    ///
    /// This never returns on a queue that nobody feeds. Callers must know the
    /// queue is non-empty, or use [`try_pop`](Self::try_pop).
    pub fn pop(&self) -> T {
        let backoff = Backoff::new();
        loop {
            if let TryPop::Popped(item) = self.try_pop() {
                return item;
            }
            backoff.snooze();
        }
    }

    /// Drop every queued item and return how many were removed.
    pub fn clear_all(&self) -> usize {
        let drained: VecDeque<T> = std::mem::take(&mut *self.items.lock());
        // Item destructors run after the lock has been released.
        drained.len()
    }

    /// Remove every queued item and return them in FIFO order.
    pub fn drain(&self) -> Vec<T> {
        let drained = std::mem::take(&mut *self.items.lock());
        drained.into()
    }

    /// Whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

impl<T> Default for ThreadSafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ThreadSafeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadSafeQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = ThreadSafeQueue::new();
        for i in 0..5 {
            queue.push(i);
        }

        assert_eq!(queue.len(), 5);
        for i in 0..5 {
            assert_eq!(queue.try_pop(), TryPop::Popped(i));
        }
        assert_eq!(queue.try_pop(), TryPop::Empty);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_ops_report_contention() {
        let queue = ThreadSafeQueue::new();
        queue.push(1);

        let guard = queue.items.lock();
        assert_eq!(queue.try_push(2), Err(2));

        let outcome = queue.try_pop();
        assert_eq!(outcome, TryPop::Contended);
        assert!(!outcome.succeeded());
        assert!(outcome.reports_empty());
        drop(guard);

        let outcome = queue.try_pop();
        assert!(outcome.succeeded());
        assert!(!outcome.reports_empty());
        assert_eq!(outcome.into_item(), Some(1));

        let outcome = queue.try_pop();
        assert!(outcome.succeeded());
        assert!(outcome.reports_empty());
    }

    #[test]
    fn test_clear_all_counts_and_drops() {
        let dropped = Arc::new(AtomicUsize::new(0));

        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let queue = ThreadSafeQueue::new();
        for _ in 0..7 {
            queue.push(Tracked(Arc::clone(&dropped)));
        }

        assert_eq!(queue.clear_all(), 7);
        assert_eq!(dropped.load(Ordering::SeqCst), 7);
        assert!(queue.is_empty());
        assert_eq!(queue.clear_all(), 0);
    }

    #[test]
    fn test_drain_returns_items_in_order() {
        let queue = ThreadSafeQueue::new();
        queue.push("a".to_string());
        queue.push("b".to_string());

        assert_eq!(queue.drain(), vec!["a".to_string(), "b".to_string()]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_blocking_pop_waits_for_producer() {
        let queue = Arc::new(ThreadSafeQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(20));
                queue.push(42);
            })
        };

        assert_eq!(queue.pop(), 42);
        producer.join().expect("producer panicked");
    }
}
