//! Test-and-set spin lock.
//!
//! Acquisition busy-waits, backing off from pure spinning to yielding the
//! thread. There is no timeout and no fairness: a holder that never releases
//! starves every other acquirer, so critical sections must stay short and must
//! never block. The lock is not reentrant; acquiring it twice on the same
//! thread deadlocks.

use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// A bare spin lock flag with explicit acquire/release.
///
/// Prefer [`SpinLock`], whose guard cannot leak a held lock.
#[derive(Default)]
pub struct RawSpinLock {
    locked: CachePadded<AtomicBool>,
}

impl RawSpinLock {
    /// Create an unlocked spin lock.
    pub const fn new() -> Self {
        Self {
            locked: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// Make a single attempt to take the lock.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Spin until the lock is held by the caller.
    pub fn acquire(&self) {
        let backoff = Backoff::new();
        while !self.try_acquire() {
            // Wait for the flag to look free before retrying the CAS.
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    /// Release the lock.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not currently held.
    pub fn release(&self) {
        let was_locked = self.locked.swap(false, Ordering::Release);
        assert!(was_locked, "released a spin lock that was not held");
    }

    /// Returns true while some thread holds the lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RawSpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// A spin lock protecting a value of type `T`.
///
/// ```rust
/// use rust_job_system::sync::SpinLock;
///
/// let lock = SpinLock::new(Vec::new());
/// lock.lock().push(1);
/// assert_eq!(lock.lock().len(), 1);
/// ```
pub struct SpinLock<T: ?Sized> {
    raw: RawSpinLock,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `raw`; only `T: Send` values may
// be handed between threads through it.
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create a new unlocked spin lock holding `value`.
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawSpinLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Consume the lock and return the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Spin until the lock is acquired and return a scoped guard.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.raw.acquire();
        SpinLockGuard { lock: self }
    }

    /// Try to acquire the lock once, without spinning.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self.raw.try_acquire() {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Returns true while some thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Mutable access without locking; the borrow checker proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("data", &&*guard).finish(),
            None => f.debug_struct("SpinLock").field("data", &"<locked>").finish(),
        }
    }
}

/// Scoped ownership of a [`SpinLock`]; the lock is released on drop,
/// including during unwinding.
#[must_use = "if unused the SpinLock will immediately unlock"]
pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held exclusively.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_raw_acquire_release() {
        let lock = RawSpinLock::new();
        assert!(!lock.is_locked());

        lock.acquire();
        assert!(lock.is_locked());
        assert!(!lock.try_acquire());

        lock.release();
        assert!(!lock.is_locked());
        assert!(lock.try_acquire());
        lock.release();
    }

    #[test]
    #[should_panic(expected = "released a spin lock that was not held")]
    fn test_release_without_acquire_panics() {
        let lock = RawSpinLock::new();
        lock.release();
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let lock = SpinLock::new(5);
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);

        let guard = lock.try_lock().expect("lock should be free");
        assert_eq!(*guard, 5);
    }

    #[test]
    fn test_guard_released_on_unwind() {
        let lock = SpinLock::new(0u32);

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut guard = lock.lock();
            *guard += 1;
            panic!("inside critical section");
        }));

        assert!(result.is_err());
        assert!(!lock.is_locked());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        let lock = Arc::new(SpinLock::new(0u64));
        let threads = 8;
        let iterations = 10_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..iterations {
                        // A non-atomic read-modify-write only stays exact
                        // under real mutual exclusion.
                        let mut guard = lock.lock();
                        let current = *guard;
                        *guard = current + 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(*lock.lock(), threads * iterations);
    }

    #[test]
    fn test_into_inner_and_get_mut() {
        let mut lock = SpinLock::new(vec![1, 2]);
        lock.get_mut().push(3);
        assert_eq!(lock.into_inner(), vec![1, 2, 3]);
    }
}
