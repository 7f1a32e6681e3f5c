//! Recursive mutex
//!
//! A `PTHREAD_MUTEX_RECURSIVE` mutex guarding a value. The owning thread
//! may lock it again; each lock is released by dropping its guard, and
//! the mutex becomes available to other threads once the outermost guard
//! is gone.
//!
//! Because a second guard can exist on the same thread, guards only hand
//! out `&T`. Put a `Cell` or `RefCell` inside for mutable state, the same
//! way `std`'s reentrant lock is used.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tasker_core::{kwarn, TimeSource, ThreadResult};

use super::{check, os_error};
use crate::clock::clock;
use crate::config::runtime_config;

/// Recursive mutual-exclusion lock around a `T`
pub struct Mutex<T = ()> {
    // Boxed so the pthread object never moves once initialized
    raw: Box<UnsafeCell<libc::pthread_mutex_t>>,
    /// Recursion depth of the owner, written only by the owner
    depth: AtomicU32,
    data: T,
}

// Safety: the pthread mutex serializes access to `data` across threads;
// same-thread re-entry only ever yields shared references.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

/// Outcome of a non-blocking or bounded lock attempt
pub enum TryLockResult<'a, T> {
    /// Lock acquired
    Locked(MutexGuard<'a, T>),
    /// Held by another thread (until the deadline, for timed attempts)
    Busy,
}

impl<'a, T> TryLockResult<'a, T> {
    #[inline]
    pub fn is_locked(&self) -> bool {
        matches!(self, TryLockResult::Locked(_))
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        matches!(self, TryLockResult::Busy)
    }

    /// Convert to `Option`, `None` when busy
    #[inline]
    pub fn guard(self) -> Option<MutexGuard<'a, T>> {
        match self {
            TryLockResult::Locked(g) => Some(g),
            TryLockResult::Busy => None,
        }
    }
}

impl<T> Mutex<T> {
    /// Create a recursive mutex around `value`
    pub fn new(value: T) -> ThreadResult<Self> {
        const OP: &str = "Mutex::new";
        // Safety: zeroed storage is immediately initialized by
        // pthread_mutex_init below; the attribute object is initialized
        // before use and destroyed on every path.
        unsafe {
            let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
            check(libc::pthread_mutexattr_init(&mut attr), OP, "pthread_mutexattr_init")?;
            let rc = libc::pthread_mutexattr_settype(&mut attr, libc::PTHREAD_MUTEX_RECURSIVE);
            if rc != 0 {
                libc::pthread_mutexattr_destroy(&mut attr);
                return Err(os_error(rc, OP, "pthread_mutexattr_settype"));
            }

            let raw = Box::new(UnsafeCell::new(std::mem::zeroed()));
            let rc = libc::pthread_mutex_init(raw.get(), &attr);
            libc::pthread_mutexattr_destroy(&mut attr);
            check(rc, OP, "pthread_mutex_init")?;

            Ok(Self {
                raw,
                depth: AtomicU32::new(0),
                data: value,
            })
        }
    }

    /// Block until the lock is held by the calling thread.
    ///
    /// Succeeds immediately if the caller already holds it.
    pub fn lock(&self) -> ThreadResult<MutexGuard<'_, T>> {
        // Safety: raw was initialized in new() and is destroyed only in drop
        let rc = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
        check(rc, "Mutex::lock", "pthread_mutex_lock")?;
        Ok(self.acquired())
    }

    /// Acquire without blocking.
    ///
    /// Unexpected native failures are logged and reported as `Busy`.
    pub fn try_lock(&self) -> TryLockResult<'_, T> {
        // Safety: see lock()
        match unsafe { libc::pthread_mutex_trylock(self.raw.get()) } {
            0 => TryLockResult::Locked(self.acquired()),
            libc::EBUSY => TryLockResult::Busy,
            rc => {
                kwarn!("{}", os_error(rc, "Mutex::try_lock", "pthread_mutex_trylock"));
                TryLockResult::Busy
            }
        }
    }

    /// Try to acquire until `timeout` elapses.
    ///
    /// Polls `try_lock`, yielding for the configured number of attempts
    /// and then sleeping the configured backoff between attempts. A zero
    /// timeout makes exactly one attempt.
    pub fn timed_try_lock(&self, timeout: Duration) -> TryLockResult<'_, T> {
        let config = runtime_config();
        let deadline = clock().deadline(timeout);
        let mut attempts: u32 = 0;
        loop {
            if let TryLockResult::Locked(guard) = self.try_lock() {
                return TryLockResult::Locked(guard);
            }
            let remaining = clock().remaining(deadline);
            if remaining.is_zero() {
                return TryLockResult::Busy;
            }
            if attempts < config.lock_spins {
                attempts += 1;
                std::thread::yield_now();
            } else {
                std::thread::sleep(remaining.min(config.lock_backoff));
            }
        }
    }

    /// Check if some thread currently holds the lock (a hint; it may
    /// change immediately after returning)
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.depth.load(Ordering::Relaxed) > 0
    }

    /// Recursion depth, exact when called by the owning thread
    #[inline]
    pub fn lock_depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    /// Mutable access without locking; `&mut self` proves exclusivity
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn into_inner(self) -> T {
        let this = std::mem::ManuallyDrop::new(self);
        // Safety: `this` is never used again after these reads, and the
        // raw mutex is destroyed exactly once below.
        unsafe {
            let raw = std::ptr::read(&this.raw);
            let data = std::ptr::read(&this.data);
            libc::pthread_mutex_destroy(raw.get());
            data
        }
    }

    #[inline]
    pub(super) fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.raw.get()
    }

    #[inline]
    pub(super) fn set_depth(&self, depth: u32) {
        self.depth.store(depth, Ordering::Relaxed);
    }

    fn acquired(&self) -> MutexGuard<'_, T> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    fn release(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        // Safety: called only from a guard, so this thread holds the lock
        let rc = unsafe { libc::pthread_mutex_unlock(self.raw.get()) };
        debug_assert_eq!(rc, 0, "pthread_mutex_unlock failed");
    }
}

impl<T> Drop for Mutex<T> {
    fn drop(&mut self) {
        // Safety: no guard can outlive the borrow, so the mutex is unlocked
        let rc = unsafe { libc::pthread_mutex_destroy(self.raw.get()) };
        if rc != 0 {
            kwarn!("{}", os_error(rc, "Mutex::drop", "pthread_mutex_destroy"));
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("depth", &self.lock_depth())
            .finish_non_exhaustive()
    }
}

/// Scoped ownership of a [`Mutex`]; releases one level on drop
///
/// Must be dropped on the thread that acquired it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct MutexGuard<'a, T> {
    pub(super) mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.mutex.data
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_recursive_lock() {
        let m = Mutex::new(Cell::new(0)).unwrap();
        let outer = m.lock().unwrap();
        outer.set(1);
        {
            let inner = m.lock().unwrap();
            assert_eq!(m.lock_depth(), 2);
            inner.set(inner.get() + 1);
        }
        assert_eq!(m.lock_depth(), 1);
        assert_eq!(outer.get(), 2);
        drop(outer);
        assert!(!m.is_locked());
    }

    #[test]
    fn test_try_lock_same_thread_recurses() {
        let m = Mutex::new(()).unwrap();
        let _g = m.lock().unwrap();
        assert!(m.try_lock().is_locked());
        assert!(m.timed_try_lock(Duration::ZERO).is_locked());
    }

    #[test]
    fn test_try_lock_busy_from_other_thread() {
        let m = Arc::new(Mutex::new(()).unwrap());
        let _g = m.lock().unwrap();
        let m2 = Arc::clone(&m);
        let busy = std::thread::spawn(move || m2.try_lock().is_busy()).join().unwrap();
        assert!(busy);
    }

    #[test]
    fn test_timed_try_lock_zero_timeout_is_single_attempt() {
        let m = Arc::new(Mutex::new(()).unwrap());
        let _g = m.lock().unwrap();
        let m2 = Arc::clone(&m);
        let (busy, elapsed) = std::thread::spawn(move || {
            let start = Instant::now();
            let busy = m2.timed_try_lock(Duration::ZERO).is_busy();
            (busy, start.elapsed())
        })
        .join()
        .unwrap();
        assert!(busy);
        assert!(elapsed < Duration::from_millis(50));
    }

    #[test]
    fn test_timed_try_lock_waits_for_release() {
        let m = Arc::new(Mutex::new(Cell::new(0u32)).unwrap());
        let (tx, rx) = std::sync::mpsc::channel();
        let m2 = Arc::clone(&m);
        let holder = std::thread::spawn(move || {
            let g = m2.lock().unwrap();
            tx.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(30));
            g.set(7);
        });
        rx.recv().unwrap();
        let guard = m.timed_try_lock(Duration::from_secs(5)).guard().unwrap();
        assert_eq!(guard.get(), 7);
        drop(guard);
        holder.join().unwrap();
    }

    #[test]
    fn test_get_mut_and_into_inner() {
        let mut m = Mutex::new(vec![1, 2]).unwrap();
        m.get_mut().push(3);
        assert_eq!(m.into_inner(), vec![1, 2, 3]);
    }
}
