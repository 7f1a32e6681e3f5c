//! Counting semaphore
//!
//! A non-negative counter guarded by a [`Mutex`] with a [`Condition`]
//! signalled on every post.

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use tasker_core::constants::SEMAPHORE_MAX_INITIAL;
use tasker_core::{ThreadError, ThreadResult, TimeSource};

use super::{Condition, Mutex};
use crate::clock::clock;

/// Counting semaphore
pub struct Semaphore {
    count: Arc<Mutex<Cell<u32>>>,
    available: Condition<Cell<u32>>,
}

impl Semaphore {
    /// Create a semaphore holding `initial` units.
    ///
    /// Fails with `BadValue` above [`SEMAPHORE_MAX_INITIAL`].
    pub fn new(initial: u32) -> ThreadResult<Self> {
        if initial > SEMAPHORE_MAX_INITIAL {
            return Err(ThreadError::bad_value(
                "Semaphore::new",
                format!("initial count {} exceeds {}", initial, SEMAPHORE_MAX_INITIAL),
            ));
        }
        Self::with_count(initial)
    }

    fn with_count(initial: u32) -> ThreadResult<Self> {
        let count = Arc::new(Mutex::new(Cell::new(initial))?);
        let available = Condition::new(&count)?;
        Ok(Self { count, available })
    }

    /// Take one unit, blocking while the count is zero
    pub fn wait(&self) -> ThreadResult<()> {
        let mut guard = self.count.lock()?;
        while guard.get() == 0 {
            self.available.wait(&mut guard)?;
        }
        guard.set(guard.get() - 1);
        Ok(())
    }

    /// Take one unit if available; never blocks
    pub fn try_wait(&self) -> ThreadResult<bool> {
        let guard = self.count.lock()?;
        let n = guard.get();
        if n == 0 {
            return Ok(false);
        }
        guard.set(n - 1);
        Ok(true)
    }

    /// Take one unit, waiting at most `timeout`.
    ///
    /// Returns `true` if a unit was taken.
    pub fn timed_wait(&self, timeout: Duration) -> ThreadResult<bool> {
        let deadline = clock().deadline(timeout);
        let mut guard = self.count.lock()?;
        loop {
            let n = guard.get();
            if n > 0 {
                guard.set(n - 1);
                return Ok(true);
            }
            if !self.available.wait_until(&mut guard, deadline)? && guard.get() == 0 {
                return Ok(false);
            }
        }
    }

    /// Return one unit and wake a waiter.
    ///
    /// Fails with `BadValue` if the counter would overflow.
    pub fn post(&self) -> ThreadResult<()> {
        let guard = self.count.lock()?;
        let n = guard.get();
        let next = n
            .checked_add(1)
            .ok_or_else(|| ThreadError::bad_value("Semaphore::post", "semaphore count overflow"))?;
        guard.set(next);
        self.available.signal()
    }

    /// Current count (a snapshot)
    pub fn value(&self) -> ThreadResult<u32> {
        Ok(self.count.lock()?.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[test]
    fn test_initial_bound() {
        assert!(Semaphore::new(SEMAPHORE_MAX_INITIAL).is_ok());
        let err = Semaphore::new(SEMAPHORE_MAX_INITIAL + 1).err().unwrap();
        assert_eq!(err.kind(), tasker_core::ErrorKind::BadValue);
    }

    #[test]
    fn test_post_overflow() {
        let s = Semaphore::with_count(u32::MAX - 1).unwrap();
        s.post().unwrap();
        assert_eq!(s.value().unwrap(), u32::MAX);
        let err = s.post().unwrap_err();
        assert_eq!(err.kind(), tasker_core::ErrorKind::BadValue);
        assert_eq!(err.op(), "Semaphore::post");
        assert_eq!(s.value().unwrap(), u32::MAX);
        assert!(s.try_wait().unwrap());
        s.post().unwrap();
    }

    #[test]
    fn test_try_wait_and_post() {
        let s = Semaphore::new(1).unwrap();
        assert!(s.try_wait().unwrap());
        assert!(!s.try_wait().unwrap());
        s.post().unwrap();
        assert_eq!(s.value().unwrap(), 1);
    }

    #[test]
    fn test_timed_wait_expires() {
        let s = Semaphore::new(0).unwrap();
        let start = Instant::now();
        assert!(!s.timed_wait(Duration::from_millis(20)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_bounds_concurrent_holders() {
        let s = Arc::new(Semaphore::new(2).unwrap());
        let inside = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let workers: Vec<_> = (0..6)
            .map(|_| {
                let (s, inside, peak) = (Arc::clone(&s), Arc::clone(&inside), Arc::clone(&peak));
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        s.wait().unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        s.post().unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(s.value().unwrap(), 2);
    }
}
