//! Condition variable bound to a single [`Mutex`]
//!
//! Waiting releases the mutex atomically and re-acquires it before
//! returning. The caller must hold the mutex exactly once; waiting with a
//! nested lock would leave the mutex held by the waiter and is rejected.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use tasker_core::{kwarn, ThreadError, ThreadResult, TimeSource, Timespec};

use super::mutex::{Mutex, MutexGuard};
use super::{check, os_error};
use crate::clock::{clock, to_native, CONDATTR_SETCLOCK, CONDITION_CLOCK};

/// Condition variable associated with one mutex
pub struct Condition<T> {
    mutex: Arc<Mutex<T>>,
    raw: Box<UnsafeCell<libc::pthread_cond_t>>,
}

// Safety: pthread condition variables are designed for concurrent use;
// the associated mutex is shared through Arc.
unsafe impl<T: Send> Send for Condition<T> {}
unsafe impl<T: Send> Sync for Condition<T> {}

impl<T> Condition<T> {
    /// Create a condition associated with `mutex`
    pub fn new(mutex: &Arc<Mutex<T>>) -> ThreadResult<Self> {
        const OP: &str = "Condition::new";
        // Safety: storage is initialized by pthread_cond_init before use;
        // the attribute object is destroyed on every path.
        unsafe {
            let mut attr: libc::pthread_condattr_t = std::mem::zeroed();
            check(libc::pthread_condattr_init(&mut attr), OP, "pthread_condattr_init")?;
            if CONDATTR_SETCLOCK {
                if let Err(e) = set_clock(&mut attr, OP) {
                    libc::pthread_condattr_destroy(&mut attr);
                    return Err(e);
                }
            }
            let raw = Box::new(UnsafeCell::new(std::mem::zeroed()));
            let rc = libc::pthread_cond_init(raw.get(), &attr);
            libc::pthread_condattr_destroy(&mut attr);
            check(rc, OP, "pthread_cond_init")?;

            Ok(Self {
                mutex: Arc::clone(mutex),
                raw,
            })
        }
    }

    /// The associated mutex
    #[inline]
    pub fn mutex(&self) -> &Arc<Mutex<T>> {
        &self.mutex
    }

    /// Release the mutex, block until signalled, re-acquire.
    ///
    /// Spurious wakeups are possible; re-check the predicate in a loop.
    pub fn wait(&self, guard: &mut MutexGuard<'_, T>) -> ThreadResult<()> {
        self.check_guard(guard, "Condition::wait")?;
        self.mutex.set_depth(0);
        // Safety: the calling thread holds the mutex exactly once
        let rc = unsafe { libc::pthread_cond_wait(self.raw.get(), self.mutex.raw()) };
        self.mutex.set_depth(1);
        check(rc, "Condition::wait", "pthread_cond_wait")
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// Returns `true` if woken, `false` if the deadline passed.
    pub fn timed_wait(
        &self,
        guard: &mut MutexGuard<'_, T>,
        timeout: Duration,
    ) -> ThreadResult<bool> {
        self.wait_until(guard, clock().deadline(timeout))
    }

    /// Like [`wait`](Self::wait), giving up at the absolute `deadline`
    /// (read from [`clock()`](crate::clock::clock)).
    ///
    /// Returns `true` if woken, `false` if the deadline passed.
    pub fn wait_until(
        &self,
        guard: &mut MutexGuard<'_, T>,
        deadline: Timespec,
    ) -> ThreadResult<bool> {
        if deadline.is_max() {
            return self.wait(guard).map(|()| true);
        }
        self.check_guard(guard, "Condition::wait_until")?;
        let ts = to_native(deadline);
        self.mutex.set_depth(0);
        // Safety: the calling thread holds the mutex exactly once
        let rc = unsafe { libc::pthread_cond_timedwait(self.raw.get(), self.mutex.raw(), &ts) };
        self.mutex.set_depth(1);
        match rc {
            0 => Ok(true),
            libc::ETIMEDOUT => Ok(false),
            rc => Err(os_error(rc, "Condition::wait_until", "pthread_cond_timedwait")),
        }
    }

    /// Wake at least one waiter
    pub fn signal(&self) -> ThreadResult<()> {
        // Safety: raw is initialized for the lifetime of self
        let rc = unsafe { libc::pthread_cond_signal(self.raw.get()) };
        check(rc, "Condition::signal", "pthread_cond_signal")
    }

    /// Wake every waiter
    pub fn broadcast(&self) -> ThreadResult<()> {
        // Safety: raw is initialized for the lifetime of self
        let rc = unsafe { libc::pthread_cond_broadcast(self.raw.get()) };
        check(rc, "Condition::broadcast", "pthread_cond_broadcast")
    }

    fn check_guard(&self, guard: &MutexGuard<'_, T>, op: &'static str) -> ThreadResult<()> {
        if !ptr::eq(guard.mutex, Arc::as_ptr(&self.mutex)) {
            return Err(ThreadError::invalid_state(op, "guard belongs to a different mutex"));
        }
        let depth = self.mutex.lock_depth();
        if depth != 1 {
            return Err(ThreadError::invalid_state(
                op,
                format!("mutex held {} times; waiting requires exactly one", depth),
            ));
        }
        Ok(())
    }
}

impl<T> Drop for Condition<T> {
    fn drop(&mut self) {
        // Safety: nobody can be waiting while we hold &mut self
        let rc = unsafe { libc::pthread_cond_destroy(self.raw.get()) };
        if rc != 0 {
            kwarn!("{}", os_error(rc, "Condition::drop", "pthread_cond_destroy"));
        }
    }
}

/// Make the condition wait on the runtime clock
///
/// # Safety
/// `attr` must be an initialized condition attribute object.
unsafe fn set_clock(attr: &mut libc::pthread_condattr_t, op: &'static str) -> ThreadResult<()> {
    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd",
                     target_os = "netbsd", target_os = "openbsd"))] {
            let rc = libc::pthread_condattr_setclock(attr, CONDITION_CLOCK);
            check(rc, op, "pthread_condattr_setclock")
        } else {
            let _ = (attr, op, CONDITION_CLOCK);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Instant;

    #[test]
    fn test_timed_wait_times_out() {
        let m = Arc::new(Mutex::new(()).unwrap());
        let c = Condition::new(&m).unwrap();
        let mut g = m.lock().unwrap();
        let start = Instant::now();
        let woken = c.timed_wait(&mut g, Duration::from_millis(20)).unwrap();
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(m.lock_depth(), 1);
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let m = Arc::new(Mutex::new(Cell::new(false)).unwrap());
        let c = Arc::new(Condition::new(&m).unwrap());

        let c2 = Arc::clone(&c);
        let waiter = std::thread::spawn(move || {
            let mut g = c2.mutex().lock().unwrap();
            while !g.get() {
                c2.wait(&mut g).unwrap();
            }
        });

        std::thread::sleep(Duration::from_millis(10));
        {
            let g = m.lock().unwrap();
            g.set(true);
            c.broadcast().unwrap();
        }
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_rejects_nested_lock() {
        let m = Arc::new(Mutex::new(()).unwrap());
        let c = Condition::new(&m).unwrap();
        let _outer = m.lock().unwrap();
        let mut inner = m.lock().unwrap();
        let err = c.timed_wait(&mut inner, Duration::from_millis(1)).unwrap_err();
        assert_eq!(err.kind(), tasker_core::ErrorKind::InvalidState);
    }

    #[test]
    fn test_wait_rejects_foreign_guard() {
        let m = Arc::new(Mutex::new(()).unwrap());
        let other = Arc::new(Mutex::new(()).unwrap());
        let c = Condition::new(&m).unwrap();
        let mut g = other.lock().unwrap();
        assert!(c.wait(&mut g).is_err());
    }
}
