//! Thread identity type

use core::cell::Cell;
use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of an execution context
///
/// Handles are allocated from a process-wide counter and never reused, so
/// equality is a reliable "same thread" test. Threads spawned by the
/// runtime get their handle at construction; any other thread gets one
/// lazily the first time it asks for [`ThreadHandle::current`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ThreadHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: Cell<ThreadHandle> = const { Cell::new(ThreadHandle::NONE) };
}

impl ThreadHandle {
    /// Sentinel value indicating no thread
    pub const NONE: ThreadHandle = ThreadHandle(0);

    /// Allocate a fresh, never-before-used handle
    #[inline]
    pub fn allocate() -> Self {
        ThreadHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Handle of the calling thread
    pub fn current() -> Self {
        CURRENT.with(|cell| {
            let h = cell.get();
            if h.is_some() {
                return h;
            }
            let h = ThreadHandle::allocate();
            cell.set(h);
            h
        })
    }

    /// Bind `handle` as the identity of the calling thread.
    ///
    /// Called by the runtime's entry wrapper before user code runs.
    #[doc(hidden)]
    pub fn set_current(handle: ThreadHandle) {
        CURRENT.with(|cell| cell.set(handle));
    }

    /// Check if this handle identifies the calling thread
    #[inline]
    pub fn is_current(self) -> bool {
        self.is_some() && self == ThreadHandle::current()
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ThreadHandle(NONE)")
        } else {
            write!(f, "ThreadHandle({})", self.0)
        }
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

impl Default for ThreadHandle {
    fn default() -> Self {
        ThreadHandle::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_uniqueness() {
        let h1 = ThreadHandle::allocate();
        let h2 = ThreadHandle::allocate();
        assert_ne!(h1, h2);
        assert!(h1.is_some());
        assert!(ThreadHandle::NONE.is_none());
    }

    #[test]
    fn test_current_is_stable_per_thread() {
        let here = ThreadHandle::current();
        assert_eq!(here, ThreadHandle::current());
        assert!(here.is_current());

        let there = std::thread::spawn(ThreadHandle::current).join().unwrap();
        assert_ne!(here, there);
        assert!(!there.is_current());
    }

    #[test]
    fn test_set_current() {
        std::thread::spawn(|| {
            let h = ThreadHandle::allocate();
            ThreadHandle::set_current(h);
            assert_eq!(ThreadHandle::current(), h);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ThreadHandle::NONE), "none");
        assert_eq!(format!("{:?}", ThreadHandle::NONE), "ThreadHandle(NONE)");
    }
}
