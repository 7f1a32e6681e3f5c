//! Blocking synchronization primitives on pthreads
//!
//! - [`Mutex`] - recursive mutual exclusion with scoped guards
//! - [`Condition`] - condition variable bound to one mutex
//! - [`Semaphore`] - counting semaphore built on the two above

mod mutex;
mod condition;
mod semaphore;

pub use mutex::{Mutex, MutexGuard, TryLockResult};
pub use condition::Condition;
pub use semaphore::Semaphore;

use nix::errno::Errno;
use tasker_core::{ThreadError, ThreadResult};

/// Map a pthread return code to a result
#[inline]
pub(crate) fn check(rc: libc::c_int, op: &'static str, what: &str) -> ThreadResult<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(os_error(rc, op, what))
    }
}

pub(crate) fn os_error(rc: libc::c_int, op: &'static str, what: &str) -> ThreadError {
    ThreadError::os(op, format!("{} failed ({})", what, Errno::from_raw(rc).desc()), rc)
}
