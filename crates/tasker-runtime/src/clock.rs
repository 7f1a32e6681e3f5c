//! System clock
//!
//! Deadlines handed to `Condition::wait_until` must be read from the same
//! clock the condition variable waits on. On platforms that support
//! `pthread_condattr_setclock` that is the monotonic clock; elsewhere
//! condition variables are stuck with the realtime clock.

use nix::time::{clock_gettime, ClockId};
use tasker_core::{TimeSource, Timespec};

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd",
                 target_os = "netbsd", target_os = "openbsd"))] {
        pub(crate) const CONDITION_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;
        pub(crate) const CONDATTR_SETCLOCK: bool = true;
    } else {
        pub(crate) const CONDITION_CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;
        pub(crate) const CONDATTR_SETCLOCK: bool = false;
    }
}

/// Clock backing every deadline in the runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timespec {
        match clock_gettime(ClockId::from_raw(CONDITION_CLOCK)) {
            Ok(ts) => Timespec::new(ts.tv_sec() as i64, ts.tv_nsec() as i64),
            // Only an invalid clock id fails, and the id is fixed at build time
            Err(_) => Timespec::ZERO,
        }
    }
}

static CLOCK: SystemClock = SystemClock;

/// The process-wide clock
#[inline]
pub fn clock() -> &'static SystemClock {
    &CLOCK
}

/// Convert to the native representation, clamping seconds to `time_t`
pub(crate) fn to_native(t: Timespec) -> libc::timespec {
    // Safety: timespec is plain data; zero is a valid value for every field
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    ts.tv_sec = libc::time_t::try_from(t.secs()).unwrap_or(libc::time_t::MAX);
    ts.tv_nsec = t.nanos() as _;
    ts
}
