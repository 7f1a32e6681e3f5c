//! Absolute deadlines and the time-source interface
//!
//! Timed waits on native primitives take an absolute deadline rather than
//! a relative timeout. [`Timespec`] is that deadline: a normalized
//! seconds + nanoseconds pair whose arithmetic carries nanosecond overflow
//! into seconds and saturates instead of wrapping. [`TimeSource`] turns
//! relative delays into deadlines against some clock; the runtime crate
//! provides the native implementation.

use core::fmt;
use std::time::Duration;

/// Nanoseconds per second
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Point in time on a clock, as seconds + nanoseconds
///
/// Always normalized: `nanos < NANOS_PER_SEC`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timespec {
    secs: i64,
    nanos: u32,
}

impl Timespec {
    /// The epoch of the clock
    pub const ZERO: Timespec = Timespec { secs: 0, nanos: 0 };

    /// Latest representable instant; used as "never"
    pub const MAX: Timespec = Timespec { secs: i64::MAX, nanos: NANOS_PER_SEC - 1 };

    /// Create a timespec, carrying any excess (or negative) nanoseconds
    /// into the seconds field.
    pub const fn new(secs: i64, nanos: i64) -> Self {
        let carry = nanos.div_euclid(NANOS_PER_SEC as i64);
        let nanos = nanos.rem_euclid(NANOS_PER_SEC as i64) as u32;
        Timespec { secs: secs.saturating_add(carry), nanos }
    }

    #[inline]
    pub const fn secs(&self) -> i64 {
        self.secs
    }

    #[inline]
    pub const fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Add a relative delay, `None` on overflow
    pub fn checked_add(self, delay: Duration) -> Option<Timespec> {
        let secs = i64::try_from(delay.as_secs()).ok()?;
        let mut secs = self.secs.checked_add(secs)?;
        let mut nanos = self.nanos + delay.subsec_nanos();
        if nanos >= NANOS_PER_SEC {
            nanos -= NANOS_PER_SEC;
            secs = secs.checked_add(1)?;
        }
        Some(Timespec { secs, nanos })
    }

    /// Add a relative delay, clamping to [`Timespec::MAX`]
    #[inline]
    pub fn saturating_add(self, delay: Duration) -> Timespec {
        self.checked_add(delay).unwrap_or(Timespec::MAX)
    }

    /// Time from `earlier` to `self`, zero if `earlier` is later
    pub fn saturating_duration_since(self, earlier: Timespec) -> Duration {
        if self <= earlier {
            return Duration::ZERO;
        }
        let mut secs = self.secs.wrapping_sub(earlier.secs) as u64;
        let nanos = if self.nanos >= earlier.nanos {
            self.nanos - earlier.nanos
        } else {
            secs -= 1;
            self.nanos + NANOS_PER_SEC - earlier.nanos
        };
        Duration::new(secs, nanos)
    }

    /// Check if this is the "never" sentinel
    #[inline]
    pub const fn is_max(&self) -> bool {
        self.secs == i64::MAX
    }
}

impl fmt::Debug for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timespec({}.{:09})", self.secs, self.nanos)
    }
}

/// Source of "now" for computing absolute deadlines
///
/// The default methods are pure arithmetic over [`TimeSource::now`].
pub trait TimeSource: Send + Sync {
    /// Current time on this source's clock
    fn now(&self) -> Timespec;

    /// Absolute deadline `timeout` from now
    #[inline]
    fn deadline(&self, timeout: Duration) -> Timespec {
        self.now().saturating_add(timeout)
    }

    /// Absolute deadline from a seconds + nanoseconds delay.
    ///
    /// `nanos` may exceed one second; the excess is carried into seconds.
    fn deadline_after(&self, secs: u64, nanos: u64) -> Timespec {
        let carry = nanos / NANOS_PER_SEC as u64;
        let nanos = (nanos % NANOS_PER_SEC as u64) as u32;
        match secs.checked_add(carry) {
            Some(secs) => self.deadline(Duration::new(secs, nanos)),
            None => Timespec::MAX,
        }
    }

    /// Absolute deadline `ms` milliseconds from now
    #[inline]
    fn deadline_after_ms(&self, ms: u64) -> Timespec {
        self.deadline(Duration::from_millis(ms))
    }

    /// Time left until `deadline`, zero once it has passed
    #[inline]
    fn remaining(&self, deadline: Timespec) -> Duration {
        deadline.saturating_duration_since(self.now())
    }

    /// Check if `deadline` has passed
    #[inline]
    fn expired(&self, deadline: Timespec) -> bool {
        self.now() >= deadline
    }
}
