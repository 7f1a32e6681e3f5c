//! Priority mapping
//!
//! Abstract priorities map to a native scheduling policy and priority
//! value. The table is probed from the OS once per process and is
//! read-only afterwards.
//!
//! | Priority | Policy      | Native value          |
//! |----------|-------------|-----------------------|
//! | Low      | SCHED_OTHER | policy minimum        |
//! | Normal   | SCHED_OTHER | midpoint              |
//! | High     | SCHED_OTHER | policy maximum        |
//! | Realtime | SCHED_FIFO  | policy minimum        |
//!
//! On Linux the SCHED_OTHER range is a single value, so the three
//! time-sharing levels coincide; Realtime usually needs privileges.
//! [`PriorityTable::is_distinct`] and [`PriorityTable::distinct_levels`]
//! report which levels actually differ on this host.

use std::sync::OnceLock;

use tasker_core::{kdebug, Priority, ThreadResult};

use crate::sync::check;

/// Native scheduling parameters for one abstract priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedParams {
    pub policy: libc::c_int,
    pub priority: libc::c_int,
}

/// Process-wide abstract-to-native priority table
#[derive(Debug, Clone)]
pub struct PriorityTable {
    slots: [SchedParams; Priority::COUNT],
}

impl PriorityTable {
    fn probe() -> Self {
        let (lo, hi) = policy_range(libc::SCHED_OTHER);
        let (rt_lo, _) = policy_range(libc::SCHED_FIFO);
        let other = |priority| SchedParams {
            policy: libc::SCHED_OTHER,
            priority,
        };
        let table = Self {
            slots: [
                other(lo),
                other(lo + (hi - lo) / 2),
                other(hi),
                SchedParams {
                    policy: libc::SCHED_FIFO,
                    priority: rt_lo,
                },
            ],
        };
        kdebug!("priority table: {:?}", table.slots);
        table
    }

    /// Native parameters for `p`
    #[inline]
    pub fn params(&self, p: Priority) -> SchedParams {
        self.slots[p.as_index()]
    }

    /// True if `a` and `b` map to different native parameters
    #[inline]
    pub fn is_distinct(&self, a: Priority, b: Priority) -> bool {
        self.params(a) != self.params(b)
    }

    /// Number of distinct native settings the four levels map onto
    pub fn distinct_levels(&self) -> usize {
        let mut seen: Vec<SchedParams> = Vec::with_capacity(Priority::COUNT);
        for slot in self.slots {
            if !seen.contains(&slot) {
                seen.push(slot);
            }
        }
        seen.len()
    }
}

fn policy_range(policy: libc::c_int) -> (libc::c_int, libc::c_int) {
    // Safety: plain queries with no pointer arguments
    let (lo, hi) = unsafe {
        (
            libc::sched_get_priority_min(policy),
            libc::sched_get_priority_max(policy),
        )
    };
    if lo < 0 || hi < lo {
        (0, 0)
    } else {
        (lo, hi)
    }
}

static TABLE: OnceLock<PriorityTable> = OnceLock::new();

/// The process-wide priority table, probed on first use
pub fn priority_table() -> &'static PriorityTable {
    TABLE.get_or_init(PriorityTable::probe)
}

/// Apply `p` to a running native thread
pub(crate) fn apply(thread: libc::pthread_t, p: Priority, op: &'static str) -> ThreadResult<()> {
    let params = priority_table().params(p);
    // Safety: sched_param is plain data; unused platform fields stay zero
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = params.priority;
    // Safety: `thread` is a live thread; callers hold its lifecycle lock
    let rc = unsafe { libc::pthread_setschedparam(thread, params.policy, &param) };
    check(rc, op, "pthread_setschedparam")
}
