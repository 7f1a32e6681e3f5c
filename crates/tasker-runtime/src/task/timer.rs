//! Timers owned by a task's run loop
//!
//! Timers live in a min-heap keyed by deadline and are only touched by
//! the task's own thread, so no locking is needed. A timer is re-armed
//! after its dispatch returns, which keeps successive dispatches at
//! least one interval apart and means a slow handler never sees the
//! same timer overlap with itself.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tasker_core::{Repeat, ThreadError, ThreadResult, Tick, TimerId, Timespec};

/// Callback run on the task thread instead of dispatching a message
pub type TimerCallback<H> = Box<dyn FnMut(&mut H, Tick) + Send>;

pub(crate) enum TimerAction<H> {
    /// Deliver `Message::periodic` to the handler
    Dispatch,
    Callback(TimerCallback<H>),
}

pub(crate) struct Timer<H> {
    id: TimerId,
    interval: Duration,
    repeat: Repeat,
    fired: u64,
    pub(crate) action: TimerAction<H>,
}

impl<H> Timer<H> {
    pub(crate) fn new(
        interval: Duration,
        repeat: Repeat,
        action: TimerAction<H>,
        op: &'static str,
    ) -> ThreadResult<Self> {
        if interval.is_zero() {
            return Err(ThreadError::bad_value(op, "timer interval must be non-zero"));
        }
        Ok(Self {
            id: TimerId::new(),
            interval,
            repeat,
            fired: 0,
            action,
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> TimerId {
        self.id
    }

    /// Record one firing
    pub(crate) fn tick(&mut self) -> Tick {
        self.fired += 1;
        let left = self.repeat.consume();
        Tick {
            timer: self.id,
            count: self.fired,
            remaining: left.remaining(),
        }
    }
}

struct Armed<H> {
    deadline: Timespec,
    timer: Timer<H>,
}

impl<H> PartialEq for Armed<H> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.timer.id == other.timer.id
    }
}

impl<H> Eq for Armed<H> {}

impl<H> PartialOrd for Armed<H> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<H> Ord for Armed<H> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap (earliest deadline first)
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.timer.id.cmp(&self.timer.id))
    }
}

/// Pending timers of one task
pub(crate) struct TimerSet<H> {
    heap: BinaryHeap<Armed<H>>,
    /// Timer currently being dispatched (out of the heap)
    firing: Option<TimerId>,
    firing_cancelled: bool,
}

impl<H> TimerSet<H> {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            firing: None,
            firing_cancelled: false,
        }
    }

    /// Schedule `timer` one interval after `now`; exhausted timers are dropped
    pub(crate) fn arm(&mut self, timer: Timer<H>, now: Timespec) {
        if timer.repeat.is_exhausted() {
            return;
        }
        let deadline = now.saturating_add(timer.interval);
        self.heap.push(Armed { deadline, timer });
    }

    /// Remove a timer; returns false if it is unknown
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        if self.firing == Some(id) {
            self.firing_cancelled = true;
            return true;
        }
        let before = self.heap.len();
        self.heap.retain(|a| a.timer.id != id);
        self.heap.len() != before
    }

    /// Earliest pending deadline
    #[inline]
    pub(crate) fn next_deadline(&self) -> Option<Timespec> {
        self.heap.peek().map(|a| a.deadline)
    }

    /// Take the earliest timer if it is due at `now`
    pub(crate) fn pop_due(&mut self, now: Timespec) -> Option<Timer<H>> {
        if self.heap.peek()?.deadline > now {
            return None;
        }
        let armed = self.heap.pop()?;
        self.firing = Some(armed.timer.id);
        self.firing_cancelled = false;
        Some(armed.timer)
    }

    /// Put a fired timer back unless it was cancelled or used up
    pub(crate) fn finish(&mut self, timer: Timer<H>, now: Timespec) {
        let cancelled = self.firing.take() == Some(timer.id) && self.firing_cancelled;
        self.firing_cancelled = false;
        if !cancelled {
            self.arm(timer, now);
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.firing = None;
        self.firing_cancelled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(ms: u64, repeat: Repeat) -> Timer<()> {
        Timer::new(Duration::from_millis(ms), repeat, TimerAction::Dispatch, "test").unwrap()
    }

    #[test]
    fn test_zero_interval_rejected() {
        let action = TimerAction::Dispatch;
        let err = Timer::<()>::new(Duration::ZERO, Repeat::ONCE, action, "Caller::op")
            .err()
            .unwrap();
        assert_eq!(err.kind(), tasker_core::ErrorKind::BadValue);
        assert_eq!(err.op(), "Caller::op");
    }

    #[test]
    fn test_earliest_deadline_first() {
        let mut set = TimerSet::new();
        let now = Timespec::new(100, 0);
        let slow = timer(50, Repeat::Forever);
        let fast = timer(10, Repeat::Forever);
        let fast_id = fast.id();
        set.arm(slow, now);
        set.arm(fast, now);

        assert_eq!(set.next_deadline(), Some(Timespec::new(100, 10_000_000)));
        assert!(set.pop_due(now).is_none());
        let due = set.pop_due(Timespec::new(100, 20_000_000)).unwrap();
        assert_eq!(due.id(), fast_id);
    }

    #[test]
    fn test_repeat_count_retires_timer() {
        let mut set = TimerSet::new();
        let mut now = Timespec::new(0, 0);
        set.arm(timer(1, Repeat::Times(3)), now);

        let mut ticks = Vec::new();
        while let Some(next) = set.next_deadline() {
            now = next;
            let mut t = set.pop_due(now).unwrap();
            ticks.push(t.tick());
            set.finish(t, now);
        }
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].count, 1);
        assert!(ticks[2].is_last());
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_cancel_pending_and_firing() {
        let mut set = TimerSet::new();
        let now = Timespec::new(0, 0);
        let a = timer(1, Repeat::Forever);
        let b = timer(5, Repeat::Forever);
        let (a_id, b_id) = (a.id(), b.id());
        set.arm(a, now);
        set.arm(b, now);

        assert!(set.cancel(b_id));
        assert!(!set.cancel(b_id));

        let later = Timespec::new(1, 0);
        let t = set.pop_due(later).unwrap();
        assert!(set.cancel(a_id));
        set.finish(t, later);
        assert_eq!(set.len(), 0);
    }
}
