//! Message, timer and response types shared by queues and tasks

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::state::Priority;

/// Identifier of a task timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

impl TimerId {
    /// Generate a new unique timer id
    #[inline]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// How many times a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Fire this many times, then retire. `Times(0)` never fires.
    Times(u32),

    /// Fire until cancelled or the task exits
    Forever,
}

impl Repeat {
    /// One-shot timer
    pub const ONCE: Repeat = Repeat::Times(1);

    #[inline]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Repeat::Times(0))
    }

    /// Count one firing, returning the new remaining count
    #[inline]
    pub fn consume(&mut self) -> Repeat {
        if let Repeat::Times(n) = self {
            *n = n.saturating_sub(1);
        }
        *self
    }

    #[inline]
    pub const fn remaining(&self) -> Option<u32> {
        match self {
            Repeat::Times(n) => Some(*n),
            Repeat::Forever => None,
        }
    }
}

/// Periodic timer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periodic {
    pub interval: Duration,
    pub repeat: Repeat,
}

impl Periodic {
    pub const fn new(interval: Duration, repeat: Repeat) -> Self {
        Self { interval, repeat }
    }
}

/// One expiry of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Timer that fired
    pub timer: TimerId,

    /// 1-based firing number
    pub count: u64,

    /// Firings left after this one (`None` = unbounded)
    pub remaining: Option<u32>,
}

impl Tick {
    /// Check if this is the last tick the timer will produce
    #[inline]
    pub fn is_last(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Message discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Application opcode
    User(u32),

    /// Synthetic message produced by a timer inside the task's run loop
    Periodic(Tick),

    /// Ask the task to exit after dispatching this message
    Quit,
}

impl MessageKind {
    #[inline]
    pub const fn is_quit(&self) -> bool {
        matches!(self, MessageKind::Quit)
    }

    #[inline]
    pub const fn opcode(&self) -> Option<u32> {
        match self {
            MessageKind::User(op) => Some(*op),
            _ => None,
        }
    }
}

/// A unit of work for a task
///
/// ```ignore
/// let msg = Message::new(ECHO, "x".to_string()).with_priority(Priority::High);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<P> {
    pub kind: MessageKind,
    pub payload: Option<P>,
    pub priority: Priority,
}

impl<P> Message<P> {
    /// User message with payload at normal priority
    pub fn new(opcode: u32, payload: P) -> Self {
        Self {
            kind: MessageKind::User(opcode),
            payload: Some(payload),
            priority: Priority::Normal,
        }
    }

    /// User message without payload
    pub fn opcode(opcode: u32) -> Self {
        Self {
            kind: MessageKind::User(opcode),
            payload: None,
            priority: Priority::Normal,
        }
    }

    /// Quit request. Low priority so already-queued work drains first.
    pub fn quit() -> Self {
        Self {
            kind: MessageKind::Quit,
            payload: None,
            priority: Priority::Low,
        }
    }

    /// Synthetic message for a timer expiry
    pub fn periodic(tick: Tick, priority: Priority) -> Self {
        Self {
            kind: MessageKind::Periodic(tick),
            payload: None,
            priority,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Take the payload out, leaving `None`
    #[inline]
    pub fn take_payload(&mut self) -> Option<P> {
        self.payload.take()
    }
}

/// Items that can be stored in a priority message queue
pub trait Prioritized {
    fn priority(&self) -> Priority;
}

impl<P> Prioritized for Message<P> {
    #[inline]
    fn priority(&self) -> Priority {
        self.priority
    }
}

/// Outcome of a synchronous post
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<R> {
    /// Handler ran; carries its reply, if any
    Handled(Option<R>),

    /// Handler panicked while processing the message
    Failed(String),

    /// Message was dropped without being handled (queue closed, task exited)
    Abandoned,

    /// Deadline elapsed before the handler finished
    TimedOut,
}

impl<R> Response<R> {
    #[inline]
    pub fn is_handled(&self) -> bool {
        matches!(self, Response::Handled(_))
    }

    #[inline]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Response::TimedOut)
    }

    /// Reply value if the handler produced one
    pub fn into_reply(self) -> Option<R> {
        match self {
            Response::Handled(reply) => reply,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_consume() {
        let mut r = Repeat::Times(2);
        assert_eq!(r.consume(), Repeat::Times(1));
        assert_eq!(r.consume(), Repeat::Times(0));
        assert!(r.is_exhausted());
        assert_eq!(r.consume(), Repeat::Times(0));

        let mut f = Repeat::Forever;
        assert_eq!(f.consume(), Repeat::Forever);
        assert_eq!(f.remaining(), None);
    }

    #[test]
    fn test_message_builders() {
        let m = Message::new(7, "x").with_priority(Priority::High);
        assert_eq!(m.kind.opcode(), Some(7));
        assert_eq!(m.priority(), Priority::High);

        let q: Message<()> = Message::quit();
        assert!(q.kind.is_quit());
        assert_eq!(q.priority, Priority::Low);
        assert!(q.payload.is_none());
    }

    #[test]
    fn test_timer_ids_unique() {
        assert_ne!(TimerId::new(), TimerId::new());
    }

    #[test]
    fn test_response_reply() {
        assert_eq!(Response::Handled(Some(3)).into_reply(), Some(3));
        assert_eq!(Response::<i32>::TimedOut.into_reply(), None);
        assert!(Response::<()>::TimedOut.is_timed_out());
    }
}
