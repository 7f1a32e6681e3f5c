//! Thread state and priority types

use core::fmt;

/// Lifecycle state of a runtime thread
///
/// The only legal transitions are `New -> Running` (performed by the
/// spawning thread) and `Running -> Terminated` (performed by the thread
/// itself once its body returns).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Constructed, not yet started
    New = 0,

    /// Native context created, body running or about to run
    Running = 1,

    /// Body returned (or panicked), native context exiting
    Terminated = 2,
}

impl ThreadState {
    /// Check if `self -> next` is a legal transition
    #[inline]
    pub const fn can_transition_to(&self, next: ThreadState) -> bool {
        matches!(
            (self, next),
            (ThreadState::New, ThreadState::Running)
                | (ThreadState::Running, ThreadState::Terminated)
        )
    }

    #[inline]
    pub const fn is_running(&self) -> bool {
        matches!(self, ThreadState::Running)
    }

    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, ThreadState::Terminated)
    }
}

impl From<u8> for ThreadState {
    fn from(v: u8) -> Self {
        match v {
            0 => ThreadState::New,
            1 => ThreadState::Running,
            _ => ThreadState::Terminated,
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadState::New => write!(f, "NEW"),
            ThreadState::Running => write!(f, "RUNNING"),
            ThreadState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Priority hint
///
/// Used both as the scheduling hint of a thread and as the dispatch
/// priority of a message. Ordering follows urgency: `Low < Normal < High
/// < Realtime`, so a max-ordered queue dispatches `Realtime` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    /// Background work
    Low = 0,

    /// Default for threads and messages
    Normal = 1,

    /// Latency-sensitive work
    High = 2,

    /// Time-critical work; may need privileges to apply to a thread
    Realtime = 3,
}

impl Priority {
    /// Number of priority levels
    pub const COUNT: usize = 4;

    /// Index into per-priority tables (0 = Low, 3 = Realtime)
    #[inline]
    pub const fn as_index(&self) -> usize {
        *self as usize
    }

    #[inline]
    pub const fn from_index(idx: usize) -> Option<Priority> {
        match idx {
            0 => Some(Priority::Low),
            1 => Some(Priority::Normal),
            2 => Some(Priority::High),
            3 => Some(Priority::Realtime),
            _ => None,
        }
    }

    /// Iterator over all priorities (lowest to highest)
    pub fn iter() -> impl Iterator<Item = Priority> {
        [Priority::Low, Priority::Normal, Priority::High, Priority::Realtime].into_iter()
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl core::str::FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "0" => Ok(Priority::Low),
            "normal" | "1" => Ok(Priority::Normal),
            "high" | "2" => Ok(Priority::High),
            "realtime" | "rt" | "3" => Ok(Priority::Realtime),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Normal => write!(f, "NORMAL"),
            Priority::High => write!(f, "HIGH"),
            Priority::Realtime => write!(f, "REALTIME"),
        }
    }
}
