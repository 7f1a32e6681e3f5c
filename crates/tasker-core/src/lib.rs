//! # tasker-core
//!
//! Core types for the tasker concurrency runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Native primitives, threads and tasks live in `tasker-runtime`.
//!
//! ## Modules
//!
//! - `id` - Thread identity type
//! - `state` - Thread state and priority enums
//! - `time` - Absolute deadlines and the `TimeSource` trait
//! - `message` - Messages, timers ticks and synchronous responses
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod time;
pub mod message;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::ThreadHandle;
pub use state::{ThreadState, Priority};
pub use time::{Timespec, TimeSource, NANOS_PER_SEC};
pub use message::{Message, MessageKind, Periodic, Prioritized, Repeat, Response, Tick, TimerId};
pub use error::{ErrorKind, ThreadError, ThreadResult};
pub use env::{env_get, env_get_bool, env_get_micros, env_get_opt, env_get_str, env_is_set};

/// Runtime-wide limits
pub mod constants {
    /// Largest initial semaphore count; the upper half of the counter
    /// range is headroom for detecting overflow.
    pub const SEMAPHORE_MAX_INITIAL: u32 = u32::MAX / 2;

    /// Default prefix for spawned thread names
    pub const DEFAULT_THREAD_PREFIX: &str = "tasker";

    /// Polls of `try_lock` that only yield before `timed_try_lock` starts sleeping
    pub const DEFAULT_LOCK_SPINS: u32 = 64;

    /// Sleep between later `timed_try_lock` polls, in microseconds
    pub const DEFAULT_LOCK_BACKOFF_US: u64 = 50;
}
