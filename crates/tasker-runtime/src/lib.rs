//! # tasker-runtime
//!
//! Native implementation of the tasker concurrency runtime.
//!
//! This crate provides:
//! - A clock implementing `TimeSource` for absolute deadlines
//! - Recursive mutex, condition variable and counting semaphore on pthreads
//! - Threads with a NEW -> RUNNING -> TERMINATED lifecycle, detached or joinable
//! - A process-wide priority mapping table
//! - A priority message queue with synchronous request/response
//! - Tasks: threads that dispatch a message queue plus in-loop timers

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        pub mod config;
        pub mod clock;
        pub mod sync;
        pub mod priority;
        pub mod thread;
        pub mod queue;
        pub mod task;
    } else {
        compile_error!("Unsupported platform: tasker-runtime requires pthreads");
    }
}

// Re-exports
pub use config::{runtime_config, set_runtime_config, RuntimeConfig};
pub use clock::{clock, SystemClock};
pub use sync::{Condition, Mutex, MutexGuard, Semaphore, TryLockResult};
pub use priority::{priority_table, PriorityTable, SchedParams};
pub use thread::{sleep, yield_now, RunOutcome, Runnable, Thread, ThreadBuilder};
pub use queue::{MessageQueue, Received, Responder};
pub use task::{Handler, Task, TaskConfig, TaskContext, TaskSender};

/// Eagerly initialize process-wide state: logging configuration, runtime
/// configuration and the priority table. Optional; each is otherwise built
/// on first use.
pub fn init() {
    tasker_core::kprint::init();
    let _ = runtime_config();
    let _ = priority_table();
}
