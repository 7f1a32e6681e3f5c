//! # tasker - threads, locks and message-driven tasks
//!
//! A small concurrency runtime on native threads:
//!
//! - **Threads** with a NEW -> RUNNING -> TERMINATED lifecycle, detached or
//!   joinable, with abstract priorities mapped onto the OS scheduler
//! - **Mutex** (recursive), **Condition** and **Semaphore** with timed
//!   variants that report timeouts as outcomes, not errors
//! - **MessageQueue** ordered by priority then arrival, with synchronous
//!   request/response
//! - **Task**: a thread that serves a message queue and runs periodic timers
//!   between messages
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use tasker::{Handler, Message, Task, TaskConfig, TaskContext};
//!
//! const ECHO: u32 = 1;
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     type Payload = String;
//!     type Reply = String;
//!
//!     fn handle(&mut self, _: &mut TaskContext<'_, Self>, m: Message<String>) -> Option<String> {
//!         m.payload
//!     }
//! }
//!
//! fn main() -> tasker::ThreadResult<()> {
//!     tasker::init();
//!     let mut task = Task::new(TaskConfig::new(Echo).name("echo"))?;
//!     task.start_undetached()?;
//!
//!     let reply = task.wait_msg(Message::new(ECHO, "x".to_string()), Duration::from_secs(1))?;
//!     assert_eq!(reply.into_reply().as_deref(), Some("x"));
//!
//!     task.quit()?;
//!     task.join()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │          Handler impls, Runnable bodies, closures           │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Task                                │
//! │        run loop: timers -> pop -> dispatch -> reply         │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌──────────────┐    ┌────────────┐
//!    │  Thread   │      │ MessageQueue │    │   Timers   │
//!    │ lifecycle │      │ prio + FIFO  │    │ (in-loop)  │
//!    └───────────┘      └──────────────┘    └────────────┘
//!          │                   │
//!          └─────────┬─────────┘
//!                    ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │     Mutex / Condition / Semaphore  (pthreads, libc)     │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use tasker_core::{
    ErrorKind,
    Message,
    MessageKind,
    Periodic,
    Prioritized,
    Priority,
    Repeat,
    Response,
    ThreadError,
    ThreadHandle,
    ThreadResult,
    ThreadState,
    Tick,
    TimeSource,
    TimerId,
    Timespec,
};
pub use tasker_core::constants;

// Re-export kprint macros for debug logging
pub use tasker_core::{kprint, kprintln, klog, kerror, kwarn, kinfo, kdebug, ktrace};
pub use tasker_core::kprint::{
    init as init_logging, set_flush_enabled, set_log_level, set_time_enabled, LogLevel,
};

// Re-export env utilities
pub use tasker_core::{env_get, env_get_bool, env_get_micros, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use tasker_runtime::{
    clock,
    runtime_config,
    set_runtime_config,
    Condition,
    Handler,
    MessageQueue,
    Mutex,
    MutexGuard,
    PriorityTable,
    Received,
    Responder,
    RunOutcome,
    Runnable,
    RuntimeConfig,
    Semaphore,
    SystemClock,
    Task,
    TaskConfig,
    TaskContext,
    TaskSender,
    Thread,
    ThreadBuilder,
    TryLockResult,
};
pub use tasker_runtime::thread::{current, sleep, yield_now};
pub use tasker_runtime::task::TimerCallback;

/// Initialize logging, runtime configuration and the priority table.
///
/// Optional: everything is otherwise built lazily on first use. Call it
/// early to surface configuration problems at startup.
#[inline]
pub fn init() {
    tasker_runtime::init();
}

/// Spawn a joinable thread running `f`
///
/// ```ignore
/// let t = tasker::spawn(|| 2 + 2)?;
/// assert_eq!(t.join()?.into_value(), Some(4));
/// ```
pub fn spawn<F, T>(f: F) -> ThreadResult<Thread<F>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let mut thread = Thread::new(f)?;
    thread.start_undetached()?;
    Ok(thread)
}

/// Spawn a detached thread running `f`
pub fn spawn_detached<F>(f: F) -> ThreadResult<ThreadHandle>
where
    F: FnOnce() + Send + 'static,
{
    let mut thread = Thread::new(f)?;
    thread.start()?;
    Ok(thread.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_helpers() {
        init();
        let t = spawn(|| current()).unwrap();
        let id = t.id();
        assert_eq!(t.join().unwrap().into_value(), Some(id));

        let (tx, rx) = std::sync::mpsc::channel();
        let handle = spawn_detached(move || {
            let _ = tx.send(current());
        })
        .unwrap();
        assert_eq!(rx.recv().unwrap(), handle);
    }
}
