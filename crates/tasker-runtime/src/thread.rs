//! Native threads with an explicit lifecycle
//!
//! A [`Thread`] is created NEW around a [`Runnable`] body and moves to
//! RUNNING when started, then to TERMINATED once the body returns or
//! panics. Each transition happens at most once.
//!
//! Two start modes:
//! - `start()` - detached. The body runs via [`Runnable::run`], is disposed
//!   of on the native thread, and the thread cannot be joined.
//! - `start_undetached()` - joinable. The body runs via
//!   [`Runnable::run_undetached`] and `join()` hands back its result.
//!
//! Panics in the body are contained: they are logged, the thread still
//! reaches TERMINATED, and `join()` reports [`RunOutcome::Failed`].
//!
//! Lifecycle writes happen under the thread's own [`Mutex`]. The spawner
//! holds it across native thread creation, so the new thread cannot mark
//! itself TERMINATED before it has been marked RUNNING.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::os::unix::thread::JoinHandleExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::sys::pthread::pthread_self;
use tasker_core::{
    kdebug, kerror, kwarn, Priority, ThreadError, ThreadHandle, ThreadResult, ThreadState,
};

use crate::config::{runtime_config, MIN_STACK_SIZE};
use crate::priority;
use crate::sync::Mutex;

/// Work executed on a native thread
///
/// Closures returning a `Send` value implement this automatically.
pub trait Runnable: Send + Sized + 'static {
    /// Result handed back by `join()` for undetached threads
    type Output: Send + 'static;

    /// Body of an undetached thread
    fn run_undetached(self) -> Self::Output;

    /// Body of a detached thread; the result is discarded
    fn run(self) {
        let _ = self.run_undetached();
    }
}

impl<F, T> Runnable for F
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn run_undetached(self) -> T {
        self()
    }
}

/// What `join()` observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    /// The thread was never started
    NotStarted,
    /// The body returned this value
    Completed(T),
    /// The body panicked with this message
    Failed(String),
}

impl<T> RunOutcome<T> {
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    /// The body's result, if it completed
    pub fn into_value(self) -> Option<T> {
        match self {
            RunOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }
}

/// Native thread id, valid while the thread is RUNNING
#[derive(Clone, Copy)]
struct NativeThread(libc::pthread_t);

// Safety: a pthread_t is an opaque id; it is only passed back to pthread
// calls while the lifecycle lock proves the thread is alive.
unsafe impl Send for NativeThread {}

/// State shared between a `Thread` and its native thread
struct Shared {
    handle: ThreadHandle,
    name: String,
    /// Lifecycle lock; holds the native id while RUNNING
    native: Mutex<Cell<Option<NativeThread>>>,
    /// Written only under `native`, read lock-free
    state: AtomicU8,
    detached: AtomicBool,
    priority: AtomicU8,
}

impl Shared {
    #[inline]
    fn state(&self) -> ThreadState {
        ThreadState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn priority(&self) -> Priority {
        Priority::from_index(self.priority.load(Ordering::Relaxed) as usize).unwrap_or_default()
    }

    /// Runs first on the native thread
    fn enter(&self) {
        ThreadHandle::set_current(self.handle);
        let p = self.priority();
        if p != Priority::Normal {
            if let Err(e) = priority::apply(pthread_self(), p, "Thread::start") {
                kwarn!("thread {} ({}): priority {} not applied: {}", self.handle, self.name, p, e);
            }
        }
        kdebug!("thread {} ({}) running", self.handle, self.name);
    }

    /// RUNNING -> TERMINATED, from the native thread
    fn terminate(&self) {
        match self.native.lock() {
            Ok(life) => {
                life.set(None);
                self.state.store(ThreadState::Terminated as u8, Ordering::Release);
            }
            Err(e) => {
                kerror!("thread {}: {}", self.handle, e);
                self.state.store(ThreadState::Terminated as u8, Ordering::Release);
            }
        }
        kdebug!("thread {} ({}) terminated", self.handle, self.name);
    }
}

/// Builder for threads with a name, stack size or priority
#[derive(Debug)]
pub struct ThreadBuilder {
    handle: ThreadHandle,
    name: Option<String>,
    stack_size: Option<usize>,
    priority: Option<Priority>,
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadBuilder {
    /// Start a builder; the thread's handle is allocated now
    pub fn new() -> Self {
        Self {
            handle: ThreadHandle::allocate(),
            name: None,
            stack_size: None,
            priority: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Stack size in bytes, 0 = platform default
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn priority(mut self, p: Priority) -> Self {
        self.priority = Some(p);
        self
    }

    /// Handle the built thread will have
    #[inline]
    pub fn handle(&self) -> ThreadHandle {
        self.handle
    }

    /// Create the thread in state NEW
    pub fn build<R: Runnable>(self, body: R) -> ThreadResult<Thread<R>> {
        let config = runtime_config();
        let stack_size = self.stack_size.unwrap_or(config.stack_size);
        if stack_size != 0 && stack_size < MIN_STACK_SIZE {
            return Err(ThreadError::bad_value(
                "ThreadBuilder::build",
                format!("stack size {} below minimum {}", stack_size, MIN_STACK_SIZE),
            ));
        }
        let name = self
            .name
            .unwrap_or_else(|| format!("{}-{}", config.thread_prefix, self.handle.as_u64()));
        let priority = self.priority.unwrap_or(config.default_priority);

        let shared = Arc::new(Shared {
            handle: self.handle,
            name,
            native: Mutex::new(Cell::new(None))?,
            state: AtomicU8::new(ThreadState::New as u8),
            detached: AtomicBool::new(false),
            priority: AtomicU8::new(priority as u8),
        });

        Ok(Thread {
            shared,
            body: Some(body),
            join: None,
            stack_size,
        })
    }
}

/// Native thread running a [`Runnable`] body
pub struct Thread<R: Runnable> {
    shared: Arc<Shared>,
    body: Option<R>,
    join: Option<JoinHandle<RunOutcome<R::Output>>>,
    stack_size: usize,
}

impl<R: Runnable> Thread<R> {
    /// Create a NEW thread with default settings
    pub fn new(body: R) -> ThreadResult<Self> {
        ThreadBuilder::new().build(body)
    }

    /// Create a NEW thread with the given priority
    pub fn with_priority(body: R, p: Priority) -> ThreadResult<Self> {
        ThreadBuilder::new().priority(p).build(body)
    }

    /// Start detached.
    ///
    /// Fails with `InvalidState` unless NEW, `OsFailure` if the native
    /// thread cannot be created.
    pub fn start(&mut self) -> ThreadResult<()> {
        self.spawn(true, "Thread::start")
    }

    /// Start joinable.
    ///
    /// Fails with `InvalidState` unless NEW, `OsFailure` if the native
    /// thread cannot be created.
    pub fn start_undetached(&mut self) -> ThreadResult<()> {
        self.spawn(false, "Thread::start_undetached")
    }

    fn spawn(&mut self, detached: bool, op: &'static str) -> ThreadResult<()> {
        let life = self.shared.native.lock()?;
        let state = self.shared.state();
        if state != ThreadState::New {
            kwarn!("{}: thread {} is already {}", op, self.shared.handle, state);
            return Err(ThreadError::invalid_state(
                op,
                format!("thread {} is {}, expected NEW", self.shared.handle, state),
            ));
        }
        let body = self
            .body
            .take()
            .ok_or_else(|| {
                ThreadError::invalid_state(op, "thread body lost by an earlier failed start")
            })?;
        self.shared.detached.store(detached, Ordering::Relaxed);

        let mut builder = std::thread::Builder::new().name(self.shared.name.clone());
        if self.stack_size > 0 {
            builder = builder.stack_size(self.stack_size);
        }
        let shared = Arc::clone(&self.shared);
        let spawned = if detached {
            builder
                .spawn(move || detached_main(shared, body))
                .map(|h| (h.as_pthread_t() as libc::pthread_t, None))
        } else {
            builder
                .spawn(move || joinable_main(shared, body))
                .map(|h| (h.as_pthread_t() as libc::pthread_t, Some(h)))
        };

        match spawned {
            Ok((native, join)) => {
                life.set(Some(NativeThread(native)));
                self.shared.state.store(ThreadState::Running as u8, Ordering::Release);
                self.join = join;
                Ok(())
            }
            Err(e) => {
                kerror!("{}: cannot create thread {}: {}", op, self.shared.name, e);
                Err(ThreadError::os(
                    op,
                    format!("thread creation failed: {}", e),
                    e.raw_os_error().unwrap_or(libc::EAGAIN),
                ))
            }
        }
    }

    /// Wait for an undetached thread and take its result.
    ///
    /// A never-started thread yields [`RunOutcome::NotStarted`] without
    /// blocking. Detached threads fail with `InvalidState`.
    pub fn join(mut self) -> ThreadResult<RunOutcome<R::Output>> {
        if self.state() == ThreadState::New {
            kdebug!("join on thread {} that was never started", self.shared.handle);
            return Ok(RunOutcome::NotStarted);
        }
        if self.is_detached() {
            let reason = "detached threads cannot be joined";
            return Err(ThreadError::invalid_state("Thread::join", reason));
        }
        let handle = self
            .join
            .take()
            .ok_or_else(|| ThreadError::invalid_state("Thread::join", "thread already joined"))?;
        match handle.join() {
            Ok(outcome) => Ok(outcome),
            Err(payload) => Ok(RunOutcome::Failed(panic_message(&*payload))),
        }
    }

    /// Change the priority of a RUNNING thread.
    ///
    /// Fails with `InvalidState` in any other state, `OsFailure` if the OS
    /// rejects the parameters (Realtime usually needs privileges).
    pub fn set_priority(&self, p: Priority) -> ThreadResult<()> {
        let life = self.shared.native.lock()?;
        let native = match (self.shared.state(), life.get()) {
            (ThreadState::Running, Some(native)) => native,
            (state, _) => {
                return Err(ThreadError::invalid_state(
                    "Thread::set_priority",
                    format!("thread {} is {}, expected RUNNING", self.shared.handle, state),
                ))
            }
        };
        priority::apply(native.0, p, "Thread::set_priority")?;
        self.shared.priority.store(p as u8, Ordering::Relaxed);
        Ok(())
    }

    #[inline]
    pub fn id(&self) -> ThreadHandle {
        self.shared.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.shared.state()
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.shared.priority()
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.shared.detached.load(Ordering::Relaxed)
    }
}

impl<R: Runnable> fmt::Debug for Thread<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.shared.handle)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("detached", &self.is_detached())
            .finish()
    }
}

fn detached_main<R: Runnable>(shared: Arc<Shared>, body: R) {
    shared.enter();
    if let Err(reason) = contain(move || body.run()) {
        kerror!("thread {} ({}) panicked: {}", shared.handle, shared.name, reason);
    }
    shared.terminate();
}

fn joinable_main<R: Runnable>(shared: Arc<Shared>, body: R) -> RunOutcome<R::Output> {
    shared.enter();
    let outcome = match contain(move || body.run_undetached()) {
        Ok(value) => RunOutcome::Completed(value),
        Err(reason) => {
            kerror!("thread {} ({}) panicked: {}", shared.handle, shared.name, reason);
            RunOutcome::Failed(reason)
        }
    };
    shared.terminate();
    outcome
}

/// Run `f`, turning a panic into its message
pub(crate) fn contain<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(&*payload))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Block the calling thread for `d`
#[inline]
pub fn sleep(d: Duration) {
    std::thread::sleep(d);
}

/// Offer the rest of the time slice to other threads
#[inline]
pub fn yield_now() {
    std::thread::yield_now();
}

/// Handle of the calling thread
#[inline]
pub fn current() -> ThreadHandle {
    ThreadHandle::current()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tasker_core::ErrorKind;

    fn wait_terminated<R: Runnable>(t: &Thread<R>) {
        for _ in 0..500 {
            if t.state() == ThreadState::Terminated {
                return;
            }
            sleep(Duration::from_millis(2));
        }
        panic!("thread {} did not terminate", t.id());
    }

    #[test]
    fn test_lifecycle_undetached() {
        let mut t = Thread::new(|| 6 * 7).unwrap();
        assert_eq!(t.state(), ThreadState::New);
        t.start_undetached().unwrap();
        assert_ne!(t.state(), ThreadState::New);
        assert!(!t.is_detached());
        assert_eq!(t.join().unwrap(), RunOutcome::Completed(42));
    }

    #[test]
    fn test_join_never_started() {
        let t = Thread::new(|| 1).unwrap();
        assert_eq!(t.join().unwrap(), RunOutcome::NotStarted);
    }

    #[test]
    fn test_start_twice_is_invalid() {
        let mut t = Thread::new(|| ()).unwrap();
        t.start_undetached().unwrap();
        let err = t.start_undetached().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = t.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        t.join().unwrap();
    }

    #[test]
    fn test_detached_cannot_join() {
        let mut t = Thread::new(|| ()).unwrap();
        t.start().unwrap();
        assert!(t.is_detached());
        wait_terminated(&t);
        assert_eq!(t.join().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    struct Counted(Arc<AtomicU32>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Runnable for Counted {
        type Output = ();

        fn run_undetached(self) {}
    }

    #[test]
    fn test_detached_body_disposed_once() {
        let drops = Arc::new(AtomicU32::new(0));
        let mut t = Thread::new(Counted(Arc::clone(&drops))).unwrap();
        t.start().unwrap();
        wait_terminated(&t);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        drop(t);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_is_contained() {
        let mut t = Thread::new(|| -> u32 { panic!("boom") }).unwrap();
        t.start_undetached().unwrap();
        match t.join().unwrap() {
            RunOutcome::Failed(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_identity_inside_thread() {
        let builder = ThreadBuilder::new().name("ident");
        let expected = builder.handle();
        let mut t = builder
            .build(|| (current(), std::thread::current().name().map(str::to_string)))
            .unwrap();
        assert_eq!(t.id(), expected);
        t.start_undetached().unwrap();
        let (seen, name) = t.join().unwrap().into_value().unwrap();
        assert_eq!(seen, expected);
        assert_eq!(name.as_deref(), Some("ident"));
    }

    #[test]
    fn test_set_priority_requires_running() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let mut t = Thread::new(move || {
            let _ = rx.recv();
        })
        .unwrap();
        assert_eq!(t.set_priority(Priority::High).unwrap_err().kind(), ErrorKind::InvalidState);
        t.start_undetached().unwrap();
        t.set_priority(Priority::Normal).unwrap();
        tx.send(()).unwrap();
        wait_terminated(&t);
        assert_eq!(t.set_priority(Priority::Normal).unwrap_err().kind(), ErrorKind::InvalidState);
        t.join().unwrap();
    }

    #[test]
    fn test_stack_size_validated() {
        let err = ThreadBuilder::new().stack_size(1024).build(|| ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadValue);
        let mut t = ThreadBuilder::new().stack_size(256 * 1024).build(|| 1).unwrap();
        t.start_undetached().unwrap();
        assert!(t.join().unwrap().is_completed());
    }
}
