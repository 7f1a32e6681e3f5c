//! Tasks: threads that serve a message queue
//!
//! A [`Task`] owns a [`Thread`] whose body is a run loop over a
//! [`MessageQueue`]. Other threads talk to it through a [`TaskSender`]:
//! `post` to enqueue and continue, `wait_msg` to enqueue and block for
//! the handler's reply. Timers are kept by the loop itself; expiries are
//! handled on the task thread between messages.
//!
//! # Run loop
//!
//! ```text
//! loop {
//!     fire every timer whose deadline has passed
//!     pop the next message, waiting at most until the nearest deadline
//!     dispatch it to the handler (panics contained)
//!     exit after a Quit message or ctx.quit()
//! }
//! close the queue (pending synchronous callers see Abandoned)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
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
//! let mut task = Task::new(TaskConfig::new(Echo).name("echo"))?;
//! task.start_undetached()?;
//! let reply = task.wait_msg(Message::new(ECHO, "x".into()), Duration::from_secs(1))?;
//! task.quit()?;
//! task.join()?;
//! ```

mod context;
mod timer;

pub use context::TaskContext;
pub use timer::TimerCallback;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tasker_core::{
    kdebug, kerror, ktrace, kwarn, Message, Periodic, Prioritized, Priority, Repeat, Response,
    ThreadError, ThreadHandle, ThreadResult, ThreadState, Tick, TimeSource, TimerId,
};

use crate::clock::clock;
use crate::config::runtime_config;
use crate::queue::{MessageQueue, Received, Responder};
use crate::thread::{contain, RunOutcome, Runnable, Thread, ThreadBuilder};
use timer::{Timer, TimerAction, TimerSet};

/// Message handling logic of a task
pub trait Handler: Send + Sized + 'static {
    /// Data carried by user messages
    type Payload: Send + 'static;

    /// Value returned to synchronous callers
    type Reply: Send + 'static;

    /// Handle one message. The return value is delivered to a caller
    /// blocked in `wait_msg`; it is dropped for posted messages.
    fn handle(
        &mut self,
        ctx: &mut TaskContext<'_, Self>,
        msg: Message<Self::Payload>,
    ) -> Option<Self::Reply>;

    /// Runs on the task thread before the first message
    fn on_start(&mut self, _ctx: &mut TaskContext<'_, Self>) {}

    /// Runs on the task thread after the loop exits
    fn on_exit(&mut self) {}
}

/// Work item on a task's queue
pub(crate) enum Command<H: Handler> {
    Deliver(Message<H::Payload>),
    AddTimer(Timer<H>),
    CancelTimer(TimerId),
}

impl<H: Handler> Prioritized for Command<H> {
    fn priority(&self) -> Priority {
        match self {
            Command::Deliver(msg) => msg.priority,
            // Timer control overtakes ordinary traffic
            Command::AddTimer(_) | Command::CancelTimer(_) => Priority::Realtime,
        }
    }
}

/// Construction parameters for a [`Task`]
pub struct TaskConfig<H> {
    pub handler: H,
    /// Thread name; generated from the runtime prefix when `None`
    pub name: Option<String>,
    /// Native priority of the task thread
    pub priority: Priority,
    /// Timer armed when the loop starts
    pub periodic: Option<Periodic>,
    /// Priority of periodic messages
    pub tick_priority: Priority,
    /// Stack size in bytes; runtime default when `None`
    pub stack_size: Option<usize>,
    /// Opaque value reachable through `TaskContext::user_data`
    pub user_data: Option<Box<dyn Any + Send>>,
}

impl<H: Handler> TaskConfig<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            name: None,
            priority: runtime_config().default_priority,
            periodic: None,
            tick_priority: Priority::Normal,
            stack_size: None,
            user_data: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn priority(mut self, p: Priority) -> Self {
        self.priority = p;
        self
    }

    /// Deliver a periodic message every `interval`, `repeat` times
    pub fn periodic(mut self, interval: Duration, repeat: Repeat) -> Self {
        self.periodic = Some(Periodic::new(interval, repeat));
        self
    }

    pub fn tick_priority(mut self, p: Priority) -> Self {
        self.tick_priority = p;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn user_data<T: Any + Send>(mut self, data: T) -> Self {
        self.user_data = Some(Box::new(data));
        self
    }
}

/// Cloneable handle for sending to a task from any thread
pub struct TaskSender<H: Handler> {
    queue: Arc<MessageQueue<Command<H>, H::Reply>>,
    owner: ThreadHandle,
}

impl<H: Handler> Clone for TaskSender<H> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            owner: self.owner,
        }
    }
}

impl<H: Handler> TaskSender<H> {
    /// Handle of the task's thread
    #[inline]
    pub fn owner(&self) -> ThreadHandle {
        self.owner
    }

    /// Enqueue and return immediately.
    ///
    /// Fails with `InvalidState` once the task has exited.
    pub fn post(&self, msg: Message<H::Payload>) -> ThreadResult<()> {
        self.queue.push(Command::Deliver(msg))
    }

    /// Enqueue and block until the handler has processed the message or
    /// `timeout` elapses.
    ///
    /// Fails with `SelfDeadlock` when called from the task's own thread.
    /// On timeout the message is still handled once; only this caller
    /// stops waiting.
    pub fn wait_msg(
        &self,
        msg: Message<H::Payload>,
        timeout: Duration,
    ) -> ThreadResult<Response<H::Reply>> {
        self.check_not_self("TaskSender::wait_msg")?;
        self.queue.push_and_wait(Command::Deliver(msg), Some(timeout))
    }

    /// Like [`wait_msg`](Self::wait_msg) without a deadline
    pub fn request(&self, msg: Message<H::Payload>) -> ThreadResult<Response<H::Reply>> {
        self.check_not_self("TaskSender::request")?;
        self.queue.push_and_wait(Command::Deliver(msg), None)
    }

    fn check_not_self(&self, op: &'static str) -> ThreadResult<()> {
        if self.owner.is_current() {
            kwarn!("{}: task {} posted synchronously to itself", op, self.owner);
            return Err(ThreadError::self_deadlock(
                op,
                format!("task {} cannot wait on its own queue", self.owner),
            ));
        }
        Ok(())
    }

    /// Ask the task to exit once queued work is drained
    pub fn quit(&self) -> ThreadResult<()> {
        self.post(Message::quit())
    }

    /// Start a timer delivering periodic messages
    pub fn add_timer(&self, interval: Duration, repeat: Repeat) -> ThreadResult<TimerId> {
        self.send_timer(Timer::new(interval, repeat, TimerAction::Dispatch, "Task::add_timer")?)
    }

    /// Start a timer running `callback` on the task thread
    pub fn add_timer_with<F>(
        &self,
        interval: Duration,
        repeat: Repeat,
        callback: F,
    ) -> ThreadResult<TimerId>
    where
        F: FnMut(&mut H, Tick) + Send + 'static,
    {
        let action = TimerAction::Callback(Box::new(callback));
        self.send_timer(Timer::new(interval, repeat, action, "Task::add_timer_with")?)
    }

    fn send_timer(&self, timer: Timer<H>) -> ThreadResult<TimerId> {
        let id = timer.id();
        self.queue.push(Command::AddTimer(timer))?;
        Ok(id)
    }

    /// Stop a timer. Unknown ids are ignored by the task.
    pub fn cancel_timer(&self, id: TimerId) -> ThreadResult<()> {
        self.queue.push(Command::CancelTimer(id))
    }

    /// Messages waiting to be handled
    pub fn pending(&self) -> ThreadResult<usize> {
        self.queue.len()
    }

    /// Check if the task has exited and stopped accepting messages
    pub fn is_closed(&self) -> ThreadResult<bool> {
        self.queue.is_closed()
    }
}

impl<H: Handler> fmt::Debug for TaskSender<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSender").field("owner", &self.owner).finish()
    }
}

/// Body of a task thread
pub(crate) struct TaskLoop<H: Handler> {
    handler: H,
    sender: TaskSender<H>,
    timers: TimerSet<H>,
    initial: Option<Timer<H>>,
    tick_priority: Priority,
    user_data: Option<Box<dyn Any + Send>>,
}

impl<H: Handler> Runnable for TaskLoop<H> {
    type Output = H;

    fn run_undetached(mut self) -> H {
        if let Some(timer) = self.initial.take() {
            self.timers.arm(timer, clock().now());
        }
        let mut quit = self.start();
        while !quit {
            quit = self.fire_due_timers();
            if quit {
                break;
            }
            match self.sender.queue.pop_until(self.timers.next_deadline()) {
                Ok(Some(received)) => quit = self.dispatch(received),
                // Nearest timer is due
                Ok(None) => {}
                Err(e) => {
                    kerror!("task {}: queue failed: {}", self.sender.owner, e);
                    break;
                }
            }
        }
        self.shutdown();
        self.handler
    }
}

impl<H: Handler> TaskLoop<H> {
    fn start(&mut self) -> bool {
        let mut quit = false;
        let result = {
            let mut ctx = TaskContext::new(
                &self.sender,
                &mut self.timers,
                &mut quit,
                &mut self.user_data,
                self.tick_priority,
            );
            let handler = &mut self.handler;
            contain(|| handler.on_start(&mut ctx))
        };
        if let Err(reason) = result {
            kerror!("task {}: on_start panicked: {}", self.sender.owner, reason);
        }
        kdebug!("task {} serving", self.sender.owner);
        quit
    }

    fn fire_due_timers(&mut self) -> bool {
        let now = clock().now();
        while let Some(mut timer) = self.timers.pop_due(now) {
            let tick = timer.tick();
            ktrace!("task {}: {} fired (#{})", self.sender.owner, tick.timer, tick.count);
            let quit = match &mut timer.action {
                TimerAction::Dispatch => {
                    self.deliver(Message::periodic(tick, self.tick_priority), None)
                }
                TimerAction::Callback(callback) => {
                    let handler = &mut self.handler;
                    if let Err(reason) = contain(|| callback(handler, tick)) {
                        let owner = self.sender.owner;
                        kerror!("task {}: {} callback panicked: {}", owner, tick.timer, reason);
                    }
                    false
                }
            };
            self.timers.finish(timer, clock().now());
            if quit {
                return true;
            }
        }
        false
    }

    fn dispatch(&mut self, received: Received<Command<H>, H::Reply>) -> bool {
        let Received { item, responder, .. } = received;
        match item {
            Command::Deliver(msg) => self.deliver(msg, responder),
            Command::AddTimer(timer) => {
                ktrace!("task {}: arming {}", self.sender.owner, timer.id());
                self.timers.arm(timer, clock().now());
                false
            }
            Command::CancelTimer(id) => {
                if !self.timers.cancel(id) {
                    kdebug!("task {}: cancel of unknown {}", self.sender.owner, id);
                }
                false
            }
        }
    }

    /// Run the handler on one message; returns true if the loop must exit
    fn deliver(
        &mut self,
        msg: Message<H::Payload>,
        responder: Option<Responder<H::Reply>>,
    ) -> bool {
        let mut quit = msg.kind.is_quit();
        let result = {
            let mut ctx = TaskContext::new(
                &self.sender,
                &mut self.timers,
                &mut quit,
                &mut self.user_data,
                self.tick_priority,
            );
            let handler = &mut self.handler;
            contain(|| handler.handle(&mut ctx, msg))
        };
        match (result, responder) {
            (Ok(reply), Some(responder)) => responder.complete(reply),
            (Ok(_), None) => {}
            (Err(reason), responder) => {
                kerror!("task {}: handler panicked: {}", self.sender.owner, reason);
                if let Some(responder) = responder {
                    responder.fail(reason);
                }
            }
        }
        quit
    }

    fn shutdown(&mut self) {
        self.timers.clear();
        match self.sender.queue.close() {
            Ok(0) => {}
            Ok(n) => kdebug!("task {}: dropped {} pending messages", self.sender.owner, n),
            Err(e) => kerror!("task {}: close failed: {}", self.sender.owner, e),
        }
        let handler = &mut self.handler;
        if let Err(reason) = contain(|| handler.on_exit()) {
            kerror!("task {}: on_exit panicked: {}", self.sender.owner, reason);
        }
        kdebug!("task {} stopped", self.sender.owner);
    }
}

/// A thread serving a message queue with a [`Handler`]
///
/// An undetached task keeps running until it receives Quit; quit it
/// before dropping the `Task` or the thread stays parked on its queue.
pub struct Task<H: Handler> {
    thread: Thread<TaskLoop<H>>,
    sender: TaskSender<H>,
}

impl<H: Handler> Task<H> {
    /// Create a task in state NEW.
    ///
    /// Fails with `BadValue` for a zero periodic interval or invalid
    /// stack size.
    pub fn new(config: TaskConfig<H>) -> ThreadResult<Self> {
        let mut builder = ThreadBuilder::new().priority(config.priority);
        if let Some(name) = config.name {
            builder = builder.name(name);
        }
        if let Some(bytes) = config.stack_size {
            builder = builder.stack_size(bytes);
        }
        let initial = config
            .periodic
            .map(|p| Timer::new(p.interval, p.repeat, TimerAction::Dispatch, "Task::new"))
            .transpose()?;
        let sender = TaskSender {
            queue: Arc::new(MessageQueue::new()?),
            owner: builder.handle(),
        };
        let body = TaskLoop {
            handler: config.handler,
            sender: sender.clone(),
            timers: TimerSet::new(),
            initial,
            tick_priority: config.tick_priority,
            user_data: config.user_data,
        };
        let thread = builder.build(body)?;
        Ok(Self { thread, sender })
    }

    /// Start detached; the handler is dropped on the task thread at exit
    pub fn start(&mut self) -> ThreadResult<()> {
        self.thread.start()
    }

    /// Start joinable; `join()` returns the handler
    pub fn start_undetached(&mut self) -> ThreadResult<()> {
        self.thread.start_undetached()
    }

    /// Wait for an undetached task to exit and take back its handler
    pub fn join(self) -> ThreadResult<RunOutcome<H>> {
        self.thread.join()
    }

    /// Cloneable sender for other threads
    #[inline]
    pub fn sender(&self) -> TaskSender<H> {
        self.sender.clone()
    }

    pub fn post(&self, msg: Message<H::Payload>) -> ThreadResult<()> {
        self.sender.post(msg)
    }

    pub fn wait_msg(
        &self,
        msg: Message<H::Payload>,
        timeout: Duration,
    ) -> ThreadResult<Response<H::Reply>> {
        self.sender.wait_msg(msg, timeout)
    }

    pub fn request(&self, msg: Message<H::Payload>) -> ThreadResult<Response<H::Reply>> {
        self.sender.request(msg)
    }

    pub fn add_timer(&self, interval: Duration, repeat: Repeat) -> ThreadResult<TimerId> {
        self.sender.add_timer(interval, repeat)
    }

    pub fn add_timer_with<F>(
        &self,
        interval: Duration,
        repeat: Repeat,
        callback: F,
    ) -> ThreadResult<TimerId>
    where
        F: FnMut(&mut H, Tick) + Send + 'static,
    {
        self.sender.add_timer_with(interval, repeat, callback)
    }

    pub fn cancel_timer(&self, id: TimerId) -> ThreadResult<()> {
        self.sender.cancel_timer(id)
    }

    pub fn quit(&self) -> ThreadResult<()> {
        self.sender.quit()
    }

    #[inline]
    pub fn id(&self) -> ThreadHandle {
        self.thread.id()
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.thread.name()
    }

    #[inline]
    pub fn state(&self) -> ThreadState {
        self.thread.state()
    }

    pub fn set_priority(&self, p: Priority) -> ThreadResult<()> {
        self.thread.set_priority(p)
    }
}

impl<H: Handler> fmt::Debug for Task<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("thread", &self.thread).finish()
    }
}
