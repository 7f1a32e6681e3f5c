//! Handler-side view of the running task

use std::any::Any;
use std::time::Duration;

use tasker_core::{Message, Priority, Repeat, ThreadHandle, ThreadResult, Tick, TimeSource, TimerId};

use super::timer::{Timer, TimerAction, TimerSet};
use super::{Handler, TaskSender};
use crate::clock::clock;

/// Passed to every [`Handler`] call; valid for that call only
pub struct TaskContext<'a, H: Handler> {
    sender: &'a TaskSender<H>,
    timers: &'a mut TimerSet<H>,
    quit: &'a mut bool,
    user_data: &'a mut Option<Box<dyn Any + Send>>,
    tick_priority: Priority,
}

impl<'a, H: Handler> TaskContext<'a, H> {
    pub(crate) fn new(
        sender: &'a TaskSender<H>,
        timers: &'a mut TimerSet<H>,
        quit: &'a mut bool,
        user_data: &'a mut Option<Box<dyn Any + Send>>,
        tick_priority: Priority,
    ) -> Self {
        Self {
            sender,
            timers,
            quit,
            user_data,
            tick_priority,
        }
    }

    /// Handle of the task's thread
    #[inline]
    pub fn id(&self) -> ThreadHandle {
        self.sender.owner()
    }

    /// Sender for the task's own queue, e.g. to hand to other tasks
    #[inline]
    pub fn sender(&self) -> &TaskSender<H> {
        self.sender
    }

    /// Queue a message to this task; it is handled after the current one
    pub fn post(&self, msg: Message<H::Payload>) -> ThreadResult<()> {
        self.sender.post(msg)
    }

    /// Start a timer delivering `MessageKind::Periodic` to the handler
    pub fn add_timer(&mut self, interval: Duration, repeat: Repeat) -> ThreadResult<TimerId> {
        self.arm(Timer::new(interval, repeat, TimerAction::Dispatch, "TaskContext::add_timer")?)
    }

    /// Start a timer running `callback` on the task thread
    pub fn add_timer_with<F>(
        &mut self,
        interval: Duration,
        repeat: Repeat,
        callback: F,
    ) -> ThreadResult<TimerId>
    where
        F: FnMut(&mut H, Tick) + Send + 'static,
    {
        let action = TimerAction::Callback(Box::new(callback));
        self.arm(Timer::new(interval, repeat, action, "TaskContext::add_timer_with")?)
    }

    fn arm(&mut self, timer: Timer<H>) -> ThreadResult<TimerId> {
        let id = timer.id();
        self.timers.arm(timer, clock().now());
        Ok(id)
    }

    /// Stop a timer; returns false if it is unknown or already retired
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    /// Number of armed timers
    #[inline]
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Exit the run loop once the current dispatch returns
    #[inline]
    pub fn quit(&mut self) {
        *self.quit = true;
    }

    #[inline]
    pub fn is_quitting(&self) -> bool {
        *self.quit
    }

    /// Priority stamped on periodic messages
    #[inline]
    pub fn tick_priority(&self) -> Priority {
        self.tick_priority
    }

    /// User data attached at construction, if it is a `T`
    pub fn user_data<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_deref_mut()?.downcast_mut::<T>()
    }
}
