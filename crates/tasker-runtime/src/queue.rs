//! Priority message queue
//!
//! Multi-producer queue ordered by priority (highest first) and, within
//! a priority, by arrival. Producers either post and continue, or post
//! and block on a per-message reply slot until the consumer completes the
//! message or a deadline passes.
//!
//! ```text
//!   push ─────────────┐
//!                     ▼
//!   push_and_wait ─► [heap: (priority desc, seq asc)] ─► pop ─► Received
//!        ▲                                                       │
//!        └────────────── ReplySlot ◄──── Responder::complete ────┘
//! ```
//!
//! A timed-out `push_and_wait` does not retract the message: it is still
//! delivered and handled exactly once, and only the waiting caller sees
//! `Response::TimedOut`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tasker_core::{
    kerror, Prioritized, Priority, Response, ThreadError, ThreadResult, TimeSource, Timespec,
};

use crate::clock::clock;
use crate::sync::{Condition, Mutex};

struct Entry<T, R> {
    priority: Priority,
    seq: u64,
    item: T,
    responder: Option<Responder<R>>,
}

impl<T, R> PartialEq for Entry<T, R> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl<T, R> Eq for Entry<T, R> {}

impl<T, R> PartialOrd for Entry<T, R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, R> Ord for Entry<T, R> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower seq (earlier) first
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState<T, R> {
    heap: BinaryHeap<Entry<T, R>>,
    next_seq: u64,
    closed: bool,
}

/// Priority + FIFO message queue with synchronous request/response
pub struct MessageQueue<T, R = ()> {
    state: Arc<Mutex<RefCell<QueueState<T, R>>>>,
    not_empty: Condition<RefCell<QueueState<T, R>>>,
}

impl<T: Prioritized, R> MessageQueue<T, R> {
    pub fn new() -> ThreadResult<Self> {
        let state = Arc::new(Mutex::new(RefCell::new(QueueState {
            heap: BinaryHeap::new(),
            next_seq: 0,
            closed: false,
        }))?);
        let not_empty = Condition::new(&state)?;
        Ok(Self { state, not_empty })
    }

    /// Enqueue without waiting.
    ///
    /// Fails with `InvalidState` once the queue is closed.
    pub fn push(&self, item: T) -> ThreadResult<()> {
        self.enqueue(item, None, "MessageQueue::push")
    }

    /// Enqueue and block until the consumer completes the message or
    /// `timeout` elapses (`None` waits forever).
    ///
    /// On timeout the message stays queued and is still handled once.
    pub fn push_and_wait(&self, item: T, timeout: Option<Duration>) -> ThreadResult<Response<R>> {
        let deadline = timeout.map(|t| clock().deadline(t));
        let slot = Arc::new(ReplySlot::new()?);
        let responder = Responder {
            slot: Arc::clone(&slot),
            done: false,
        };
        self.enqueue(item, Some(responder), "MessageQueue::push_and_wait")?;
        slot.wait(deadline)
    }

    fn enqueue(
        &self,
        item: T,
        responder: Option<Responder<R>>,
        op: &'static str,
    ) -> ThreadResult<()> {
        let guard = self.state.lock()?;
        {
            let mut st = guard.borrow_mut();
            if st.closed {
                return Err(ThreadError::invalid_state(op, "queue is closed"));
            }
            let seq = st.next_seq;
            st.next_seq += 1;
            st.heap.push(Entry {
                priority: item.priority(),
                seq,
                item,
                responder,
            });
        }
        self.not_empty.signal()
    }

    /// Dequeue the highest-priority, oldest message, waiting up to
    /// `timeout` (`None` waits forever).
    ///
    /// Returns `None` on timeout or once the queue is closed and empty.
    pub fn pop(&self, timeout: Option<Duration>) -> ThreadResult<Option<Received<T, R>>> {
        self.pop_until(timeout.map(|t| clock().deadline(t)))
    }

    /// Like [`pop`](Self::pop) with an absolute deadline
    pub fn pop_until(&self, deadline: Option<Timespec>) -> ThreadResult<Option<Received<T, R>>> {
        let mut guard = self.state.lock()?;
        loop {
            let next = guard.borrow_mut().heap.pop();
            if let Some(entry) = next {
                return Ok(Some(entry.into()));
            }
            if guard.borrow().closed {
                return Ok(None);
            }
            match deadline {
                None => self.not_empty.wait(&mut guard)?,
                Some(d) => {
                    if !self.not_empty.wait_until(&mut guard, d)? {
                        let next = guard.borrow_mut().heap.pop();
                        return Ok(next.map(Received::from));
                    }
                }
            }
        }
    }

    /// Dequeue without blocking
    pub fn try_pop(&self) -> ThreadResult<Option<Received<T, R>>> {
        let guard = self.state.lock()?;
        let next = guard.borrow_mut().heap.pop();
        Ok(next.map(Received::from))
    }

    /// Refuse further pushes and drop everything still queued.
    ///
    /// Synchronous callers of dropped messages get `Response::Abandoned`.
    /// Returns the number of messages dropped.
    pub fn close(&self) -> ThreadResult<usize> {
        let drained: Vec<Entry<T, R>> = {
            let guard = self.state.lock()?;
            let mut st = guard.borrow_mut();
            st.closed = true;
            let drained = std::mem::take(&mut st.heap).into_vec();
            drop(st);
            self.not_empty.broadcast()?;
            drained
        };
        // Responders fire outside the queue lock
        Ok(drained.len())
    }

    pub fn len(&self) -> ThreadResult<usize> {
        Ok(self.state.lock()?.borrow().heap.len())
    }

    pub fn is_empty(&self) -> ThreadResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_closed(&self) -> ThreadResult<bool> {
        Ok(self.state.lock()?.borrow().closed)
    }
}

impl<T, R> fmt::Debug for MessageQueue<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue").finish_non_exhaustive()
    }
}

/// A dequeued message, with its reply channel if it was posted
/// synchronously
pub struct Received<T, R> {
    pub item: T,
    pub priority: Priority,
    pub responder: Option<Responder<R>>,
}

impl<T, R> From<Entry<T, R>> for Received<T, R> {
    fn from(e: Entry<T, R>) -> Self {
        Self {
            item: e.item,
            priority: e.priority,
            responder: e.responder,
        }
    }
}

impl<T, R> Received<T, R> {
    /// Check if a caller is blocked waiting for this message
    #[inline]
    pub fn is_synchronous(&self) -> bool {
        self.responder.is_some()
    }

    /// Complete with `reply`; a no-op for asynchronous messages
    pub fn respond(self, reply: Option<R>) {
        if let Some(r) = self.responder {
            r.complete(reply);
        }
    }
}

/// Completes one synchronous message
///
/// Dropping it without completing reports `Response::Abandoned`.
pub struct Responder<R> {
    slot: Arc<ReplySlot<R>>,
    done: bool,
}

impl<R> Responder<R> {
    /// Handler finished; wake the caller with `reply`
    pub fn complete(mut self, reply: Option<R>) {
        self.done = true;
        self.slot.fill(Response::Handled(reply));
    }

    /// Handler failed; wake the caller with `reason`
    pub fn fail(mut self, reason: impl Into<String>) {
        self.done = true;
        self.slot.fill(Response::Failed(reason.into()));
    }
}

impl<R> Drop for Responder<R> {
    fn drop(&mut self) {
        if !self.done {
            self.slot.fill(Response::Abandoned);
        }
    }
}

/// One-shot rendezvous between a waiting producer and the consumer
struct ReplySlot<R> {
    value: Arc<Mutex<RefCell<Option<Response<R>>>>>,
    ready: Condition<RefCell<Option<Response<R>>>>,
}

impl<R> ReplySlot<R> {
    fn new() -> ThreadResult<Self> {
        let value = Arc::new(Mutex::new(RefCell::new(None))?);
        let ready = Condition::new(&value)?;
        Ok(Self { value, ready })
    }

    fn fill(&self, response: Response<R>) {
        let result = self.value.lock().and_then(|guard| {
            guard.borrow_mut().get_or_insert(response);
            self.ready.broadcast()
        });
        if let Err(e) = result {
            kerror!("reply lost: {}", e);
        }
    }

    fn wait(&self, deadline: Option<Timespec>) -> ThreadResult<Response<R>> {
        let mut guard = self.value.lock()?;
        loop {
            let filled = guard.borrow_mut().take();
            if let Some(response) = filled {
                return Ok(response);
            }
            match deadline {
                None => self.ready.wait(&mut guard)?,
                Some(d) => {
                    if !self.ready.wait_until(&mut guard, d)? {
                        let filled = guard.borrow_mut().take();
                        return Ok(filled.unwrap_or(Response::TimedOut));
                    }
                }
            }
        }
    }
}
