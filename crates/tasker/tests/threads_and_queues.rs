use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tasker::{ErrorKind, Message, MessageQueue, Priority, RunOutcome, Runnable, Thread, ThreadState};

struct DropCounter {
    runs: Arc<AtomicU32>,
    drops: Arc<AtomicU32>,
}

impl Runnable for DropCounter {
    type Output = ();

    fn run_undetached(self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("condition not reached");
}

#[test]
fn detached_thread_disposed_exactly_once() {
    let runs = Arc::new(AtomicU32::new(0));
    let drops = Arc::new(AtomicU32::new(0));
    let mut t = Thread::new(DropCounter {
        runs: Arc::clone(&runs),
        drops: Arc::clone(&drops),
    })
    .unwrap();
    t.start().unwrap();
    wait_for(|| t.state() == ThreadState::Terminated);

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(t.join().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn join_on_new_thread_returns_immediately() {
    let drops = Arc::new(AtomicU32::new(0));
    let t = Thread::new(DropCounter {
        runs: Arc::new(AtomicU32::new(0)),
        drops: Arc::clone(&drops),
    })
    .unwrap();
    assert_eq!(t.join().unwrap(), RunOutcome::NotStarted);
    // The unstarted body is disposed along with the thread
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn multi_producer_pops_each_once_in_order() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 50;

    let q: Arc<MessageQueue<Message<(u32, u32)>>> = Arc::new(MessageQueue::new().unwrap());
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let q = Arc::clone(&q);
            tasker::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let prio = if i % 5 == 0 { Priority::High } else { Priority::Normal };
                    q.push(Message::new(0, (p, i)).with_priority(prio)).unwrap();
                }
            })
            .unwrap()
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }

    let mut seen = HashSet::new();
    let mut last_prio = Priority::Realtime;
    let mut last_index = vec![[None::<u32>; 2]; PRODUCERS as usize];
    while let Some(r) = q.try_pop().unwrap() {
        let (p, i) = r.item.payload.unwrap();
        assert!(seen.insert((p, i)), "duplicate ({}, {})", p, i);

        // Priorities never increase
        assert!(r.priority <= last_prio);
        last_prio = r.priority;

        // FIFO per producer within a band
        let band = usize::from(r.priority == Priority::High);
        if let Some(prev) = last_index[p as usize][band] {
            assert!(i > prev);
        }
        last_index[p as usize][band] = Some(i);
    }
    assert_eq!(seen.len(), (PRODUCERS * PER_PRODUCER) as usize);
}

#[test]
fn blocking_pop_sees_cross_thread_push() {
    let q: Arc<MessageQueue<Message<u32>>> = Arc::new(MessageQueue::new().unwrap());
    let q2 = Arc::clone(&q);
    let consumer = tasker::spawn(move || {
        let received = q2.pop(Some(Duration::from_secs(5))).unwrap();
        received.map(|r| r.item.payload)
    })
    .unwrap();
    std::thread::sleep(Duration::from_millis(10));
    q.push(Message::new(1, 99)).unwrap();
    assert_eq!(consumer.join().unwrap().into_value(), Some(Some(Some(99))));
}
