//! Primitive latency benchmarks
//!
//! Run with: cargo bench -p tasker-runtime

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tasker_core::{Message, MessageKind, Priority};
use tasker_runtime::{Handler, MessageQueue, Mutex, Semaphore, Task, TaskConfig, TaskContext};

fn bench_mutex(c: &mut Criterion) {
    let m = Mutex::new(0u64).unwrap();
    c.bench_function("mutex_lock_unlock", |b| {
        b.iter(|| {
            let g = m.lock().unwrap();
            black_box(*g);
        })
    });
    c.bench_function("mutex_recursive_lock", |b| {
        let _outer = m.lock().unwrap();
        b.iter(|| {
            let g = m.lock().unwrap();
            black_box(*g);
        })
    });
}

fn bench_semaphore(c: &mut Criterion) {
    let s = Semaphore::new(1).unwrap();
    c.bench_function("semaphore_wait_post", |b| {
        b.iter(|| {
            s.wait().unwrap();
            s.post().unwrap();
        })
    });
}

fn bench_queue(c: &mut Criterion) {
    let q: MessageQueue<Message<u64>> = MessageQueue::new().unwrap();
    c.bench_function("queue_push_pop", |b| {
        b.iter(|| {
            q.push(Message::new(0, 1).with_priority(Priority::High)).unwrap();
            black_box(q.try_pop().unwrap());
        })
    });
}

struct Ping;

impl Handler for Ping {
    type Payload = u64;
    type Reply = u64;

    fn handle(&mut self, _ctx: &mut TaskContext<'_, Self>, msg: Message<u64>) -> Option<u64> {
        match msg.kind {
            MessageKind::User(_) => msg.payload,
            _ => None,
        }
    }
}

fn bench_task(c: &mut Criterion) {
    let mut task = Task::new(TaskConfig::new(Ping).name("bench-ping")).unwrap();
    task.start_undetached().unwrap();
    c.bench_function("task_wait_msg_round_trip", |b| {
        b.iter(|| {
            let resp = task.wait_msg(Message::new(1, 7), Duration::from_secs(1)).unwrap();
            black_box(resp);
        })
    });
    task.quit().unwrap();
    task.join().unwrap();
}

criterion_group!(benches, bench_mutex, bench_semaphore, bench_queue, bench_task);
criterion_main!(benches);
