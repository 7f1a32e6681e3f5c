use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use tasker::constants::SEMAPHORE_MAX_INITIAL;
use tasker::{Condition, ErrorKind, Mutex, Semaphore, TryLockResult};

#[test]
fn semaphore_initial_count_bound() {
    for initial in [0, 1, 1000, SEMAPHORE_MAX_INITIAL] {
        let s = Semaphore::new(initial).unwrap();
        assert_eq!(s.value().unwrap(), initial);
    }
    for initial in [SEMAPHORE_MAX_INITIAL + 1, u32::MAX] {
        let err = Semaphore::new(initial).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::BadValue);
        assert_eq!(err.op(), "Semaphore::new");
    }
}

#[test]
fn semaphore_wakes_blocked_waiter() {
    let s = Arc::new(Semaphore::new(0).unwrap());
    let s2 = Arc::clone(&s);
    let waiter = tasker::spawn(move || {
        let start = Instant::now();
        s2.wait().unwrap();
        start.elapsed()
    })
    .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    s.post().unwrap();
    let waited = waiter.join().unwrap().into_value().unwrap();
    assert!(waited >= Duration::from_millis(15));
    assert_eq!(s.value().unwrap(), 0);
}

#[test]
fn mutex_handoff_between_threads() {
    // A locks; B's bounded attempt fails; A unlocks; B's next attempt succeeds
    let m = Arc::new(Mutex::new(()).unwrap());
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let m_a = Arc::clone(&m);
    let a = tasker::spawn(move || {
        let guard = m_a.lock().unwrap();
        locked_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        drop(guard);
    })
    .unwrap();

    locked_rx.recv().unwrap();
    let m_b = Arc::clone(&m);
    let b = tasker::spawn(move || {
        let start = Instant::now();
        let first = m_b.timed_try_lock(Duration::from_millis(50)).is_busy();
        let waited = start.elapsed();
        release_tx.send(()).unwrap();
        let second = m_b.timed_try_lock(Duration::from_secs(5)).is_locked();
        (first, waited, second)
    })
    .unwrap();

    let (first_busy, waited, second_locked) = b.join().unwrap().into_value().unwrap();
    assert!(first_busy);
    assert!(waited >= Duration::from_millis(50));
    assert!(second_locked);
    a.join().unwrap();
}

#[test]
fn timed_try_lock_zero_is_immediate() {
    let m = Arc::new(Mutex::new(()).unwrap());
    let _held = m.lock().unwrap();
    let m2 = Arc::clone(&m);
    let t = tasker::spawn(move || {
        let start = Instant::now();
        let r = matches!(m2.timed_try_lock(Duration::ZERO), TryLockResult::Busy);
        (r, start.elapsed())
    })
    .unwrap();
    let (busy, elapsed) = t.join().unwrap().into_value().unwrap();
    assert!(busy);
    assert!(elapsed < Duration::from_millis(20));
}

#[test]
fn condition_producer_consumer() {
    let m = Arc::new(Mutex::new(Cell::new(0u32)).unwrap());
    let not_zero = Arc::new(Condition::new(&m).unwrap());
    let consumed = Arc::new(AtomicU32::new(0));

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let (cond, consumed) = (Arc::clone(&not_zero), Arc::clone(&consumed));
            tasker::spawn(move || {
                for _ in 0..10 {
                    let mut g = cond.mutex().lock().unwrap();
                    while g.get() == 0 {
                        cond.wait(&mut g).unwrap();
                    }
                    g.set(g.get() - 1);
                    consumed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap()
        })
        .collect();

    for _ in 0..30 {
        let g = m.lock().unwrap();
        g.set(g.get() + 1);
        not_zero.broadcast().unwrap();
        drop(g);
        std::thread::yield_now();
    }
    for c in consumers {
        assert!(c.join().unwrap().is_completed());
    }
    assert_eq!(consumed.load(Ordering::SeqCst), 30);
    assert_eq!(m.lock().unwrap().get(), 0);
}
