//! Periodic task example
//!
//! A task with a built-in 100ms ticker that fires a fixed number of
//! times, plus a one-shot callback timer added from outside. The task
//! quits itself after the last tick.
//!
//! # Environment Variables
//!
//! - `TASKER_LOG_LEVEL=trace` - Show timer arming and expiry
//! - `PERIODIC_MS=100` - Tick interval in milliseconds (at least 1)
//! - `PERIODIC_COUNT=10` - Number of ticks (at least 1)

use std::time::{Duration, Instant};

use tasker::{env_get, kinfo};
use tasker::{
    Handler, Message, MessageKind, Periodic, Repeat, Task, TaskConfig, TaskContext, ThreadError,
    ThreadResult,
};

struct Ticker {
    started: Instant,
    last: Option<Instant>,
    min_gap: Option<Duration>,
    ticks: u64,
    alarms: u64,
}

impl Handler for Ticker {
    type Payload = ();
    type Reply = ();

    fn handle(&mut self, ctx: &mut TaskContext<'_, Self>, msg: Message<()>) -> Option<()> {
        if let MessageKind::Periodic(tick) = msg.kind {
            let now = Instant::now();
            if let Some(last) = self.last {
                let gap = now - last;
                self.min_gap = Some(self.min_gap.map_or(gap, |g| g.min(gap)));
            }
            self.last = Some(now);
            self.ticks += 1;
            println!("tick {:>2} at {:>6.1?}", tick.count, now - self.started);
            if tick.is_last() {
                ctx.quit();
            }
        }
        None
    }
}

/// Ticker schedule from the demo settings. The ticker quits on its last
/// tick, so a zero count would leave it running forever.
fn schedule(interval_ms: u64, count: u32) -> ThreadResult<Periodic> {
    if interval_ms == 0 {
        return Err(ThreadError::bad_value("schedule", "PERIODIC_MS must be at least 1"));
    }
    if count == 0 {
        return Err(ThreadError::bad_value("schedule", "PERIODIC_COUNT must be at least 1"));
    }
    Ok(Periodic::new(Duration::from_millis(interval_ms), Repeat::Times(count)))
}

// TASKER_LOG_LEVEL=trace cargo run -p tasker-periodic
fn main() -> ThreadResult<()> {
    println!("=== tasker Periodic Example ===\n");
    tasker::init();

    let periodic = schedule(env_get("PERIODIC_MS", 100), env_get("PERIODIC_COUNT", 10))?;
    let interval = periodic.interval;

    let ticker = Ticker {
        started: Instant::now(),
        last: None,
        min_gap: None,
        ticks: 0,
        alarms: 0,
    };
    let config = TaskConfig::new(ticker)
        .name("ticker")
        .periodic(interval, periodic.repeat);
    let mut task = Task::new(config)?;
    task.start_undetached()?;

    task.add_timer_with(interval * 3 + interval / 2, Repeat::ONCE, |ticker: &mut Ticker, tick| {
        ticker.alarms += 1;
        kinfo!("alarm {} went off", tick.timer);
    })?;

    let ticker = task.join()?.into_value();
    if let Some(t) = ticker {
        println!(
            "\n{} ticks, {} alarm(s), min gap {:?} (interval {:?})",
            t.ticks, t.alarms, t.min_gap, interval
        );
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
