//! Echo task example
//!
//! Starts an echo task, then has several client threads send it
//! synchronous requests and a few fire-and-forget posts.
//!
//! # Environment Variables
//!
//! - `TASKER_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `TASKER_FLUSH_EPRINT=1` - Flush debug output immediately
//! - `ECHO_CLIENTS=4` - Number of client threads
//! - `ECHO_REQUESTS=5` - Requests per client

use std::time::{Duration, Instant};

use tasker::{env_get, kdebug, kinfo};
use tasker::{
    Handler, Message, MessageKind, Priority, Response, Task, TaskConfig, TaskContext, ThreadResult,
};

const ECHO: u32 = 1;
const NOTE: u32 = 2;

#[derive(Default)]
struct Echo {
    echoed: u64,
    notes: u64,
}

impl Handler for Echo {
    type Payload = String;
    type Reply = String;

    fn on_start(&mut self, ctx: &mut TaskContext<'_, Self>) {
        kinfo!("echo task {} ready", ctx.id());
    }

    fn handle(&mut self, _ctx: &mut TaskContext<'_, Self>, msg: Message<String>) -> Option<String> {
        match msg.kind {
            MessageKind::User(ECHO) => {
                self.echoed += 1;
                msg.payload
            }
            MessageKind::User(NOTE) => {
                self.notes += 1;
                kdebug!("note: {}", msg.payload.unwrap_or_default());
                None
            }
            _ => None,
        }
    }

    fn on_exit(&mut self) {
        kinfo!("echo task exiting after {} echoes, {} notes", self.echoed, self.notes);
    }
}

// TASKER_LOG_LEVEL=info cargo run -p tasker-echo
fn main() -> ThreadResult<()> {
    println!("=== tasker Echo Example ===\n");
    tasker::init();

    let clients: usize = env_get("ECHO_CLIENTS", 4);
    let requests: usize = env_get("ECHO_REQUESTS", 5);

    let config = TaskConfig::new(Echo::default()).name("echo").priority(Priority::High);
    let mut task = Task::new(config)?;
    task.start_undetached()?;

    let start = Instant::now();
    let mut threads = Vec::with_capacity(clients);
    for c in 0..clients {
        let sender = task.sender();
        threads.push(tasker::spawn(move || -> ThreadResult<usize> {
            let mut ok = 0;
            for r in 0..requests {
                let text = format!("client {} request {}", c, r);
                let request = Message::new(ECHO, text.clone());
                match sender.wait_msg(request, Duration::from_millis(1000))? {
                    Response::Handled(Some(reply)) if reply == text => ok += 1,
                    other => println!("client {}: unexpected response {:?}", c, other),
                }
            }
            let note = Message::new(NOTE, format!("client {} done", c));
            sender.post(note.with_priority(Priority::Low))?;
            Ok(ok)
        })?);
    }

    let mut total = 0;
    for t in threads {
        if let Some(Ok(ok)) = t.join()?.into_value() {
            total += ok;
        }
    }
    println!("{} / {} echoes matched in {:?}", total, clients * requests, start.elapsed());

    task.quit()?;
    let echo = task.join()?.into_value().unwrap_or_default();
    println!("task handled {} echoes and {} notes", echo.echoed, echo.notes);

    println!("\n=== Example Complete ===");
    Ok(())
}
