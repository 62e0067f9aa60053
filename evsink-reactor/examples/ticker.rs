//! Ticker - a timer thread and a worker thread feeding one event loop
//!
//! This example shows the three delivery modes side by side:
//! - The timer queues a `Tick` every 200ms
//! - The worker commits progress synchronously and wakes the loop when done
//! - The loop prints queued events and counts idle periods
//!
//! Run with: cargo run -p evsink-reactor --example ticker

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use evsink_core::{Event, EventSource, SinkId};
use evsink_reactor::{EventLoop, LoopConfig, LoopConsumer};

#[derive(Debug, Clone)]
enum Activity {
    Tick(u32),
    Progress(u32),
    Finished,
}

impl Event for Activity {
    fn kind(&self) -> &'static str {
        match self {
            Activity::Tick(_) => "tick",
            Activity::Progress(_) => "progress",
            Activity::Finished => "finished",
        }
    }
}

#[derive(Default)]
struct Dashboard {
    ticks: u32,
    idle: u32,
}

impl LoopConsumer<Activity> for Dashboard {
    fn on_event(&mut self, event: Activity) {
        match event {
            Activity::Tick(n) => {
                self.ticks += 1;
                println!("[loop] tick #{n}");
            }
            other => println!("[loop] queued {:?}", other),
        }
    }

    fn on_wake(&mut self) {
        println!("[loop] woken");
    }

    fn on_idle(&mut self) {
        self.idle += 1;
    }

    fn on_stop(&mut self) {
        println!(
            "[loop] stopping after {} ticks and {} idle periods",
            self.ticks, self.idle
        );
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    evsink_core::logging::init_logging_from_env()?;

    println!("=== evsink ticker ===\n");

    let progress = Arc::new(AtomicU32::new(0));
    let committed = Arc::clone(&progress);

    let config = LoopConfig::named("ticker").with_idle_timeout(Duration::from_millis(50));
    let mut event_loop =
        EventLoop::spawn_with_commit(config, Dashboard::default(), move |event: Activity| {
            if let Activity::Progress(percent) = event {
                committed.store(percent, Ordering::SeqCst);
            }
            Ok(())
        })?;

    // Timer: queued deliveries until the loop unsubscribes it
    let timer = EventSource::with_unsubscribe_callback("timer", |sink: SinkId| {
        println!("[timer] unsubscribed by {sink}");
    });
    event_loop.attach(&timer)?;
    let timer_thread = thread::spawn(move || {
        let mut n = 0;
        while timer.is_attached() {
            n += 1;
            timer.queue_event(Activity::Tick(n));
            thread::sleep(Duration::from_millis(200));
        }
    });

    // Worker: synchronous progress commits, then a wake
    let worker = EventSource::named("worker");
    event_loop.attach(&worker)?;
    let worker_thread = thread::spawn(move || {
        for percent in (0..=100).step_by(25) {
            if let Err(e) = worker.commit_event(Activity::Progress(percent)) {
                eprintln!("[worker] commit failed: {e}");
            }
            thread::sleep(Duration::from_millis(150));
        }
        worker.queue_event(Activity::Finished);
        worker.wake();
    });

    if worker_thread.join().is_err() {
        eprintln!("worker thread panicked");
    }
    println!("\nProgress committed: {}%", progress.load(Ordering::SeqCst));

    thread::sleep(Duration::from_millis(300));
    println!("\n{}", event_loop.stats());

    event_loop.shutdown()?;
    if timer_thread.join().is_err() {
        eprintln!("timer thread panicked");
    }

    Ok(())
}
