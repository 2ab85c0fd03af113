//! Relay example: one feeder produces events, another one consumes them
//!
//! Run with: cargo run --example relay [CACHE_DIR]
//!
//! ```text
//!   [generator stream] ──► feeder "generator" ──► Engine ──► queue "printer"
//!                                                               │
//!                                 [printer stream] ◄── feeder "printer"
//! ```
//!
//! Set `RUST_LOG=event_broker=debug` to follow queues and feeders.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use event_broker::event::make_type;
use event_broker::{Broker, BrokerConfig, Event, EventType, FilterSet, ReadOutcome, Result, Stream};

const SERVICE_STATUS: EventType = make_type(1, 24);
const EXTERNAL_COMMAND: EventType = make_type(1, 1);

/// Emits a fixed number of service statuses, then closes
struct Generator {
    events: Mutex<VecDeque<Event>>,
}

impl Generator {
    fn new(count: usize) -> Self {
        let events = (0..count)
            .map(|i| Event::new(SERVICE_STATUS, format!("service {} is OK", i)))
            .collect();
        Self {
            events: Mutex::new(events),
        }
    }
}

impl Stream for Generator {
    fn read(&self, _timeout: Duration) -> Result<ReadOutcome> {
        Ok(match self.events.lock().pop_front() {
            Some(event) => ReadOutcome::Event(event),
            None => ReadOutcome::Closed,
        })
    }

    fn write(&self, _event: Event) -> Result<usize> {
        Ok(1)
    }

    fn peer(&self) -> String {
        "generator://local".into()
    }
}

/// Logs every event it receives
struct Printer {
    received: AtomicU64,
}

impl Stream for Printer {
    fn read(&self, _timeout: Duration) -> Result<ReadOutcome> {
        Ok(ReadOutcome::TimedOut)
    }

    fn write(&self, event: Event) -> Result<usize> {
        let n = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            count = n,
            type_id = event.type_id(),
            payload = %String::from_utf8_lossy(event.payload()),
            "Event received"
        );
        Ok(1)
    }

    fn peer(&self) -> String {
        "printer://stdout".into()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("event_broker=info".parse().unwrap()),
        )
        .init();

    let cache_dir = std::env::args()
        .nth(1)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("event-broker-relay"));

    let broker = Broker::new(
        BrokerConfig::with_cache_dir(&cache_dir)
            .name("relay")
            .event_queue_max_size(100),
    )?;

    let printer = Arc::new(Printer {
        received: AtomicU64::new(0),
    });
    broker.add_feeder(
        "printer",
        printer.clone(),
        FilterSet::all(),
        FilterSet::from([SERVICE_STATUS]),
    )?;
    broker.add_feeder(
        "generator",
        Arc::new(Generator::new(1_000)),
        FilterSet::all(),
        FilterSet::from([EXTERNAL_COMMAND]),
    )?;

    broker.start();

    while printer.received.load(Ordering::Relaxed) < 1_000 {
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("{}", broker.snapshot()?);
    broker.shutdown();
    Ok(())
}
