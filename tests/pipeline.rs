//! End-to-end tests through the public API

use std::collections::VecDeque;
use std::fs;
use std::io::SeekFrom;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use event_broker::event::make_type;
use event_broker::file::{OpenMode, Splitter};
use event_broker::stats::{EntityKind, StatUpdate};
use event_broker::{
    Broker, BrokerConfig, Engine, Error, Event, EventType, FilterSet, Muxer, MuxerConfig,
    ReadOutcome, Result, StatsCenter, Stream, Subscriber,
};

const TYPE_A: EventType = make_type(1, 14);
const TYPE_B: EventType = make_type(1, 24);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Replays a list of events, then reports the stream closed
struct Source {
    events: Mutex<VecDeque<Event>>,
}

impl Source {
    fn new(events: impl IntoIterator<Item = Event>) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(events.into_iter().collect()),
        })
    }
}

impl Stream for Source {
    fn read(&self, _timeout: Duration) -> Result<ReadOutcome> {
        Ok(match self.events.lock().pop_front() {
            Some(event) => ReadOutcome::Event(event),
            None => ReadOutcome::Closed,
        })
    }

    fn write(&self, _event: Event) -> Result<usize> {
        Err(Error::shutdown("source is read-only"))
    }
}

/// Records what it is given; can be told to fail
struct Sink {
    received: Mutex<Vec<Event>>,
    failing: Mutex<bool>,
}

impl Sink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        })
    }
}

impl Stream for Sink {
    fn read(&self, _timeout: Duration) -> Result<ReadOutcome> {
        Ok(ReadOutcome::TimedOut)
    }

    fn write(&self, event: Event) -> Result<usize> {
        if *self.failing.lock() {
            return Err(Error::Stream("broken pipe".into()));
        }
        self.received.lock().push(event);
        Ok(1)
    }

    fn peer(&self) -> String {
        "sink://test".into()
    }
}

#[test]
fn test_write_filter_scenario() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::new());
    engine.start();

    let muxer = Muxer::new("q", MuxerConfig::with_queue_dir(dir.path())).unwrap();
    muxer.set_write_filters(FilterSet::from([TYPE_A]));
    let q = Subscriber::new(engine.clone(), muxer);

    engine.publish(Event::new(TYPE_A, "host status"));
    engine.publish(Event::new(TYPE_B, "service status"));

    assert_eq!(q.muxer().pending_count(), 1);
    let event = q.muxer().read(Duration::ZERO).unwrap().into_event().unwrap();
    assert_eq!(event.type_id(), TYPE_A);
    assert_eq!(q.muxer().read(Duration::ZERO).unwrap(), ReadOutcome::TimedOut);
}

#[test]
fn test_order_survives_overflow_and_rotation() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(Engine::new());
    engine.start();

    let config = MuxerConfig::with_queue_dir(dir.path())
        .event_queue_max_size(10)
        .max_file_size(64);
    let q = Subscriber::new(engine.clone(), Muxer::new("slow", config).unwrap());

    for i in 0..200u32 {
        engine.publish(Event::new(TYPE_A, i.to_be_bytes().to_vec()));
    }
    assert!(q.muxer().is_overflowing());
    assert!(dir.path().join("slow.queue.1").exists());
    assert_eq!(q.muxer().pending_count(), 200);

    for i in 0..200u32 {
        let event = q.muxer().read(Duration::ZERO).unwrap().into_event().unwrap();
        assert_eq!(event.payload().as_ref(), i.to_be_bytes());
        if i % 7 == 0 {
            q.muxer().ack(7);
        }
    }
    assert_eq!(q.muxer().pending_count(), 0);
    assert!(!dir.path().join("slow.queue").exists());
    assert!(!dir.path().join("slow.queue.1").exists());
}

#[test]
fn test_ack_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let muxer = Muxer::new("acks", MuxerConfig::with_queue_dir(dir.path())).unwrap();

    muxer.push(Event::new(TYPE_A, "a")).unwrap();
    muxer.push(Event::new(TYPE_A, "b")).unwrap();
    muxer.read(Duration::ZERO).unwrap();

    assert_eq!(muxer.ack(1), 1);
    assert_eq!(muxer.ack(1), 0);
    assert_eq!(muxer.unacknowledged_count(), 0);
    assert_eq!(muxer.pending_count(), 1);
}

#[test]
fn test_splitter_round_trip_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("retention");
    let store = Splitter::open(&base, OpenMode::ReadWrite, 100, false).unwrap();

    let data: Vec<u8> = (0..350u32).map(|i| (i % 251) as u8).collect();
    for chunk in data.chunks(33) {
        assert_eq!(store.write(chunk).unwrap(), chunk.len());
    }
    store.flush().unwrap();

    let files = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 4);
    assert_eq!(store.tell(), 350);

    let mut out = vec![0u8; 400];
    let mut read = 0;
    loop {
        let n = store.read(&mut out[read..]).unwrap();
        if n == 0 {
            break;
        }
        read += n;
    }
    assert_eq!(&out[..read], &data[..]);
}

#[test]
fn test_splitter_thirteen_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("split");
    let store = Splitter::open(&base, OpenMode::Write, 10, false).unwrap();

    store.write(b"0123456789ABC").unwrap();
    store.close().unwrap();

    assert_eq!(fs::read(&base).unwrap(), b"0123456789");
    assert_eq!(fs::read(store.file_path(1)).unwrap(), b"ABC");
    assert_eq!(store.tell(), 13);

    store.seek(SeekFrom::Start(8)).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(store.read(&mut buf).unwrap(), 5);
    assert_eq!(&buf, b"89ABC");
}

#[test]
fn test_foobar_snapshot() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let center = StatsCenter::spawn(runtime.handle());

    let handle = center.register_entity(EntityKind::Endpoint, "foobar").unwrap();
    center.update(handle, StatUpdate::Status("OK".into())).unwrap();
    center
        .update(handle, StatUpdate::State("Connected".into()))
        .unwrap();

    let snapshot: serde_json::Value =
        serde_json::from_str(&center.snapshot_as_text().unwrap()).unwrap();
    let endpoint = &snapshot["endpoint"][0];
    assert_eq!(endpoint["name"], "foobar");
    assert_eq!(endpoint["state"], "Connected");
    assert_eq!(endpoint["status"], "OK");
}

#[test]
fn test_relay_through_broker() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::new(
        BrokerConfig::with_cache_dir(dir.path())
            .pool_size(2)
            .event_queue_max_size(16)
            .max_file_size(256),
    )
    .unwrap();

    let sink = Sink::new();
    broker
        .add_feeder("sink", sink.clone(), FilterSet::all(), FilterSet::from([TYPE_B]))
        .unwrap();

    // Published before the engine starts: retained, then delivered first
    broker.publish(Event::new(TYPE_B, "early"));

    let source = Source::new((0..500u32).map(|i| Event::new(TYPE_B, i.to_string())));
    broker
        .add_feeder("source", source, FilterSet::all(), FilterSet::from([TYPE_A]))
        .unwrap();
    assert_eq!(broker.feeder_count(), 2);

    broker.start();
    assert!(wait_for(|| sink.received.lock().len() == 501));

    let received = sink.received.lock();
    assert_eq!(received[0].payload().as_ref(), b"early");
    for (i, event) in received[1..].iter().enumerate() {
        assert_eq!(event.payload().as_ref(), i.to_string().as_bytes());
    }
    drop(received);

    let snapshot: serde_json::Value = serde_json::from_str(&broker.snapshot().unwrap()).unwrap();
    let names: Vec<&str> = snapshot["feeder"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert_eq!(names, vec!["sink", "source"]);

    broker.shutdown();
}

#[test]
fn test_failed_feeder_is_reaped() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::new(BrokerConfig::with_cache_dir(dir.path()).pool_size(2)).unwrap();
    broker.start();

    let sink = Sink::new();
    *sink.failing.lock() = true;
    let handle = broker
        .add_feeder("broken", sink.clone(), FilterSet::all(), FilterSet::all())
        .unwrap();

    broker.publish(Event::new(TYPE_A, "x"));

    assert!(wait_for(|| broker
        .stats()
        .get(handle)
        .map(|s| s.last_error.is_some())
        .unwrap_or(false)));
    let stats = broker.stats().get(handle).unwrap();
    assert_eq!(stats.last_error.as_deref(), Some("stream error: broken pipe"));

    assert!(wait_for(|| broker.reap_finished_feeders() == 1));
    assert_eq!(broker.feeder_count(), 0);
    assert!(wait_for(|| Arc::strong_count(&sink) == 1));

    broker.shutdown();
}
