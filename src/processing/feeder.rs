//! Feeder
//!
//! A feeder owns one thread pumping events in both directions between a
//! transport stream and a subscriber queue:
//!
//! ```text
//!                 read (biased)            publish
//!   [Stream] ─────────────────► Feeder ─────────────► Engine ──► muxers
//!      ▲                          │
//!      │         write + ack(1)   │  read
//!      └──────────────────────────┴──────────────── [own Muxer]
//! ```
//!
//! States move `Stopped -> Running -> Finished`. The constructor returns once
//! the thread is running; dropping the feeder stops and joins it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use super::config::FeederConfig;
use super::stream::Stream;
use crate::error::{Error, Result};
use crate::event::{Event, ReadOutcome};
use crate::multiplexing::{Muxer, Subscriber};
use crate::stats::{EntityHandle, EntityKind, ProcessingSpeed, StatsCenter, StatsReporter};

/// Lifecycle of a feeder thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeederState {
    Stopped,
    Running,
    Finished,
}

impl FeederState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeederState::Stopped => "stopped",
            FeederState::Running => "running",
            FeederState::Finished => "finished",
        }
    }
}

struct Shared {
    name: String,
    config: FeederConfig,
    state: Mutex<FeederState>,
    state_changed: Condvar,
    should_exit: AtomicBool,
    /// Released when the thread exits
    stream: RwLock<Option<Arc<dyn Stream>>>,
    subscriber: Subscriber,
    stats: StatsReporter,
    speed: Mutex<ProcessingSpeed>,
    last_error: Mutex<Option<String>>,
}

/// Worker bridging one stream and one subscriber queue
pub struct Feeder {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Feeder {
    /// Start a feeder thread and wait until it runs
    ///
    /// Statistics calls block, so this must not be called from async code.
    pub fn new(
        name: impl Into<String>,
        stream: Arc<dyn Stream>,
        subscriber: Subscriber,
        center: &StatsCenter,
        config: FeederConfig,
    ) -> Result<Self> {
        let name = name.into();
        let peer = stream.peer();

        let stats = StatsReporter::register(center, EntityKind::Feeder, &name)?;
        {
            let muxer = subscriber.muxer();
            stats.set_read_filters(&muxer.read_filters());
            stats.set_write_filters(&muxer.write_filters());
            stats.set_queue_file_path(&muxer.queue_file_path().display().to_string());
            stats.set_memory_file_path(&muxer.memory_file_path().display().to_string());
        }
        let now = chrono::Utc::now().timestamp();
        stats.set_last_connection_attempt(now);
        stats.set_last_connection_success(now);
        stats.set_state("connecting");

        let shared = Arc::new(Shared {
            name,
            config,
            state: Mutex::new(FeederState::Stopped),
            state_changed: Condvar::new(),
            should_exit: AtomicBool::new(false),
            stream: RwLock::new(Some(stream)),
            subscriber,
            stats,
            speed: Mutex::new(ProcessingSpeed::new()),
            last_error: Mutex::new(None),
        });

        let thread = thread::Builder::new()
            .name(format!("feeder-{}", shared.name))
            .spawn({
                let shared = shared.clone();
                move || shared.run()
            })
            .map_err(Error::Thread)?;

        let mut state = shared.state.lock();
        while *state == FeederState::Stopped {
            shared.state_changed.wait(&mut state);
        }
        drop(state);

        tracing::info!(feeder = %shared.name, peer = %peer, "Feeder started");

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> FeederState {
        *self.shared.state.lock()
    }

    /// Whether the thread has left its loop for good
    pub fn is_finished(&self) -> bool {
        *self.shared.state.lock() == FeederState::Finished
            && self.shared.should_exit.load(Ordering::Acquire)
    }

    pub fn stats_handle(&self) -> EntityHandle {
        self.shared.stats.handle()
    }

    pub fn muxer(&self) -> &Arc<Muxer> {
        self.shared.subscriber.muxer()
    }

    /// Error that ended the loop, if any
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }
}

impl Drop for Feeder {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        match *state {
            FeederState::Stopped => {
                self.shared.should_exit.store(true, Ordering::Release);
                *state = FeederState::Finished;
            }
            FeederState::Running => {
                self.shared.should_exit.store(true, Ordering::Release);
                while *state != FeederState::Finished {
                    self.shared.state_changed.wait(&mut state);
                }
            }
            FeederState::Finished => {}
        }
        drop(state);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(feeder = %self.shared.name, "Feeder thread panicked");
            }
        }
        tracing::debug!(feeder = %self.shared.name, "Feeder stopped");
    }
}

impl std::fmt::Debug for Feeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feeder")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn run(&self) {
        tracing::info!(feeder = %self.name, "Feeder thread is starting");
        self.stats.set_state("connected");
        {
            let mut state = self.state.lock();
            *state = FeederState::Running;
            self.state_changed.notify_all();
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.pump()))
            .unwrap_or_else(|_| Err(Error::Stream("feeder loop panicked".into())));
        match result {
            Ok(()) => tracing::info!(feeder = %self.name, "Feeder shut down"),
            Err(e) if e.is_shutdown() => {
                tracing::info!(feeder = %self.name, reason = %e, "Feeder shut down")
            }
            Err(e) => {
                tracing::error!(feeder = %self.name, error = %e, "Error while processing feeder");
                let message = e.to_string();
                self.stats.set_last_error(&message);
                *self.last_error.lock() = Some(message);
            }
        }

        // is_finished() needs both
        self.should_exit.store(true, Ordering::Release);
        {
            let mut state = self.state.lock();
            *state = FeederState::Finished;
            self.state_changed.notify_all();
        }

        self.stream.write().take();
        self.stats.set_state("disconnected");
        if self.config.remove_queue_files_on_exit {
            if let Err(e) = self.subscriber.muxer().remove_persisted_files() {
                tracing::warn!(feeder = %self.name, error = %e, "Failed to remove queue files");
            }
        }
        tracing::info!(feeder = %self.name, "Feeder thread will exit");
    }

    fn pump(&self) -> Result<()> {
        let muxer = self.subscriber.muxer();
        let mut stream_can_read = true;
        let mut muxer_can_read = true;
        let mut next_stats = Instant::now();

        while !self.should_exit.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= next_stats {
                next_stats = now + self.config.stats_interval;
                self.report_stats();
            }

            if stream_can_read {
                match self.read_stream()? {
                    ReadOutcome::Event(event) => {
                        tracing::trace!(feeder = %self.name, "Sending 1 event from stream to engine");
                        self.subscriber.publish(event);
                        self.tick();
                        // Stream read bias
                        continue;
                    }
                    ReadOutcome::TimedOut => {}
                    ReadOutcome::Closed => {
                        tracing::debug!(feeder = %self.name, "Stream closed for reading");
                        stream_can_read = false;
                    }
                }
            }

            let mut idle = true;
            if muxer_can_read {
                match muxer.read(Duration::ZERO)? {
                    ReadOutcome::Event(event) => {
                        idle = false;
                        tracing::trace!(feeder = %self.name, "Sending 1 event from muxer to stream");
                        match self.write_stream(event) {
                            Ok(_) => {
                                muxer.ack(1);
                                self.tick();
                            }
                            Err(e) if e.is_shutdown() => {
                                tracing::debug!(feeder = %self.name, "Stream closed for writing");
                                muxer_can_read = false;
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    ReadOutcome::TimedOut => {}
                    ReadOutcome::Closed => {
                        tracing::debug!(feeder = %self.name, "Muxer closed");
                        muxer_can_read = false;
                    }
                }
            }

            if idle {
                tracing::trace!(
                    feeder = %self.name,
                    sleep_ms = self.config.idle_sleep.as_millis() as u64,
                    "Timeout on stream and muxer, waiting"
                );
                thread::sleep(self.config.idle_sleep);
            }
        }
        Ok(())
    }

    fn read_stream(&self) -> Result<ReadOutcome> {
        let stream = self.stream.read();
        let Some(stream) = stream.as_ref() else {
            return Ok(ReadOutcome::Closed);
        };
        match stream.read(Duration::ZERO) {
            Err(e) if e.is_shutdown() => Ok(ReadOutcome::Closed),
            other => other,
        }
    }

    fn write_stream(&self, event: Event) -> Result<usize> {
        let stream = self.stream.read();
        match stream.as_ref() {
            Some(stream) => stream.write(event),
            None => Err(Error::shutdown("stream released")),
        }
    }

    fn tick(&self) {
        self.speed.lock().tick(1);
    }

    fn report_stats(&self) {
        let muxer = self.subscriber.muxer().statistics();
        let (speed, last_event_at) = {
            let speed = self.speed.lock();
            (speed.speed(), speed.last_event_at())
        };

        self.stats.set_queued_events(muxer.queued_events);
        self.stats.set_event_processing_speed(speed);
        self.stats.set_last_event_at(last_event_at);
        self.stats.set_unacknowledged_events(muxer.unacknowledged_events);
        self.stats.set_queue_file_enabled(muxer.queue_file_enabled);
    }
}
