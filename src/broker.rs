//! Broker composition root
//!
//! Builds the worker pool, the statistics center and the engine once, and
//! hands them to every queue and feeder it creates.
//!
//! ```text
//!   Broker
//!    ├── Pool ──────────── StatsCenter task, latency probe
//!    ├── Arc<Engine> ───── Subscriber ── Muxer
//!    └── feeders: Vec<Feeder>   (one thread each)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::config::BrokerConfig;
use crate::error::Result;
use crate::event::{Event, FilterSet};
use crate::multiplexing::{Engine, Muxer, Subscriber};
use crate::pool::Pool;
use crate::processing::{Feeder, Stream};
use crate::stats::{EntityHandle, EntityKind, StatsCenter, StatsReporter};

/// A running broker instance
///
/// The engine starts stopped so that feeders and queues can be set up before
/// events flow; call [`start`](Self::start) once they are.
pub struct Broker {
    // Feeders go first: their teardown still reports to the pool
    feeders: Mutex<Vec<Feeder>>,
    engine: Arc<Engine>,
    stats: StatsCenter,
    stats_task: JoinHandle<()>,
    config: BrokerConfig,
    pool: Pool,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Result<Self> {
        let pool = Pool::new(config.pool_size)?;
        let stats = StatsCenter::spawn(pool.handle());
        let stats_task = pool.start_stats(&stats);

        tracing::info!(
            broker = %config.name,
            cache_dir = %config.cache_dir.display(),
            pool_size = pool.size(),
            "Broker created"
        );

        Ok(Self {
            feeders: Mutex::new(Vec::new()),
            engine: Arc::new(Engine::new()),
            stats,
            stats_task,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn stats(&self) -> &StatsCenter {
        &self.stats
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Start event delivery
    pub fn start(&self) {
        self.engine.start();
        tracing::info!(broker = %self.config.name, "Broker started");
    }

    /// Open a queue in the cache directory
    pub fn muxer(&self, name: &str) -> Result<Muxer> {
        Muxer::new(name, self.config.muxer_config())
    }

    /// Open a queue and register it in the engine
    pub fn subscriber(
        &self,
        name: &str,
        read_filters: FilterSet,
        write_filters: FilterSet,
    ) -> Result<Subscriber> {
        let muxer = self.muxer(name)?;
        muxer.set_read_filters(read_filters);
        muxer.set_write_filters(write_filters);
        Ok(Subscriber::new(self.engine.clone(), muxer))
    }

    /// Start a feeder between `stream` and a new queue named after it
    pub fn add_feeder(
        &self,
        name: &str,
        stream: Arc<dyn Stream>,
        read_filters: FilterSet,
        write_filters: FilterSet,
    ) -> Result<EntityHandle> {
        let subscriber = self.subscriber(name, read_filters, write_filters)?;
        let feeder = Feeder::new(
            name,
            stream,
            subscriber,
            &self.stats,
            self.config.feeder.clone(),
        )?;
        let handle = feeder.stats_handle();
        self.feeders.lock().push(feeder);
        Ok(handle)
    }

    pub fn feeder_count(&self) -> usize {
        self.feeders.lock().len()
    }

    /// Drop feeders whose thread has ended, returning how many were removed
    pub fn reap_finished_feeders(&self) -> usize {
        let finished: Vec<Feeder> = {
            let mut feeders = self.feeders.lock();
            let (finished, running): (Vec<Feeder>, Vec<Feeder>) =
                feeders.drain(..).partition(|f| f.is_finished());
            *feeders = running;
            finished
        };
        for feeder in &finished {
            tracing::info!(
                feeder = %feeder.name(),
                error = feeder.last_error().as_deref().unwrap_or(""),
                "Removing finished feeder"
            );
        }
        finished.len()
    }

    /// Register an endpoint in the statistics
    pub fn register_endpoint(&self, name: &str) -> Result<StatsReporter> {
        StatsReporter::register(&self.stats, EntityKind::Endpoint, name)
    }

    /// Publish an event to every subscribed queue
    pub fn publish(&self, event: Event) -> usize {
        self.engine.publish(event)
    }

    /// Statistics of the whole broker as JSON
    pub fn snapshot(&self) -> Result<String> {
        self.stats.snapshot_as_text()
    }

    /// Stop feeders, the engine and the worker pool
    pub fn shutdown(self) {
        let Broker {
            feeders,
            engine,
            stats,
            stats_task,
            config,
            pool,
        } = self;

        let feeders = feeders.into_inner();
        tracing::info!(broker = %config.name, feeders = feeders.len(), "Stopping broker");
        drop(feeders);

        engine.stop();
        stats_task.abort();
        drop(stats);
        pool.shutdown();

        tracing::info!(broker = %config.name, "Broker stopped");
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("name", &self.config.name)
            .field("feeders", &self.feeder_count())
            .field("engine", &self.engine)
            .finish()
    }
}
