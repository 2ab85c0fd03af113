//! Worker pool
//!
//! A bounded tokio runtime running the broker's asynchronous work, including
//! the statistics center task. Feeders do not run here: each one owns a
//! dedicated thread.

use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::stats::{PoolUpdate, StatsCenter};

/// Interval between two scheduling latency measurements
pub const LATENCY_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Bounded thread pool for asynchronous work
pub struct Pool {
    runtime: Runtime,
    size: usize,
}

impl Pool {
    /// Start a pool of `size` threads
    ///
    /// A size of 0 uses the available parallelism, with at least 2 threads so
    /// one inbound and one outbound connection never starve each other.
    pub fn new(size: usize) -> Result<Self> {
        let size = if size == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
                .max(2)
        } else {
            size
        };

        let runtime = Builder::new_multi_thread()
            .worker_threads(size)
            .thread_name("broker-pool")
            .enable_all()
            .build()
            .map_err(Error::Thread)?;

        tracing::info!(threads = size, "Worker pool started");

        Ok(Self { runtime, size })
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Report the pool size and start measuring scheduling latency
    ///
    /// Every [`LATENCY_CHECK_INTERVAL`] a task is scheduled and the delay until
    /// it runs is reported. The returned task ends when the center stops.
    pub fn start_stats(&self, center: &StatsCenter) -> JoinHandle<()> {
        self.start_stats_every(center, LATENCY_CHECK_INTERVAL)
    }

    pub(crate) fn start_stats_every(&self, center: &StatsCenter, interval: Duration) -> JoinHandle<()> {
        center.post_pool(PoolUpdate::Size(self.size as u32));
        let center = center.clone();

        self.runtime.spawn(async move {
            loop {
                let start = Instant::now();
                let latency = tokio::spawn(async move { start.elapsed() })
                    .await
                    .unwrap_or_default();
                let ms = latency.as_secs_f64() * 1000.0;

                tracing::trace!(latency_ms = ms, "Thread pool latency");
                if !center.post_pool(PoolUpdate::Latency(format!("{:.3}ms", ms))) {
                    break;
                }

                tokio::time::sleep(interval).await;
            }
        })
    }

    /// Stop the pool, giving running tasks a moment to finish
    pub fn shutdown(self) {
        tracing::debug!("Stopping the worker pool");
        self.runtime.shutdown_timeout(Duration::from_secs(1));
        tracing::debug!("No remaining thread in the pool");
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("size", &self.size).finish()
    }
}
