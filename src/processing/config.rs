//! Feeder configuration

use std::time::Duration;

/// Feeder configuration options
#[derive(Debug, Clone)]
pub struct FeederConfig {
    /// Sleep when neither the stream nor the queue had anything
    pub idle_sleep: Duration,

    /// Statistics update interval
    pub stats_interval: Duration,

    /// Remove the queue and memory files when the feeder exits
    pub remove_queue_files_on_exit: bool,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self {
            idle_sleep: Duration::from_millis(50),
            stats_interval: Duration::from_secs(5),
            remove_queue_files_on_exit: true,
        }
    }
}

impl FeederConfig {
    /// Set the idle sleep
    pub fn idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep = sleep;
        self
    }

    /// Set the statistics update interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Keep queue files when the feeder exits
    pub fn keep_queue_files(mut self) -> Self {
        self.remove_queue_files_on_exit = false;
        self
    }
}
