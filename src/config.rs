//! Broker configuration

use std::path::{Path, PathBuf};

use crate::file::DEFAULT_MAX_FILE_SIZE;
use crate::multiplexing::MuxerConfig;
use crate::processing::FeederConfig;

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker instance name, used in logs
    pub name: String,

    /// Directory of queue and memory files
    pub cache_dir: PathBuf,

    /// Worker pool threads (0 = available parallelism, at least 2)
    pub pool_size: usize,

    /// Undelivered events kept in memory per queue
    pub event_queue_max_size: usize,

    /// Maximum size of one queue file
    pub max_file_size: u64,

    /// Keep retained events across restarts
    pub persistent_queues: bool,

    /// Settings shared by every feeder
    pub feeder: FeederConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "event-broker".into(),
            cache_dir: PathBuf::from("/var/lib/event-broker"),
            pool_size: 0,
            event_queue_max_size: 10_000,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            persistent_queues: false,
            feeder: FeederConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Create a new config with a custom cache directory
    pub fn with_cache_dir(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the instance name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the cache directory
    pub fn cache_dir(mut self, cache_dir: impl AsRef<Path>) -> Self {
        self.cache_dir = cache_dir.as_ref().to_path_buf();
        self
    }

    /// Set the worker pool size
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the in-memory bound of every queue
    pub fn event_queue_max_size(mut self, size: usize) -> Self {
        self.event_queue_max_size = size.max(1);
        self
    }

    /// Set the maximum size of one queue file
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size.max(1);
        self
    }

    /// Enable memory files for every queue
    pub fn persistent_queues(mut self, persistent: bool) -> Self {
        self.persistent_queues = persistent;
        self
    }

    /// Set the feeder settings
    pub fn feeder(mut self, feeder: FeederConfig) -> Self {
        self.feeder = feeder;
        self
    }

    /// Queue settings derived from this config
    pub fn muxer_config(&self) -> MuxerConfig {
        MuxerConfig::with_queue_dir(&self.cache_dir)
            .event_queue_max_size(self.event_queue_max_size)
            .max_file_size(self.max_file_size)
            .persistent(self.persistent_queues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();

        assert_eq!(config.pool_size, 0);
        assert_eq!(config.event_queue_max_size, 10_000);
        assert!(!config.persistent_queues);
    }

    #[test]
    fn test_muxer_config_follows_broker() {
        let config = BrokerConfig::with_cache_dir("/tmp/cache")
            .event_queue_max_size(5)
            .max_file_size(1024)
            .persistent_queues(true)
            .feeder(FeederConfig::default().idle_sleep(Duration::from_millis(10)));

        let muxer = config.muxer_config();
        assert_eq!(muxer.queue_dir, PathBuf::from("/tmp/cache"));
        assert_eq!(muxer.event_queue_max_size, 5);
        assert_eq!(muxer.max_file_size, 1024);
        assert!(muxer.persistent);
        assert_eq!(config.feeder.idle_sleep, Duration::from_millis(10));
    }
}
