//! Subscriber queue configuration

use std::path::{Path, PathBuf};

use crate::file::DEFAULT_MAX_FILE_SIZE;

/// Subscriber queue configuration options
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Directory holding queue and memory files
    pub queue_dir: PathBuf,

    /// Undelivered events kept in memory before spilling to the queue file
    pub event_queue_max_size: usize,

    /// Maximum size of one physical queue file
    pub max_file_size: u64,

    /// Keep retained events across restarts through the memory file
    pub persistent: bool,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            queue_dir: PathBuf::from("/var/lib/event-broker"),
            event_queue_max_size: 10_000,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            persistent: false,
        }
    }
}

impl MuxerConfig {
    /// Create a new config rooted at `queue_dir`
    pub fn with_queue_dir(queue_dir: impl AsRef<Path>) -> Self {
        Self {
            queue_dir: queue_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the queue directory
    pub fn queue_dir(mut self, queue_dir: impl AsRef<Path>) -> Self {
        self.queue_dir = queue_dir.as_ref().to_path_buf();
        self
    }

    /// Set the in-memory bound (at least 1)
    pub fn event_queue_max_size(mut self, size: usize) -> Self {
        self.event_queue_max_size = size.max(1);
        self
    }

    /// Set the maximum size of one queue file
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size.max(1);
        self
    }

    /// Dump retained events to the memory file on close
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MuxerConfig::default();

        assert_eq!(config.event_queue_max_size, 10_000);
        assert_eq!(config.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(!config.persistent);
    }

    #[test]
    fn test_bounds_are_clamped() {
        let config = MuxerConfig::with_queue_dir("/tmp/q")
            .event_queue_max_size(0)
            .max_file_size(0);

        assert_eq!(config.queue_dir, PathBuf::from("/tmp/q"));
        assert_eq!(config.event_queue_max_size, 1);
        assert_eq!(config.max_file_size, 1);
    }
}
