//! Error types for the broker
//!
//! Shutdown is modelled both as a read outcome (`ReadOutcome::Closed`) and as
//! an error (`Error::Shutdown`) for the write side, where no value can carry it.

use std::io;
use std::path::PathBuf;

use crate::stats::EntityHandle;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for broker operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file of the rotating store could not be opened or created
    #[error("cannot open file '{}': {source}", path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O error on an already opened file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A queue or retention file holds an unreadable record
    #[error("corrupted queue file '{}': {reason}", path.display())]
    Corrupted { path: PathBuf, reason: String },

    /// An event payload does not fit in a queue record
    #[error("event payload of {size} bytes exceeds the record limit")]
    PayloadTooLarge { size: usize },

    /// The peer or the queue is permanently closed
    #[error("shutdown: {0}")]
    Shutdown(String),

    /// Statistics were requested or updated for an unregistered entity
    #[error("unknown statistics entity {0}")]
    UnknownEntity(EntityHandle),

    /// The statistics center is no longer running
    #[error("statistics center is not running")]
    StatsUnavailable,

    /// Transport-specific failure reported by a stream implementation
    #[error("stream error: {0}")]
    Stream(String),

    /// A worker thread could not be spawned
    #[error("cannot spawn thread: {0}")]
    Thread(#[source] io::Error),

    /// Predicate evaluation failure
    #[error("invalid predicate: {0}")]
    Predicate(String),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Statistics serialization failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a shutdown error
    pub fn shutdown(reason: impl Into<String>) -> Self {
        Error::Shutdown(reason.into())
    }

    /// Whether this error is an expected termination signal rather than a failure
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Shutdown(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_classification() {
        assert!(Error::shutdown("peer closed").is_shutdown());
        assert!(!Error::Stream("reset".into()).is_shutdown());
        assert!(!Error::Io(io::Error::other("disk full")).is_shutdown());
    }

    #[test]
    fn test_file_open_display() {
        let err = Error::FileOpen {
            path: PathBuf::from("/var/lib/broker/queue"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/lib/broker/queue"));
        assert!(msg.starts_with("cannot open file"));
    }

    #[test]
    fn test_payload_too_large_display() {
        let err = Error::PayloadTooLarge { size: 70_000 };
        assert_eq!(
            err.to_string(),
            "event payload of 70000 bytes exceeds the record limit"
        );
        assert!(!err.is_shutdown());
    }
}
