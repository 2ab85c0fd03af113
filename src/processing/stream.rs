//! Transport stream seen by a feeder

use std::time::Duration;

use crate::error::Result;
use crate::event::{Event, ReadOutcome};

/// A bidirectional event transport (socket, file, database writer, ...)
///
/// Methods take `&self`: the feeder shares the stream with statistics code,
/// so implementations keep their own interior locking.
pub trait Stream: Send + Sync {
    /// Read one event, waiting at most `timeout`
    ///
    /// A permanently closed transport returns `ReadOutcome::Closed`.
    fn read(&self, timeout: Duration) -> Result<ReadOutcome>;

    /// Write one event, returning how many events the peer acknowledged
    ///
    /// A permanently closed transport returns `Error::Shutdown`.
    fn write(&self, event: Event) -> Result<usize>;

    /// Description of the remote side, for logs and statistics
    fn peer(&self) -> String {
        String::new()
    }
}
