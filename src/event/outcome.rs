//! Result of a read attempt on a queue or a stream

use super::types::Event;

/// What a read produced
///
/// "No data yet" and "no data ever again" are ordinary outcomes, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// One event was read
    Event(Event),
    /// Nothing arrived before the deadline
    TimedOut,
    /// The source is closed and drained
    Closed,
}

impl ReadOutcome {
    pub fn into_event(self) -> Option<Event> {
        match self {
            ReadOutcome::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, ReadOutcome::TimedOut)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ReadOutcome::Closed)
    }
}
