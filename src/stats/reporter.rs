//! Typed statistics setters for one registered entity

use super::center::{EntityHandle, EntityKind, StatUpdate, StatsCenter};
use crate::error::Result;
use crate::event::FilterSet;

/// Reports the statistics of one endpoint or feeder
///
/// Statistics never drive control flow: a failed update is logged and
/// otherwise ignored. The entity is unregistered when the reporter is dropped.
pub struct StatsReporter {
    center: StatsCenter,
    handle: EntityHandle,
}

impl StatsReporter {
    /// Register a new entity in the center
    pub fn register(center: &StatsCenter, kind: EntityKind, name: &str) -> Result<Self> {
        let handle = center.register_entity(kind, name)?;
        Ok(Self {
            center: center.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn center(&self) -> &StatsCenter {
        &self.center
    }

    fn set(&self, update: StatUpdate) {
        if let Err(e) = self.center.update(self.handle, update) {
            tracing::warn!(entity = %self.handle, error = %e, "Failed to update statistics");
        }
    }

    pub fn set_name(&self, name: &str) {
        self.set(StatUpdate::Name(name.to_string()));
    }

    pub fn set_state(&self, state: &str) {
        self.set(StatUpdate::State(state.to_string()));
    }

    pub fn set_status(&self, status: &str) {
        self.set(StatUpdate::Status(status.to_string()));
    }

    pub fn set_last_error(&self, error: &str) {
        self.set(StatUpdate::LastError(error.to_string()));
    }

    pub fn set_read_filters(&self, filters: &FilterSet) {
        self.set(StatUpdate::ReadFilters(filters.to_string()));
    }

    pub fn set_write_filters(&self, filters: &FilterSet) {
        self.set(StatUpdate::WriteFilters(filters.to_string()));
    }

    pub fn set_memory_file_path(&self, path: &str) {
        self.set(StatUpdate::MemoryFilePath(path.to_string()));
    }

    pub fn set_queue_file_path(&self, path: &str) {
        self.set(StatUpdate::QueueFilePath(path.to_string()));
    }

    pub fn set_queued_events(&self, events: u64) {
        self.set(StatUpdate::QueuedEvents(events));
    }

    pub fn set_unacknowledged_events(&self, events: u64) {
        self.set(StatUpdate::UnacknowledgedEvents(events));
    }

    pub fn set_pending_events(&self, events: u64) {
        self.set(StatUpdate::PendingEvents(events));
    }

    pub fn set_peers(&self, peers: u32) {
        self.set(StatUpdate::Peers(peers));
    }

    pub fn set_event_processing_speed(&self, speed: f64) {
        self.set(StatUpdate::EventProcessingSpeed(speed));
    }

    pub fn set_queue_file_enabled(&self, enabled: bool) {
        self.set(StatUpdate::QueueFileEnabled(enabled));
    }

    /// Epoch seconds
    pub fn set_last_connection_attempt(&self, at: i64) {
        self.set(StatUpdate::LastConnectionAttempt(at));
    }

    /// Epoch seconds
    pub fn set_last_connection_success(&self, at: i64) {
        self.set(StatUpdate::LastConnectionSuccess(at));
    }

    /// Epoch seconds
    pub fn set_last_event_at(&self, at: i64) {
        self.set(StatUpdate::LastEventAt(at));
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.center.unregister(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_lifecycle() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let center = StatsCenter::spawn(rt.handle());

        let reporter = StatsReporter::register(&center, EntityKind::Endpoint, "tmp").unwrap();
        reporter.set_name("central-broker-master-sql");
        reporter.set_read_filters(&FilterSet::all());
        reporter.set_peers(2);
        reporter.set_queue_file_enabled(false);

        let stats = center.get(reporter.handle()).unwrap();
        assert_eq!(stats.name, "central-broker-master-sql");
        assert_eq!(stats.read_filters.as_deref(), Some("all"));
        assert_eq!(stats.peers, Some(2));
        assert_eq!(stats.queue_file_enabled, Some(false));

        let handle = reporter.handle();
        drop(reporter);
        assert!(center.get(handle).is_err());
    }
}
