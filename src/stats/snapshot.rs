//! Statistics tree and its JSON rendering

use std::collections::BTreeMap;

use serde::Serialize;

use super::center::{EntityKind, PoolUpdate, StatUpdate};

/// Statistics of one endpoint or feeder
///
/// Unset fields are left out of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityStats {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_filters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_filters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unacknowledged_events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_processing_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_file_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection_attempt: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connection_success: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<i64>,
}

impl EntityStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub(super) fn apply(&mut self, update: StatUpdate) {
        match update {
            StatUpdate::Name(v) => self.name = v,
            StatUpdate::State(v) => self.state = Some(v),
            StatUpdate::Status(v) => self.status = Some(v),
            StatUpdate::LastError(v) => self.last_error = Some(v),
            StatUpdate::ReadFilters(v) => self.read_filters = Some(v),
            StatUpdate::WriteFilters(v) => self.write_filters = Some(v),
            StatUpdate::MemoryFilePath(v) => self.memory_file_path = Some(v),
            StatUpdate::QueueFilePath(v) => self.queue_file_path = Some(v),
            StatUpdate::QueuedEvents(v) => self.queued_events = Some(v),
            StatUpdate::UnacknowledgedEvents(v) => self.unacknowledged_events = Some(v),
            StatUpdate::PendingEvents(v) => self.pending_events = Some(v),
            StatUpdate::Peers(v) => self.peers = Some(v),
            StatUpdate::EventProcessingSpeed(v) => self.event_processing_speed = Some(v),
            StatUpdate::QueueFileEnabled(v) => self.queue_file_enabled = Some(v),
            StatUpdate::LastConnectionAttempt(v) => self.last_connection_attempt = Some(v),
            StatUpdate::LastConnectionSuccess(v) => self.last_connection_success = Some(v),
            StatUpdate::LastEventAt(v) => self.last_event_at = Some(v),
        }
    }
}

/// Worker pool statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    pub size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<String>,
}

/// The whole tree, owned by the center task
#[derive(Debug)]
pub(super) struct StatsTree {
    pid: u32,
    pool: PoolStats,
    endpoints: BTreeMap<u64, EntityStats>,
    feeders: BTreeMap<u64, EntityStats>,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    version: &'static str,
    pid: u32,
    now: i64,
    pool: &'a PoolStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    endpoint: Vec<&'a EntityStats>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    feeder: Vec<&'a EntityStats>,
}

impl StatsTree {
    pub(super) fn new() -> Self {
        Self {
            pid: std::process::id(),
            pool: PoolStats::default(),
            endpoints: BTreeMap::new(),
            feeders: BTreeMap::new(),
        }
    }

    fn entities_mut(&mut self, kind: EntityKind) -> &mut BTreeMap<u64, EntityStats> {
        match kind {
            EntityKind::Endpoint => &mut self.endpoints,
            EntityKind::Feeder => &mut self.feeders,
        }
    }

    pub(super) fn insert(&mut self, kind: EntityKind, id: u64, name: String) {
        self.entities_mut(kind).insert(id, EntityStats::new(name));
    }

    pub(super) fn remove(&mut self, kind: EntityKind, id: u64) -> bool {
        self.entities_mut(kind).remove(&id).is_some()
    }

    pub(super) fn update(&mut self, kind: EntityKind, id: u64, update: StatUpdate) -> bool {
        match self.entities_mut(kind).get_mut(&id) {
            Some(entity) => {
                entity.apply(update);
                true
            }
            None => false,
        }
    }

    pub(super) fn get(&self, kind: EntityKind, id: u64) -> Option<EntityStats> {
        let map = match kind {
            EntityKind::Endpoint => &self.endpoints,
            EntityKind::Feeder => &self.feeders,
        };
        map.get(&id).cloned()
    }

    pub(super) fn update_pool(&mut self, update: PoolUpdate) {
        match update {
            PoolUpdate::Size(size) => self.pool.size = size,
            PoolUpdate::Latency(latency) => self.pool.latency = Some(latency),
        }
    }

    /// Render the tree as JSON, stamping the current time
    pub(super) fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&Snapshot {
            version: env!("CARGO_PKG_VERSION"),
            pid: self.pid,
            now: chrono::Utc::now().timestamp(),
            pool: &self.pool,
            endpoint: self.endpoints.values().collect(),
            feeder: self.feeders.values().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_are_omitted() {
        let mut stats = EntityStats::new("central-rrd");
        stats.apply(StatUpdate::State("connected".into()));
        stats.apply(StatUpdate::QueuedEvents(12));

        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(
            json,
            r#"{"name":"central-rrd","state":"connected","queued_events":12}"#
        );
    }

    #[test]
    fn test_tree_json_layout() {
        let mut tree = StatsTree::new();
        tree.insert(EntityKind::Endpoint, 1, "sql".into());
        tree.insert(EntityKind::Feeder, 2, "sql-feeder".into());
        tree.update_pool(PoolUpdate::Size(4));

        let value: serde_json::Value = serde_json::from_str(&tree.to_json().unwrap()).unwrap();
        assert_eq!(value["pool"]["size"], 4);
        assert_eq!(value["endpoint"][0]["name"], "sql");
        assert_eq!(value["feeder"][0]["name"], "sql-feeder");
        assert!(value["now"].as_i64().unwrap() > 0);
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_update_unknown_entity() {
        let mut tree = StatsTree::new();
        assert!(!tree.update(EntityKind::Feeder, 9, StatUpdate::Peers(1)));
        assert!(!tree.remove(EntityKind::Feeder, 9));
    }
}
