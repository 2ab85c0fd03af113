//! Statistics center
//!
//! A single task owns the statistics tree. Blocking calls (`register_entity`,
//! `update`, `snapshot_as_text`) send a command and wait for its reply, so a
//! caller always observes its own updates in the next snapshot. `post` sends
//! without waiting and is the only variant allowed from async code.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::snapshot::{EntityStats, StatsTree};
use crate::error::{Error, Result};

/// Kind of entity reporting statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Endpoint,
    Feeder,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Endpoint => "endpoint",
            EntityKind::Feeder => "feeder",
        }
    }
}

/// Stable handle on a registered entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    kind: EntityKind,
    id: u64,
}

impl EntityHandle {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind.as_str(), self.id)
    }
}

/// One field assignment, carrying its own copy of the value
#[derive(Debug, Clone, PartialEq)]
pub enum StatUpdate {
    Name(String),
    State(String),
    Status(String),
    LastError(String),
    ReadFilters(String),
    WriteFilters(String),
    MemoryFilePath(String),
    QueueFilePath(String),
    QueuedEvents(u64),
    UnacknowledgedEvents(u64),
    PendingEvents(u64),
    Peers(u32),
    EventProcessingSpeed(f64),
    QueueFileEnabled(bool),
    /// Epoch seconds
    LastConnectionAttempt(i64),
    /// Epoch seconds
    LastConnectionSuccess(i64),
    /// Epoch seconds
    LastEventAt(i64),
}

/// Worker pool statistics update
#[derive(Debug, Clone, PartialEq)]
pub enum PoolUpdate {
    Size(u32),
    Latency(String),
}

enum Command {
    Register {
        handle: EntityHandle,
        name: String,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        handle: EntityHandle,
    },
    Update {
        handle: EntityHandle,
        update: StatUpdate,
        reply: Option<oneshot::Sender<bool>>,
    },
    Pool(PoolUpdate),
    Get {
        handle: EntityHandle,
        reply: oneshot::Sender<Option<EntityStats>>,
    },
    Snapshot {
        reply: oneshot::Sender<serde_json::Result<String>>,
    },
}

/// Handle on the statistics center
///
/// Cheap to clone; every clone talks to the same center task. The task stops
/// once all handles are dropped or the pool shuts down.
#[derive(Clone)]
pub struct StatsCenter {
    tx: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl StatsCenter {
    /// Start a center task on the given runtime
    pub fn spawn(runtime: &Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(run(rx));
        tracing::debug!("Statistics center started");
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register an entity and get its stable handle
    ///
    /// # Panics
    ///
    /// Blocking call: panics if invoked from within an async context.
    pub fn register_entity(&self, kind: EntityKind, name: &str) -> Result<EntityHandle> {
        let handle = EntityHandle {
            kind,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        self.call(|reply| Command::Register {
            handle,
            name: name.to_string(),
            reply,
        })?;
        Ok(handle)
    }

    /// Remove an entity from the tree (non-blocking)
    pub fn unregister(&self, handle: EntityHandle) {
        let _ = self.tx.send(Command::Unregister { handle });
    }

    /// Apply an update and wait until it is part of the tree
    ///
    /// # Errors
    ///
    /// `Error::UnknownEntity` if the handle is not registered,
    /// `Error::StatsUnavailable` if the center is gone.
    pub fn update(&self, handle: EntityHandle, update: StatUpdate) -> Result<()> {
        let applied = self.call(|reply| Command::Update {
            handle,
            update,
            reply: Some(reply),
        })?;
        if applied {
            Ok(())
        } else {
            Err(Error::UnknownEntity(handle))
        }
    }

    /// Queue an update without waiting for it
    ///
    /// Returns false if the center is gone.
    pub fn post(&self, handle: EntityHandle, update: StatUpdate) -> bool {
        self.tx
            .send(Command::Update {
                handle,
                update,
                reply: None,
            })
            .is_ok()
    }

    /// Queue a worker pool update without waiting for it
    pub fn post_pool(&self, update: PoolUpdate) -> bool {
        self.tx.send(Command::Pool(update)).is_ok()
    }

    /// Current statistics of one entity
    pub fn get(&self, handle: EntityHandle) -> Result<EntityStats> {
        self.call(|reply| Command::Get { handle, reply })?
            .ok_or(Error::UnknownEntity(handle))
    }

    /// Render the full tree as JSON
    pub fn snapshot_as_text(&self) -> Result<String> {
        Ok(self.call(|reply| Command::Snapshot { reply })??)
    }

    /// Whether the center task is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| Error::StatsUnavailable)?;
        rx.blocking_recv().map_err(|_| Error::StatsUnavailable)
    }
}

impl fmt::Debug for StatsCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsCenter")
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut tree = StatsTree::new();

    while let Some(command) = rx.recv().await {
        match command {
            Command::Register {
                handle,
                name,
                reply,
            } => {
                tracing::debug!(entity = %handle, name = %name, "Statistics entity registered");
                tree.insert(handle.kind, handle.id, name);
                let _ = reply.send(());
            }
            Command::Unregister { handle } => {
                tree.remove(handle.kind, handle.id);
                tracing::debug!(entity = %handle, "Statistics entity unregistered");
            }
            Command::Update {
                handle,
                update,
                reply,
            } => {
                let applied = tree.update(handle.kind, handle.id, update);
                if !applied {
                    tracing::warn!(entity = %handle, "Statistics update for unknown entity");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(applied);
                }
            }
            Command::Pool(update) => tree.update_pool(update),
            Command::Get { handle, reply } => {
                let _ = reply.send(tree.get(handle.kind, handle.id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(tree.to_json());
            }
        }
    }

    tracing::debug!("Statistics center stopped");
}
