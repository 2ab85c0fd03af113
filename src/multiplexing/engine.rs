//! Broadcast engine
//!
//! Fans every published event out to the subscriber queues whose write
//! filters accept it. Each queue handles its own overflow, so a slow
//! subscriber never holds back the others.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::muxer::Muxer;
use crate::event::Event;

/// Registration of one queue in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct EngineState {
    running: bool,
    /// Events published while stopped, in publish order
    retained: VecDeque<Event>,
    subscribers: BTreeMap<SubscriptionId, Arc<Muxer>>,
}

/// Publish/subscribe hub
///
/// A new engine is stopped: published events are retained until
/// [`start`](Self::start) hands them to the subscribers.
pub struct Engine {
    state: RwLock<EngineState>,
    next_id: AtomicU64,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState {
                running: false,
                retained: VecDeque::new(),
                subscribers: BTreeMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start delivering, flushing events retained while stopped
    pub fn start(&self) {
        let mut state = self.state.write();
        if state.running {
            return;
        }
        state.running = true;

        let retained: Vec<Event> = state.retained.drain(..).collect();
        for event in &retained {
            fan_out(&state.subscribers, event);
        }

        tracing::info!(flushed = retained.len(), "Engine started");
    }

    /// Stop delivering; later events are retained until the next start
    pub fn stop(&self) {
        let mut state = self.state.write();
        if state.running {
            state.running = false;
            tracing::info!("Engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    /// Add a queue to the fan-out set
    pub fn subscribe(&self, muxer: Arc<Muxer>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.write();

        tracing::info!(
            subscription = %id,
            muxer = %muxer.name(),
            subscribers = state.subscribers.len() + 1,
            "Subscriber registered"
        );
        state.subscribers.insert(id, muxer);
        id
    }

    /// Remove a queue from the fan-out set
    ///
    /// Waits for in-flight publishes, so the queue is never removed mid-push.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Option<Arc<Muxer>> {
        let removed = self.state.write().subscribers.remove(&id);
        if let Some(muxer) = removed.as_ref() {
            tracing::info!(subscription = %id, muxer = %muxer.name(), "Subscriber unregistered");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }

    /// Events waiting for the engine to start
    pub fn retained_count(&self) -> usize {
        self.state.read().retained.len()
    }

    /// Hand an event to every accepting queue
    ///
    /// Returns the number of queues that took it. A failing queue is logged
    /// and skipped.
    pub fn publish(&self, event: Event) -> usize {
        {
            let state = self.state.read();
            if state.running {
                return fan_out(&state.subscribers, &event);
            }
        }

        let mut state = self.state.write();
        if state.running {
            return fan_out(&state.subscribers, &event);
        }
        state.retained.push_back(event);
        0
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Engine")
            .field("running", &state.running)
            .field("subscribers", &state.subscribers.len())
            .field("retained", &state.retained.len())
            .finish()
    }
}

fn fan_out(subscribers: &BTreeMap<SubscriptionId, Arc<Muxer>>, event: &Event) -> usize {
    let mut delivered = 0;
    for (id, muxer) in subscribers {
        if !muxer.accepts(event.type_id()) {
            continue;
        }
        match muxer.push(event.clone()) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(
                    subscription = %id,
                    muxer = %muxer.name(),
                    error = %e,
                    "Failed to push event, skipping subscriber"
                );
            }
        }
    }
    delivered
}
