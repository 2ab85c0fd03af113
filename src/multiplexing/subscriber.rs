//! Engine subscription handle

use std::sync::Arc;

use super::engine::{Engine, SubscriptionId};
use super::muxer::Muxer;
use crate::event::Event;

/// One queue registered in an engine
///
/// Dropping the subscriber unregisters the queue and closes it.
pub struct Subscriber {
    engine: Arc<Engine>,
    muxer: Arc<Muxer>,
    id: SubscriptionId,
}

impl Subscriber {
    pub fn new(engine: Arc<Engine>, muxer: Muxer) -> Self {
        let muxer = Arc::new(muxer);
        let id = engine.subscribe(muxer.clone());
        Self { engine, muxer, id }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn muxer(&self) -> &Arc<Muxer> {
        &self.muxer
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Publish through the engine this subscriber is registered in
    pub fn publish(&self, event: Event) -> usize {
        self.engine.publish(event)
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.engine.unsubscribe(self.id);
        if let Err(e) = self.muxer.close() {
            tracing::warn!(muxer = %self.muxer.name(), error = %e, "Failed to close muxer");
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("muxer", &self.muxer.name())
            .finish()
    }
}
