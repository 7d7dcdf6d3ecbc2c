use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::game::GameState;

/// Fan-out hub pushing a full state snapshot to every subscriber after each
/// mutation.
///
/// Delivery happens synchronously on the mutating call path (an unbounded
/// send never suspends), so subscribers observe snapshots in mutation order.
/// Dropping a [`Subscription`] unsubscribes.
pub struct ChangeBus {
    subscribers: Arc<DashMap<Uuid, mpsc::UnboundedSender<Arc<GameState>>>>,
}

impl ChangeBus {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
        }
    }

    /// Register a new subscriber that will receive subsequent snapshots.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.insert(id, tx);
        Subscription {
            id,
            receiver: rx,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Push a snapshot to all current subscribers, pruning closed ones.
    pub fn publish(&self, snapshot: Arc<GameState>) {
        self.subscribers
            .retain(|_, tx| tx.send(Arc::clone(&snapshot)).is_ok());
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a [`ChangeBus`] registration; acts as its own disposer.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::UnboundedReceiver<Arc<GameState>>,
    subscribers: Arc<DashMap<Uuid, mpsc::UnboundedSender<Arc<GameState>>>>,
}

impl Subscription {
    /// Wait for the next snapshot; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Arc<GameState>> {
        self.receiver.recv().await
    }

    /// Pop an already-delivered snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<GameState>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}
