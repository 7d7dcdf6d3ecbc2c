use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use crate::dao::game_store::GameStore;
use crate::dao::storage::StorageResult;
use crate::state::game::GameState;

/// Ephemeral snapshot store keeping the last write in memory.
///
/// Used by tests and headless embeddings that do not want disk persistence;
/// cloning the store shares the same slot.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<GameState>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last snapshot written, if any.
    pub fn snapshot(&self) -> Option<GameState> {
        self.slot.lock().expect("memory store poisoned").clone()
    }
}

impl GameStore for MemoryStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Option<GameState>>> {
        let slot = Arc::clone(&self.slot);
        Box::pin(async move { Ok(slot.lock().expect("memory store poisoned").clone()) })
    }

    fn save(&self, snapshot: GameState) -> BoxFuture<'static, StorageResult<()>> {
        let slot = Arc::clone(&self.slot);
        Box::pin(async move {
            *slot.lock().expect("memory store poisoned") = Some(snapshot);
            Ok(())
        })
    }
}
