/// Whole-snapshot JSON file backend.
pub mod json_file;
/// Ephemeral in-memory backend.
pub mod memory;

use futures::future::BoxFuture;

use crate::dao::storage::StorageResult;
use crate::state::game::GameState;

/// Abstraction over the persistence layer for whole game snapshots.
///
/// There is no partial or incremental format: [`GameStore::save`] overwrites
/// the previous snapshot wholesale, and [`GameStore::load`] returns the last
/// snapshot written, if any.
pub trait GameStore: Send + Sync {
    /// Load the last persisted snapshot, `None` when nothing was stored yet.
    fn load(&self) -> BoxFuture<'static, StorageResult<Option<GameState>>>;
    /// Overwrite the persisted snapshot wholesale.
    fn save(&self, snapshot: GameState) -> BoxFuture<'static, StorageResult<()>>;
}
