/// Snapshot storage backends and their shared trait.
pub mod game_store;
/// Storage error types shared by every backend.
pub mod storage;
