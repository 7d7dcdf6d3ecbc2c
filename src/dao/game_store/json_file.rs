use std::io::ErrorKind;
use std::path::PathBuf;

use futures::future::BoxFuture;
use tokio::fs;

use crate::dao::game_store::GameStore;
use crate::dao::storage::{StorageError, StorageResult};
use crate::state::game::GameState;

/// Snapshot store backed by a single JSON file at a fixed path.
///
/// Writes go through a sibling temp file and a rename so a crash mid-write
/// never leaves a truncated snapshot behind.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store persisting to `path`. Parent directories are created
    /// lazily on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl GameStore for JsonFileStore {
    fn load(&self) -> BoxFuture<'static, StorageResult<Option<GameState>>> {
        let path = self.path.clone();
        Box::pin(async move {
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => {
                    return Err(StorageError::unavailable(
                        format!("reading `{}`", path.display()),
                        err,
                    ));
                }
            };

            serde_json::from_slice(&bytes).map(Some).map_err(|err| {
                StorageError::corrupted(format!("decoding `{}`", path.display()), err)
            })
        })
    }

    fn save(&self, snapshot: GameState) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.path.clone();
        Box::pin(async move {
            let payload = serde_json::to_vec_pretty(&snapshot).map_err(|err| {
                StorageError::corrupted("encoding snapshot".to_string(), err)
            })?;

            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).await.map_err(|err| {
                    StorageError::unavailable(format!("creating `{}`", parent.display()), err)
                })?;
            }

            let tmp_path = path.with_extension("json.tmp");
            fs::write(&tmp_path, &payload).await.map_err(|err| {
                StorageError::unavailable(format!("writing `{}`", tmp_path.display()), err)
            })?;
            fs::rename(&tmp_path, &path).await.map_err(|err| {
                StorageError::unavailable(format!("replacing `{}`", path.display()), err)
            })?;

            Ok(())
        })
    }
}
