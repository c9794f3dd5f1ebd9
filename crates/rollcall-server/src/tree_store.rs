use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use rollcall_shared::TreeError;
use rollcall_shared::tree::DataTree;

use crate::error::ServerError;

/// The served tree plus its optional on-disk snapshot.
///
/// Writes are serialized by the mutex. Each write is snapshotted before it
/// becomes visible, so the served tree never runs ahead of the file.
#[derive(Debug)]
pub struct TreeStore {
    tree: Mutex<DataTree>,
    snapshot_path: Option<PathBuf>,
}

impl TreeStore {
    pub fn in_memory() -> Self {
        Self {
            tree: Mutex::new(DataTree::new()),
            snapshot_path: None,
        }
    }

    /// Open a store snapshotted at `path`, restoring the tree if the file
    /// exists.
    pub async fn open(path: PathBuf) -> Result<Self, ServerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                ServerError::Snapshot(format!(
                    "Failed to create data directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let tree = match fs::read(&path).await {
            Ok(raw) => {
                let value: Value = serde_json::from_slice(&raw).map_err(|e| {
                    ServerError::Snapshot(format!("Corrupt snapshot '{}': {}", path.display(), e))
                })?;
                DataTree::from_value(value)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DataTree::new(),
            Err(e) => {
                return Err(ServerError::Snapshot(format!(
                    "Failed to read snapshot '{}': {}",
                    path.display(),
                    e
                )))
            }
        };

        info!(path = %path.display(), "Tree store initialized");
        Ok(Self {
            tree: Mutex::new(tree),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub async fn get(&self, path: &str) -> Result<Option<Value>, ServerError> {
        Ok(self.tree.lock().await.get(path)?)
    }

    /// Replace the node at `path`; returns the stored value with server
    /// placeholders resolved.
    pub async fn set(&self, path: &str, value: Value) -> Result<Option<Value>, ServerError> {
        let ((), tree) = self.apply(|t| t.set(path, value, now_millis())).await?;
        debug!(path, "node set");
        Ok(tree.get(path)?)
    }

    pub async fn push(&self, path: &str, value: Value) -> Result<String, ServerError> {
        let (key, _tree) = self.apply(|t| t.push(path, value, now_millis())).await?;
        debug!(path, key = %key, "child pushed");
        Ok(key)
    }

    pub async fn update(&self, path: &str, value: Value) -> Result<Option<Value>, ServerError> {
        let ((), tree) = self.apply(|t| t.update(path, value, now_millis())).await?;
        debug!(path, "node updated");
        Ok(tree.get(path)?)
    }

    pub async fn remove(&self, path: &str) -> Result<(), ServerError> {
        self.apply(|t| t.remove(path)).await?;
        debug!(path, "node removed");
        Ok(())
    }

    /// Run `write` against a copy of the tree and swap it in only once the
    /// snapshot holds it. A failed write leaves the served tree untouched.
    async fn apply<T>(
        &self,
        write: impl FnOnce(&mut DataTree) -> Result<T, TreeError>,
    ) -> Result<(T, MutexGuard<'_, DataTree>), ServerError> {
        let mut tree = self.tree.lock().await;
        if self.snapshot_path.is_none() {
            let out = write(&mut *tree)?;
            return Ok((out, tree));
        }

        let mut next = tree.clone();
        let out = write(&mut next)?;
        self.persist(&next).await?;
        *tree = next;
        Ok((out, tree))
    }

    async fn persist(&self, tree: &DataTree) -> Result<(), ServerError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let json = serde_json::to_vec(tree.root())
            .map_err(|e| ServerError::Internal(format!("Failed to encode snapshot: {e}")))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| ServerError::Snapshot(format!("Failed to write snapshot: {e}")))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| ServerError::Snapshot(format!("Failed to replace snapshot: {e}")))?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
