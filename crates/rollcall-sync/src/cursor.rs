//! Last-successful-sync marker, kept in a small JSON file next to the
//! database rather than inside it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    last_sync_millis: i64,
}

#[derive(Debug, Clone)]
pub struct SyncCursor {
    path: PathBuf,
}

impl SyncCursor {
    pub const FILE_NAME: &'static str = "sync_cursor.json";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cursor stored as [`Self::FILE_NAME`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(Self::FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time of the last fully successful cycle, if any.
    ///
    /// An unreadable cursor file counts as "never synced": the cursor is
    /// informational and must not stop a cycle.
    pub async fn load(&self) -> SyncResult<Option<i64>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CursorFile>(&raw) {
            Ok(file) => Ok(Some(file.last_sync_millis)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt sync cursor");
                Ok(None)
            }
        }
    }

    /// Persist `millis`, replacing the previous value atomically.
    pub async fn store(&self, millis: i64) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec(&CursorFile {
            last_sync_millis: millis,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_means_never_synced() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = SyncCursor::in_dir(dir.path());
        assert_eq!(cursor.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = SyncCursor::in_dir(&dir.path().join("nested"));

        cursor.store(1_700_000_000_000).await.unwrap();
        cursor.store(1_700_000_360_000).await.unwrap();

        assert_eq!(cursor.load().await.unwrap(), Some(1_700_000_360_000));
    }

    #[tokio::test]
    async fn corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cursor = SyncCursor::in_dir(dir.path());
        tokio::fs::write(cursor.path(), b"garbage").await.unwrap();

        assert_eq!(cursor.load().await.unwrap(), None);
    }
}
