//! Error types for the sync engine.

use rollcall_shared::TreeError;
use rollcall_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or HTTP client failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("remote returned {status} for {path:?}")]
    Status { status: u16, path: String },

    /// The remote is unreachable or refused the operation.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The remote data tree rejected a path or payload.
    #[error("remote tree error: {0}")]
    Tree(#[from] TreeError),

    /// Local store failure.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    /// A remote entry did not have the expected shape.
    #[error("failed to decode {path}/{key}: {source}")]
    Decode {
        path: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A remote collection was neither an object nor an array.
    #[error("unexpected shape for remote collection {0:?}")]
    UnexpectedShape(String),

    /// Serializing an outgoing record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing the sync cursor failed.
    #[error("sync cursor error: {0}")]
    Cursor(#[from] std::io::Error),

    /// Another thread panicked while holding the local store.
    #[error("local store lock poisoned")]
    LockPoisoned,

    /// The account is signed in on a different device.
    #[error("session is active on another device ({0})")]
    SessionRejected(String),
}

impl SyncError {
    /// Returns true if repeating the failed operation may succeed.
    ///
    /// Every failure inside a cycle qualifies: each step is safe to repeat.
    /// Only a rejected session needs user action.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::SessionRejected(_))
    }
}
