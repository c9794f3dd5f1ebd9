//! Remote store abstraction.
//!
//! The remote is a JSON tree addressed by `/`-separated paths, with the
//! operations a realtime database offers: read a node, push a child under a
//! fresh key, merge many keys at once, and replace a node.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use rollcall_store::{Student, Teacher};

use crate::error::{SyncError, SyncResult};

/// A remote realtime database.
///
/// Implementations must make each call atomic on the remote side; nothing
/// is assumed about atomicity across calls.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the node at `path`. A missing node is `None`.
    async fn read(&self, path: &str) -> SyncResult<Option<Value>>;

    /// Write `value` to a new child of `path`, returning the child key.
    async fn push(&self, path: &str, value: Value) -> SyncResult<String>;

    /// Merge `entries` into the node at `path` in one write.
    async fn update(&self, path: &str, entries: Map<String, Value>) -> SyncResult<()>;

    /// Replace the node at `path`.
    async fn set(&self, path: &str, value: Value) -> SyncResult<()>;
}

/// Entities written to the remote under their own id.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Teacher {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Student {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Read a whole collection and decode every entry.
///
/// Entries without an `id` field take their key as id, so rosters entered
/// directly in the remote console still decode. `null` array holes (which
/// a realtime database returns for sparse numeric keys) are skipped.
pub async fn fetch_collection<T>(remote: &dyn RemoteStore, path: &str) -> SyncResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let entries: Vec<(String, Value)> = match remote.read(path).await? {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Some(_) => return Err(SyncError::UnexpectedShape(path.to_string())),
    };

    entries
        .into_iter()
        .map(|(key, mut value)| {
            if let Value::Object(fields) = &mut value {
                fields
                    .entry("id")
                    .or_insert_with(|| Value::String(key.clone()));
            }
            serde_json::from_value(value).map_err(|source| SyncError::Decode {
                path: path.to_string(),
                key,
                source,
            })
        })
        .collect()
}

/// Build the payload for a keyed bulk overwrite.
pub fn keyed_entries<T>(items: &[T]) -> SyncResult<Map<String, Value>>
where
    T: Keyed + Serialize,
{
    items
        .iter()
        .map(|item| Ok((item.key().to_string(), serde_json::to_value(item)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryRemote;

    #[tokio::test]
    async fn missing_collection_is_empty() {
        let remote = MemoryRemote::new();
        let teachers: Vec<Teacher> = fetch_collection(&remote, "teachers").await.unwrap();
        assert!(teachers.is_empty());
    }

    #[tokio::test]
    async fn id_defaults_to_key() {
        let remote = MemoryRemote::new();
        remote.seed("teachers/T7", json!({ "name": "Grace" }));

        let teachers: Vec<Teacher> = fetch_collection(&remote, "teachers").await.unwrap();
        assert_eq!(teachers.len(), 1);
        assert_eq!(teachers[0].id, "T7");
        assert_eq!(teachers[0].email, None);
    }

    #[tokio::test]
    async fn array_collections_skip_holes() {
        let remote = MemoryRemote::new();
        remote.seed(
            "teachers",
            json!([null, { "id": "T1", "name": "Alice" }, { "id": "T2", "name": "Bob" }]),
        );

        let teachers: Vec<Teacher> = fetch_collection(&remote, "teachers").await.unwrap();
        assert_eq!(teachers.len(), 2);
    }

    #[tokio::test]
    async fn malformed_entry_names_its_key() {
        let remote = MemoryRemote::new();
        remote.seed("teachers/T1", json!({ "name": 42 }));

        let err = fetch_collection::<Teacher>(&remote, "teachers")
            .await
            .unwrap_err();
        match err {
            SyncError::Decode { key, .. } => assert_eq!(key, "T1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn scalar_collection_is_rejected() {
        let remote = MemoryRemote::new();
        remote.seed("teachers", json!("oops"));
        assert!(matches!(
            fetch_collection::<Teacher>(&remote, "teachers").await,
            Err(SyncError::UnexpectedShape(_))
        ));
    }

    #[test]
    fn keyed_entries_use_ids() {
        let map = keyed_entries(&[Teacher {
            id: "T1".into(),
            name: "Alice".into(),
            email: Some("alice@school.test".into()),
            department: None,
        }])
        .unwrap();
        assert_eq!(map["T1"]["email"], "alice@school.test");
    }
}
