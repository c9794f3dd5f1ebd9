//! In-process remote backed by a [`DataTree`], with fault injection for tests.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use rollcall_shared::tree::DataTree;

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;

#[derive(Debug, Default)]
struct Faults {
    offline: bool,
    /// Successful pushes still allowed before every push fails.
    pushes_left: Option<usize>,
}

/// A remote that lives in memory.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    tree: Mutex<DataTree>,
    faults: Mutex<Faults>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write test data directly, bypassing fault injection.
    pub fn seed(&self, path: &str, value: Value) {
        if let Err(e) = lock(&self.tree).set(path, value, now_millis()) {
            tracing::warn!(path, error = %e, "failed to seed memory remote");
        }
    }

    /// Read a node directly, bypassing fault injection.
    pub fn snapshot(&self, path: &str) -> Option<Value> {
        lock(&self.tree).get(path).ok().flatten()
    }

    /// Number of children under `path`.
    pub fn child_count(&self, path: &str) -> usize {
        match self.snapshot(path) {
            Some(Value::Object(map)) => map.len(),
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }

    /// Make every call fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        lock(&self.faults).offline = offline;
    }

    /// Allow `n` more successful pushes, then fail every push.
    pub fn fail_pushes_after(&self, n: usize) {
        lock(&self.faults).pushes_left = Some(n);
    }

    /// Remove any push failure limit.
    pub fn clear_push_failures(&self) {
        lock(&self.faults).pushes_left = None;
    }

    fn check_online(&self) -> SyncResult<()> {
        if lock(&self.faults).offline {
            return Err(SyncError::Unavailable("memory remote is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn read(&self, path: &str) -> SyncResult<Option<Value>> {
        self.check_online()?;
        Ok(lock(&self.tree).get(path)?)
    }

    async fn push(&self, path: &str, value: Value) -> SyncResult<String> {
        self.check_online()?;
        {
            let mut faults = lock(&self.faults);
            match faults.pushes_left {
                Some(0) => {
                    return Err(SyncError::Unavailable("injected push failure".into()));
                }
                Some(ref mut n) => *n -= 1,
                None => {}
            }
        }
        Ok(lock(&self.tree).push(path, value, now_millis())?)
    }

    async fn update(&self, path: &str, entries: Map<String, Value>) -> SyncResult<()> {
        self.check_online()?;
        lock(&self.tree).update(path, Value::Object(entries), now_millis())?;
        Ok(())
    }

    async fn set(&self, path: &str, value: Value) -> SyncResult<()> {
        self.check_online()?;
        lock(&self.tree).set(path, value, now_millis())?;
        Ok(())
    }
}

// A panic while holding one of these locks only happens in a failing test,
// so keep going with whatever state is there.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
