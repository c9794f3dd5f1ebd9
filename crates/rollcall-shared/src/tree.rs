//! In-memory JSON tree with realtime-database write semantics.
//!
//! Nodes are addressed by `/`-separated paths. Writing `null` (or an empty
//! object) removes a node and prunes any parents left empty. `push` creates a
//! child under a chronologically ordered key, and every write replaces
//! `{".sv": "timestamp"}` placeholders with the caller-supplied clock.

use rand::Rng;
use serde_json::{Map, Value};

use crate::error::TreeError;
use crate::protocol::is_server_timestamp;

/// Alphabet for push keys, in ASCII order so keys sort by creation time.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const FORBIDDEN_KEY_CHARS: [char; 5] = ['.', '$', '#', '[', ']'];

/// Generates 20-character keys: 8 characters of timestamp followed by 12
/// random characters. Keys generated within the same millisecond increment
/// the random part so ordering still holds.
#[derive(Debug, Clone, Default)]
pub struct PushIdGenerator {
    last_millis: i64,
    last_random: [u8; 12],
}

impl PushIdGenerator {
    pub fn next_id(&mut self, now_millis: i64) -> String {
        let same_millis = now_millis == self.last_millis;
        self.last_millis = now_millis;

        let mut time_chars = [0u8; 8];
        let mut ts = now_millis.max(0) as u64;
        for slot in time_chars.iter_mut().rev() {
            *slot = PUSH_CHARS[(ts % 64) as usize];
            ts /= 64;
        }

        if same_millis {
            for digit in self.last_random.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            let mut rng = rand::thread_rng();
            for digit in self.last_random.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
        }

        let mut id = String::with_capacity(20);
        id.extend(time_chars.iter().map(|&c| c as char));
        id.extend(self.last_random.iter().map(|&d| PUSH_CHARS[d as usize] as char));
        id
    }
}

/// The realtime database contents.
#[derive(Debug, Clone)]
pub struct DataTree {
    root: Value,
    ids: PushIdGenerator,
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTree {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
            ids: PushIdGenerator::default(),
        }
    }

    /// Restore a tree from a snapshot (e.g. loaded from disk).
    pub fn from_value(value: Value) -> Result<Self, TreeError> {
        match value {
            Value::Object(_) => Ok(Self {
                root: value,
                ids: PushIdGenerator::default(),
            }),
            Value::Null => Ok(Self::new()),
            _ => Err(TreeError::RootNotObject),
        }
    }

    /// The whole tree, for snapshotting.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Read the node at `path`. Missing nodes and empty objects are `None`.
    pub fn get(&self, path: &str) -> Result<Option<Value>, TreeError> {
        let segments = split_path(path)?;
        let mut node = &self.root;
        for segment in &segments {
            match node.get(segment.as_str()) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        match node {
            Value::Object(map) if map.is_empty() => Ok(None),
            other => Ok(Some(other.clone())),
        }
    }

    /// Replace the node at `path`.
    pub fn set(&mut self, path: &str, value: Value, now_millis: i64) -> Result<(), TreeError> {
        let segments = split_path(path)?;
        self.set_segments(&segments, prepare(value, now_millis))
    }

    /// Write `value` under a new chronologically ordered child of `path` and
    /// return the generated key. A value with no data left after pruning
    /// nulls is rejected, since it would store nothing under the key.
    pub fn push(&mut self, path: &str, value: Value, now_millis: i64) -> Result<String, TreeError> {
        let mut segments = split_path(path)?;
        let value = prepare(value, now_millis);
        if value.is_null() {
            return Err(TreeError::EmptyPush(path.to_string()));
        }
        let key = self.ids.next_id(now_millis);
        segments.push(key.clone());
        self.set_segments(&segments, value)?;
        Ok(key)
    }

    /// Merge the keys of `value` into the node at `path`. Keys may themselves
    /// be relative paths. Either every key is applied or none is.
    pub fn update(&mut self, path: &str, value: Value, now_millis: i64) -> Result<(), TreeError> {
        let base = split_path(path)?;
        let Value::Object(entries) = value else {
            return Err(TreeError::UpdateNotObject(path.to_string()));
        };

        let mut writes = Vec::with_capacity(entries.len());
        for (key, child) in entries {
            let mut segments = base.clone();
            segments.extend(split_path(&key)?);
            if segments.len() == base.len() {
                return Err(TreeError::InvalidSegment(key));
            }
            writes.push((segments, prepare(child, now_millis)));
        }

        for (segments, child) in writes {
            self.set_segments(&segments, child)?;
        }
        Ok(())
    }

    /// Remove the node at `path`, returning what was there.
    pub fn remove(&mut self, path: &str) -> Result<Option<Value>, TreeError> {
        let segments = split_path(path)?;
        if segments.is_empty() {
            let old = std::mem::replace(&mut self.root, Value::Object(Map::new()));
            return Ok(Some(old));
        }
        Ok(remove_in(&mut self.root, &segments))
    }

    fn set_segments(&mut self, segments: &[String], value: Value) -> Result<(), TreeError> {
        let Some((last, parents)) = segments.split_last() else {
            return match value {
                Value::Null => {
                    self.root = Value::Object(Map::new());
                    Ok(())
                }
                Value::Object(_) => {
                    self.root = value;
                    Ok(())
                }
                _ => Err(TreeError::RootNotObject),
            };
        };

        if value.is_null() {
            remove_in(&mut self.root, segments);
            return Ok(());
        }

        let mut node = &mut self.root;
        for segment in parents {
            node = ensure_object(node)
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(node).insert(last.clone(), value);
        Ok(())
    }
}

/// Split and validate a path. Leading, trailing and doubled slashes are
/// ignored; an empty path addresses the root.
pub fn split_path(path: &str) -> Result<Vec<String>, TreeError> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if segment.contains(FORBIDDEN_KEY_CHARS) {
                Err(TreeError::InvalidSegment(segment.to_string()))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was replaced with an object above"),
    }
}

fn remove_in(node: &mut Value, segments: &[String]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    let map = node.as_object_mut()?;
    if rest.is_empty() {
        return map.remove(first);
    }

    let child = map.get_mut(first)?;
    let removed = remove_in(child, rest);
    if matches!(child, Value::Object(inner) if inner.is_empty()) {
        map.remove(first);
    }
    removed
}

/// Resolve server placeholders and drop nulls / empty objects.
fn prepare(value: Value, now_millis: i64) -> Value {
    if is_server_timestamp(&value) {
        return Value::from(now_millis);
    }
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prepare(v, now_millis)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| prepare(v, now_millis)).collect())
        }
        other => other,
    }
}
