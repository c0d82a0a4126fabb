//! In-memory realtime store with broadcast fan-out.
//!
//! Holds the whole tree as one JSON object behind an async lock and
//! notifies watchers through a broadcast channel of changed paths. Serves
//! as the embedded backend for tests and single-process deployments.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use crate::error::{CoreError, Result};
use crate::models::now_millis;
use crate::store::{RealtimeStore, Snapshot};

pub struct MemoryStore {
    root: Arc<RwLock<Value>>,
    changes: broadcast::Sender<String>,
    push_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new(channel_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(channel_capacity);
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
            changes,
            push_seq: AtomicU64::new(0),
        }
    }

    /// Generated push keys: millisecond timestamp plus a process-wide
    /// counter, zero-padded hex so lexicographic order is insertion order.
    fn next_key(&self) -> String {
        let seq = self.push_seq.fetch_add(1, Ordering::Relaxed);
        format!("{:012x}-{:08x}", now_millis(), seq)
    }

    fn notify(&self, path: &str) {
        // No receivers is fine; send only fails when nobody is watching.
        let _ = self.changes.send(path.to_string());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(100)
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn read_at(root: &Value, path: &str) -> Snapshot {
    let mut node = root;
    for seg in segments(path) {
        node = node.as_object()?.get(seg)?;
    }
    Some(node.clone())
}

/// Coerce a node into an object map, replacing scalar leaves.
fn obj_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Walk to the parent object of `path`, creating intermediate objects.
/// Returns the final segment alongside a mutable parent map.
fn parent_entry<'a>(root: &'a mut Value, path: &str) -> Result<(&'a mut Map<String, Value>, String)> {
    let segs = segments(path);
    let Some((last, init)) = segs.split_last() else {
        return Err(CoreError::Transport("empty store path".to_string()));
    };
    let mut node = root;
    for seg in init {
        node = obj_mut(node)
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Ok((obj_mut(node), last.to_string()))
}

/// Remove the leaf at `path`, touching nothing when any segment on the
/// way down is absent. Returns whether something was actually removed.
fn remove_at(root: &mut Value, path: &str) -> bool {
    let segs = segments(path);
    let Some((last, init)) = segs.split_last() else {
        return false;
    };
    let mut node = root;
    for seg in init {
        let Some(next) = node.as_object_mut().and_then(|m| m.get_mut(*seg)) else {
            return false;
        };
        node = next;
    }
    node.as_object_mut()
        .map(|m| m.remove(*last).is_some())
        .unwrap_or(false)
}

/// Two paths overlap when either is a prefix of the other, segment-wise.
fn overlaps(a: &str, b: &str) -> bool {
    let (sa, sb) = (segments(a), segments(b));
    let n = sa.len().min(sb.len());
    sa[..n] == sb[..n]
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn put(&self, path: &str, value: Value) -> Result<()> {
        {
            let mut root = self.root.write().await;
            let (parent, key) = parent_entry(&mut root, path)?;
            parent.insert(key, value);
        }
        self.notify(path);
        Ok(())
    }

    async fn merge(&self, path: &str, fields: Value) -> Result<()> {
        let Value::Object(fields) = fields else {
            return Err(CoreError::Transport(format!(
                "merge at {path} requires an object payload"
            )));
        };
        {
            let mut root = self.root.write().await;
            let (parent, key) = parent_entry(&mut root, path)?;
            let target = parent
                .entry(key)
                .or_insert_with(|| Value::Object(Map::new()));
            let map = obj_mut(target);
            for (k, v) in fields {
                map.insert(k, v);
            }
        }
        self.notify(path);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Snapshot> {
        let root = self.root.read().await;
        Ok(read_at(&root, path))
    }

    async fn push(&self, path: &str, value: Value) -> Result<String> {
        let key = self.next_key();
        self.put(&format!("{path}/{key}"), value).await?;
        Ok(key)
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let removed = {
            let mut root = self.root.write().await;
            remove_at(&mut root, path)
        };
        if removed {
            self.notify(path);
        }
        Ok(())
    }

    async fn watch(&self, path: &str) -> Result<BoxStream<'static, Result<Snapshot>>> {
        let root = self.root.clone();
        let mut rx = self.changes.subscribe();
        let path = path.to_string();
        let stream = async_stream::stream! {
            // Replay current state before any live updates. Each snapshot
            // is bound to a local so the read guard drops before the yield
            // suspension point; holding it across the yield would deadlock
            // the next writer.
            let snapshot = read_at(&*root.read().await, &path);
            yield Ok(snapshot);
            loop {
                match rx.recv().await {
                    Ok(changed) => {
                        if overlaps(&changed, &path) {
                            let snapshot = read_at(&*root.read().await, &path);
                            yield Ok(snapshot);
                        }
                    }
                    // Missed notifications: resync from the current tree.
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        let snapshot = read_at(&*root.read().await, &path);
                        yield Ok(snapshot);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
