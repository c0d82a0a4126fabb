//! Realtime data store abstraction.
//!
//! The core talks to its backing store through four primitives: point
//! writes/merges, point reads, append-with-generated-key, and
//! subscribe-to-subtree with change delivery. Everything in the component
//! contracts is expressed in terms of these, so any key-path addressed
//! realtime database can sit behind the trait. A broadcast-backed
//! in-memory implementation is bundled for embedding and tests.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tracing::warn;

use crate::error::Result;

/// A full snapshot of one subtree, re-delivered after every change under it.
pub type Snapshot = Option<Value>;

/// Key-path addressed realtime store.
///
/// Paths are `/`-separated segments (`chatrooms/abc123`). Watch streams
/// replay the current snapshot first and then yield a fresh snapshot per
/// change; dropping the stream is unsubscription and is always safe, even
/// after the underlying connection has closed. Implementations map their
/// transport failures to [`CoreError::Transport`](crate::CoreError).
#[async_trait]
pub trait RealtimeStore: Send + Sync + 'static {
    /// Replace the subtree at `path`.
    async fn put(&self, path: &str, value: Value) -> Result<()>;

    /// Shallow-merge `fields` (an object) into the subtree at `path`,
    /// leaving unnamed fields untouched.
    async fn merge(&self, path: &str, fields: Value) -> Result<()>;

    /// Read the subtree at `path`, `None` when absent.
    async fn get(&self, path: &str) -> Result<Snapshot>;

    /// Append `value` under `path` with a store-generated key.
    ///
    /// Generated keys sort lexicographically in insertion order, which is
    /// what breaks ties between messages carrying equal timestamps.
    async fn push(&self, path: &str, value: Value) -> Result<String>;

    /// Delete the subtree at `path`. Deleting an absent path is a no-op.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Subscribe to the subtree at `path`.
    async fn watch(&self, path: &str) -> Result<BoxStream<'static, Result<Snapshot>>>;
}

/// Decode a keyed subtree snapshot into `(key, record)` pairs.
///
/// Malformed entries are logged and skipped rather than failing the whole
/// snapshot; one bad record must not take down a live subscription.
pub(crate) fn keyed_records<T>(snapshot: Snapshot, context: &str) -> Vec<(String, T)>
where
    T: serde::de::DeserializeOwned,
{
    let Some(Value::Object(map)) = snapshot else {
        return Vec::new();
    };
    let mut records = Vec::with_capacity(map.len());
    for (key, value) in map {
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push((key, record)),
            Err(e) => warn!("[{}] Skipping malformed record {}: {}", context, key, e),
        }
    }
    records
}

/// Paths into the shared JSON tree.
pub(crate) mod paths {
    pub const USERS: &str = "userschat";
    pub const ROOMS: &str = "chatrooms";

    pub fn user(uid: &str) -> String {
        format!("{USERS}/{uid}")
    }

    pub fn room(room_id: &str) -> String {
        format!("{ROOMS}/{room_id}")
    }

    pub fn messages(room_id: &str) -> String {
        format!("chats/{room_id}/messages")
    }

    pub fn message(room_id: &str, message_id: &str) -> String {
        format!("chats/{room_id}/messages/{message_id}")
    }

    pub fn chat(room_id: &str) -> String {
        format!("chats/{room_id}")
    }

    pub fn typing(room_id: &str) -> String {
        format!("typing/{room_id}")
    }

    pub fn typing_mark(room_id: &str, uid: &str) -> String {
        format!("typing/{room_id}/{uid}")
    }

    pub fn unread(uid: &str) -> String {
        format!("unreadCounts/{uid}")
    }

    pub fn unread_room(uid: &str, room_id: &str) -> String {
        format!("unreadCounts/{uid}/{room_id}")
    }
}
