//! Unread counters: per-user, per-room counts of unseen messages.
//!
//! Counts live in the shared tree under `unreadCounts/{uid}/{roomId}`.
//! Which room a user is currently looking at is purely local session
//! state, tracked in a synchronous focus registry shared with the
//! message log.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::Result;
use crate::store::{paths, RealtimeStore, Snapshot};

/// Which room each user has open right now. Local to this client.
#[derive(Clone, Default)]
pub struct FocusRegistry {
    focused: Arc<RwLock<HashMap<String, String>>>,
}

impl FocusRegistry {
    pub fn focus(&self, user_id: &str, room_id: &str) {
        self.focused
            .write()
            .insert(user_id.to_string(), room_id.to_string());
    }

    pub fn blur(&self, user_id: &str) {
        self.focused.write().remove(user_id);
    }

    pub fn is_focused(&self, user_id: &str, room_id: &str) -> bool {
        self.focused
            .read()
            .get(user_id)
            .map(|r| r == room_id)
            .unwrap_or(false)
    }
}

pub struct UnreadCounters {
    store: Arc<dyn RealtimeStore>,
    focus: FocusRegistry,
}

impl UnreadCounters {
    pub fn new(store: Arc<dyn RealtimeStore>, focus: FocusRegistry) -> Self {
        Self { store, focus }
    }

    /// Mark `room_id` as the room `user_id` is viewing and reset its
    /// count to exactly zero, whatever it was before.
    pub async fn open_room(&self, user_id: &str, room_id: &str) -> Result<()> {
        self.focus.focus(user_id, room_id);
        self.store
            .put(&paths::unread_room(user_id, room_id), json!(0))
            .await
    }

    /// The user stopped viewing any room; counts accumulate again.
    pub fn close_room(&self, user_id: &str) {
        self.focus.blur(user_id);
    }

    /// Live `roomId -> count` map for badge rendering.
    pub async fn watch_counts(
        &self,
        user_id: &str,
    ) -> Result<BoxStream<'static, Result<HashMap<String, u64>>>> {
        let stream = self.store.watch(&paths::unread(user_id)).await?;
        Ok(stream
            .map(|snapshot| snapshot.map(decode_counts))
            .boxed())
    }

    pub async fn counts(&self, user_id: &str) -> Result<HashMap<String, u64>> {
        let snapshot = self.store.get(&paths::unread(user_id)).await?;
        Ok(decode_counts(snapshot))
    }

    /// Total badge: sum over all rooms.
    pub async fn total(&self, user_id: &str) -> Result<u64> {
        Ok(self.counts(user_id).await?.values().sum())
    }

    /// Called by the message log on every append: bump the count for each
    /// participant who neither sent the message nor has the room open.
    pub(crate) async fn note_message(
        &self,
        room_id: &str,
        participants: &[String],
        sender_id: &str,
    ) -> Result<()> {
        for user_id in participants {
            if user_id == sender_id || self.focus.is_focused(user_id, room_id) {
                continue;
            }
            let path = paths::unread_room(user_id, room_id);
            let current = self
                .store
                .get(&path)
                .await?
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            self.store.put(&path, json!(current + 1)).await?;
            debug!("[Unread] {} -> {} now {}", room_id, user_id, current + 1);
        }
        Ok(())
    }
}

fn decode_counts(snapshot: Snapshot) -> HashMap<String, u64> {
    let Some(Value::Object(map)) = snapshot else {
        return HashMap::new();
    };
    map.into_iter()
        .filter_map(|(room_id, count)| count.as_u64().map(|c| (room_id, c)))
        .filter(|(_, c)| *c > 0)
        .collect()
}
