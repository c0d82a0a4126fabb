//! Typing signals: ephemeral per-room "who is composing" marks.
//!
//! Expiry is a read-time predicate over timestamps, not a background
//! sweep: stale marks simply stop appearing in views. Callers refresh the
//! mark on each keystroke burst and clear it on idle or send.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::models::{now_millis, TypingMark};
use crate::store::{keyed_records, paths, RealtimeStore, Snapshot};

#[derive(Clone)]
pub struct TypingTracker {
    store: Arc<dyn RealtimeStore>,
    expiry: Duration,
}

impl TypingTracker {
    pub fn new(store: Arc<dyn RealtimeStore>, expiry: Duration) -> Self {
        Self { store, expiry }
    }

    /// Upsert the mark with a fresh timestamp.
    pub async fn set_typing(&self, room_id: &str, user_id: &str, user_name: &str) -> Result<()> {
        let mark = TypingMark {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            chat_id: room_id.to_string(),
            timestamp: now_millis(),
        };
        let record = serde_json::to_value(&mark)
            .map_err(|e| CoreError::Transport(format!("encode typing mark: {e}")))?;
        self.store
            .put(&paths::typing_mark(room_id, user_id), record)
            .await?;
        debug!("[Typing] {} typing in {}", user_id, room_id);
        Ok(())
    }

    /// Delete the mark. Clearing an absent mark is a no-op.
    pub async fn clear_typing(&self, room_id: &str, user_id: &str) -> Result<()> {
        self.store
            .remove(&paths::typing_mark(room_id, user_id))
            .await
    }

    /// Live set of unexpired marks in a room, excluding the viewer.
    pub async fn watch_typing(
        &self,
        room_id: &str,
        viewer_id: &str,
    ) -> Result<BoxStream<'static, Result<Vec<TypingMark>>>> {
        let viewer = viewer_id.to_string();
        let expiry_ms = self.expiry.as_millis() as i64;
        let stream = self.store.watch(&paths::typing(room_id)).await?;
        Ok(stream
            .map(move |snapshot| snapshot.map(|s| active_marks(s, &viewer, expiry_ms)))
            .boxed())
    }

    /// Snapshot of who is typing right now, excluding the viewer.
    pub async fn typists(&self, room_id: &str, viewer_id: &str) -> Result<Vec<TypingMark>> {
        let snapshot = self.store.get(&paths::typing(room_id)).await?;
        Ok(active_marks(
            snapshot,
            viewer_id,
            self.expiry.as_millis() as i64,
        ))
    }
}

fn active_marks(snapshot: Snapshot, viewer_id: &str, expiry_ms: i64) -> Vec<TypingMark> {
    let now = now_millis();
    let mut marks: Vec<TypingMark> = keyed_records::<TypingMark>(snapshot, "Typing")
        .into_iter()
        .map(|(_, mark)| mark)
        .filter(|mark| mark.user_id != viewer_id && now - mark.timestamp < expiry_ms)
        .collect();
    marks.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    marks
}
