//! Offline outbox: best-effort local buffering of unsent messages.
//!
//! Purely in-memory; nothing here survives a process restart. When
//! connectivity returns the caller flushes, and entries drain only on a
//! successful append.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::chat::MessageLog;
use crate::error::Result;
use crate::models::{now_millis, OutgoingMessage};

#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub local_id: String,
    pub room_id: String,
    pub outgoing: OutgoingMessage,
    pub queued_at: i64,
}

#[derive(Default)]
pub struct Outbox {
    pending: Mutex<HashMap<String, Vec<QueuedMessage>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a message for a room.
    pub async fn queue(&self, room_id: &str, outgoing: OutgoingMessage) -> QueuedMessage {
        let queued = QueuedMessage {
            local_id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            outgoing,
            queued_at: now_millis(),
        };
        let mut pending = self.pending.lock().await;
        pending
            .entry(room_id.to_string())
            .or_default()
            .push(queued.clone());
        info!("[Outbox] Queued {} for {}", queued.local_id, room_id);
        queued
    }

    pub async fn pending(&self, room_id: &str) -> Vec<QueuedMessage> {
        let pending = self.pending.lock().await;
        pending.get(room_id).cloned().unwrap_or_default()
    }

    pub async fn pending_total(&self) -> usize {
        let pending = self.pending.lock().await;
        pending.values().map(Vec::len).sum()
    }

    /// Replay everything queued for `sender_id` through the message log.
    ///
    /// Entries drain as they send, in queue order. The first failure stops
    /// the flush, keeps the failed entry and everything behind it, and
    /// surfaces the error.
    pub async fn flush(&self, chat: &MessageLog, sender_id: &str) -> Result<usize> {
        let mut pending = self.pending.lock().await;
        let mut sent = 0;

        let room_ids: Vec<String> = pending.keys().cloned().collect();
        for room_id in room_ids {
            let Some(queue) = pending.get_mut(&room_id) else {
                continue;
            };
            while let Some(next) = queue.first().cloned() {
                match chat.send(&room_id, sender_id, next.outgoing.clone()).await {
                    Ok(_) => {
                        queue.remove(0);
                        sent += 1;
                    }
                    Err(e) => {
                        warn!(
                            "[Outbox] Flush stopped at {} in {}: {}",
                            next.local_id, room_id, e
                        );
                        return Err(e);
                    }
                }
            }
            pending.remove(&room_id);
        }
        if sent > 0 {
            info!("[Outbox] Flushed {} queued messages", sent);
        }
        Ok(sent)
    }
}
