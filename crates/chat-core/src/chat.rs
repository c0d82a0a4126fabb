//! Message log: per-room append-only ordered message sequences.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::models::{now_millis, Message, OutgoingMessage};
use crate::rooms::fetch_room;
use crate::store::{keyed_records, paths, RealtimeStore, Snapshot};
use crate::unread::UnreadCounters;
use crate::users::UserDirectory;

#[derive(Clone)]
pub struct MessageLog {
    store: Arc<dyn RealtimeStore>,
    users: UserDirectory,
    unread: Arc<UnreadCounters>,
    anonymous_label: String,
}

impl MessageLog {
    pub fn new(
        store: Arc<dyn RealtimeStore>,
        users: UserDirectory,
        unread: Arc<UnreadCounters>,
        anonymous_label: String,
    ) -> Self {
        Self {
            store,
            users,
            unread,
            anonymous_label,
        }
    }

    /// Live message sequence for one room, ascending by timestamp with
    /// store-key order breaking ties. Replays full history first.
    pub async fn watch_messages(
        &self,
        room_id: &str,
    ) -> Result<BoxStream<'static, Result<Vec<Message>>>> {
        let stream = self.store.watch(&paths::messages(room_id)).await?;
        Ok(stream
            .map(|snapshot| snapshot.map(decode_messages))
            .boxed())
    }

    /// Snapshot of one room's full history, in log order.
    pub async fn messages(&self, room_id: &str) -> Result<Vec<Message>> {
        let snapshot = self.store.get(&paths::messages(room_id)).await?;
        Ok(decode_messages(snapshot))
    }

    /// Append a message to a room's log.
    ///
    /// Sender name and photo are snapshotted from the profile at call
    /// time. The room's `lastMessage` preview and the recipients' unread
    /// counters are updated with the append as one logical step.
    pub async fn send(
        &self,
        room_id: &str,
        sender_id: &str,
        outgoing: OutgoingMessage,
    ) -> Result<Message> {
        if outgoing.content.trim().is_empty() && outgoing.file_url.is_none() {
            return Err(CoreError::Validation(
                "a message needs text content or an attachment".into(),
            ));
        }

        let room = fetch_room(&self.store, room_id).await?;
        // Individual rooms are always open; only groups can be closed.
        if room.is_group() && !room.is_active {
            return Err(CoreError::RoomClosed(room_id.to_string()));
        }

        let sender = self.users.get(sender_id).await?;
        let mut message = Message {
            id: String::new(),
            sender_id: sender_id.to_string(),
            sender_name: sender.display_label(&self.anonymous_label),
            sender_photo: sender.photo_url.clone(),
            content: outgoing.content.trim().to_string(),
            kind: outgoing.kind,
            file_url: outgoing.file_url,
            file_name: outgoing.file_name,
            timestamp: now_millis(),
            edited: false,
            edited_at: None,
        };

        let record = serde_json::to_value(&message)
            .map_err(|e| CoreError::Transport(format!("encode message: {e}")))?;
        message.id = self.store.push(&paths::messages(room_id), record).await?;

        // Denormalized preview for room lists; includes the id so readers
        // can correlate it with the log entry.
        let preview = serde_json::to_value(&message)
            .map_err(|e| CoreError::Transport(format!("encode preview: {e}")))?;
        self.store
            .merge(&paths::room(room_id), json!({ "lastMessage": preview }))
            .await?;

        self.unread
            .note_message(room_id, &room.participants, sender_id)
            .await?;

        info!("[Chat] {} -> {} ({})", sender_id, room_id, message.id);
        Ok(message)
    }

    /// Flag a message as edited. Only the original sender may do this;
    /// content itself stays immutable.
    pub async fn mark_edited(&self, room_id: &str, actor_id: &str, message_id: &str) -> Result<()> {
        let path = paths::message(room_id, message_id);
        let snapshot = self.store.get(&path).await?;
        let Some(value) = snapshot else {
            return Err(CoreError::NotFound(format!(
                "message {message_id} in room {room_id}"
            )));
        };
        let message: Message = serde_json::from_value(value)
            .map_err(|e| CoreError::Transport(format!("decode message {message_id}: {e}")))?;
        if message.sender_id != actor_id {
            return Err(CoreError::PermissionDenied(
                "only the sender can edit a message".into(),
            ));
        }
        self.store
            .merge(&path, json!({ "edited": true, "editedAt": now_millis() }))
            .await
    }

    /// Case-insensitive content search across every room the user is in,
    /// newest match first.
    pub async fn search(&self, user_id: &str, query: &str) -> Result<Vec<(String, Message)>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let rooms = keyed_records::<crate::models::Room>(
            self.store.get(paths::ROOMS).await?,
            "Rooms",
        );
        let mut hits = Vec::new();
        for (room_id, room) in rooms {
            if !room.participants.iter().any(|p| p == user_id) {
                continue;
            }
            for message in self.messages(&room_id).await? {
                if message.content.to_lowercase().contains(&query) {
                    hits.push((room_id.clone(), message));
                }
            }
        }
        hits.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));
        Ok(hits)
    }
}

fn decode_messages(snapshot: Snapshot) -> Vec<Message> {
    let mut messages: Vec<Message> = keyed_records::<Message>(snapshot, "Chat")
        .into_iter()
        .map(|(key, mut message)| {
            message.id = key;
            message
        })
        .collect();
    // Writer-assigned timestamps order the log; push keys (insertion
    // order) break ties.
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageKind, User};
    use crate::rooms::RoomRegistry;
    use crate::unread::FocusRegistry;

    struct Fixture {
        store: Arc<dyn RealtimeStore>,
        registry: RoomRegistry,
        chat: MessageLog,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn RealtimeStore> = Arc::new(crate::store::MemoryStore::default());
        let users = UserDirectory::new(store.clone());
        let unread = Arc::new(UnreadCounters::new(store.clone(), FocusRegistry::default()));
        let chat = MessageLog::new(store.clone(), users.clone(), unread, "Anonymous".into());
        let registry = RoomRegistry::new(store.clone());

        users
            .upsert_profile(&User::new("alice", "alice@x.com").with_display_name("Alice"))
            .await
            .unwrap();
        users
            .upsert_profile(&User::new("bob", "bob@x.com"))
            .await
            .unwrap();

        Fixture {
            store,
            registry,
            chat,
        }
    }

    #[tokio::test]
    async fn send_snapshots_sender_and_updates_preview() {
        let fx = fixture().await;
        let room = fx
            .registry
            .get_or_create_individual_room("alice", "bob")
            .await
            .unwrap();

        let sent = fx
            .chat
            .send(&room.id, "alice", OutgoingMessage::text("  hello "))
            .await
            .unwrap();
        assert_eq!(sent.sender_name, "Alice");
        assert_eq!(sent.content, "hello");
        assert!(!sent.id.is_empty());

        let current = fx.registry.get_room(&room.id).await.unwrap();
        let preview = current.last_message.expect("preview set");
        assert_eq!(preview.id, sent.id);
        assert_eq!(preview.content, "hello");

        // Sender display falls back to the email local part.
        let reply = fx
            .chat
            .send(&room.id, "bob", OutgoingMessage::text("hi"))
            .await
            .unwrap();
        assert_eq!(reply.sender_name, "bob");
    }

    #[tokio::test]
    async fn send_rejects_blank_messages_and_unknown_rooms() {
        let fx = fixture().await;
        let room = fx
            .registry
            .get_or_create_individual_room("alice", "bob")
            .await
            .unwrap();

        assert!(matches!(
            fx.chat.send(&room.id, "alice", OutgoingMessage::text("   ")).await,
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            fx.chat.send("missing", "alice", OutgoingMessage::text("hi")).await,
            Err(CoreError::NotFound(_))
        ));

        // Pure-media messages may have empty content.
        let media = fx
            .chat
            .send(
                &room.id,
                "alice",
                OutgoingMessage::attachment(MessageKind::Image, "mem://p.jpg", "p.jpg", ""),
            )
            .await
            .unwrap();
        assert_eq!(media.kind, MessageKind::Image);
        assert_eq!(media.file_url.as_deref(), Some("mem://p.jpg"));
    }

    #[tokio::test]
    async fn closed_group_rejects_appends_until_reopened() {
        let fx = fixture().await;
        let groups = crate::groups::GroupManager::new(fx.store.clone());
        let room = fx
            .registry
            .create_group_room("alice", "devs", "", &["bob".into()])
            .await
            .unwrap();

        groups.set_active(&room.id, "alice", false).await.unwrap();
        assert!(matches!(
            fx.chat.send(&room.id, "alice", OutgoingMessage::text("hi")).await,
            Err(CoreError::RoomClosed(_))
        ));

        groups.set_active(&room.id, "alice", true).await.unwrap();
        fx.chat
            .send(&room.id, "alice", OutgoingMessage::text("hi"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn log_orders_by_timestamp_then_insertion() {
        let fx = fixture().await;
        let room = fx
            .registry
            .get_or_create_individual_room("alice", "bob")
            .await
            .unwrap();

        // Write records with explicit timestamps, simulating writer clocks.
        for (sender, content, ts) in [("alice", "hi", 100), ("bob", "yo", 99)] {
            fx.store
                .push(
                    &paths::messages(&room.id),
                    json!({
                        "senderId": sender,
                        "senderName": sender,
                        "content": content,
                        "type": "text",
                        "timestamp": ts,
                    }),
                )
                .await
                .unwrap();
        }

        let log = fx.chat.messages(&room.id).await.unwrap();
        let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
        // Skewed clocks reorder: the log follows timestamps, not arrival.
        assert_eq!(contents, vec!["yo", "hi"]);
    }

    #[tokio::test]
    async fn mark_edited_flags_without_touching_content() {
        let fx = fixture().await;
        let room = fx
            .registry
            .get_or_create_individual_room("alice", "bob")
            .await
            .unwrap();
        let sent = fx
            .chat
            .send(&room.id, "alice", OutgoingMessage::text("original"))
            .await
            .unwrap();

        assert!(matches!(
            fx.chat.mark_edited(&room.id, "bob", &sent.id).await,
            Err(CoreError::PermissionDenied(_))
        ));

        fx.chat.mark_edited(&room.id, "alice", &sent.id).await.unwrap();
        let log = fx.chat.messages(&room.id).await.unwrap();
        assert!(log[0].edited);
        assert!(log[0].edited_at.is_some());
        assert_eq!(log[0].content, "original");
    }

    #[tokio::test]
    async fn search_scans_only_own_rooms() {
        let fx = fixture().await;
        let dm = fx
            .registry
            .get_or_create_individual_room("alice", "bob")
            .await
            .unwrap();
        fx.chat
            .send(&dm.id, "alice", OutgoingMessage::text("deploy tonight"))
            .await
            .unwrap();

        let hits = fx.chat.search("alice", "DEPLOY").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, dm.id);

        // A user outside the room finds nothing.
        assert!(fx.chat.search("carol", "deploy").await.unwrap().is_empty());
        // Blank queries match nothing rather than everything.
        assert!(fx.chat.search("alice", "  ").await.unwrap().is_empty());
    }
}
