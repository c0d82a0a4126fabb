//! Data model for the synchronization core.
//!
//! Field names serialize in camelCase because the entities live in a JSON
//! tree shared with other clients of the same store.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, as assigned by the local clock.
///
/// Message ordering follows these writer-assigned timestamps; clock skew
/// between clients is a documented source of misordering.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A chat user profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: i64,
    #[serde(default)]
    pub created_at: i64,
}

impl User {
    /// Minimal profile for a freshly registered user.
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: String::new(),
            phone_number: None,
            photo_url: None,
            bio: None,
            is_online: false,
            last_seen: now,
            created_at: now,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Label shown to other users.
    ///
    /// Fallback order: display name, then the local part of the email,
    /// then `fallback`.
    pub fn display_label(&self, fallback: &str) -> String {
        if !self.display_name.trim().is_empty() {
            return self.display_name.clone();
        }
        if let Some(local) = self.email.split('@').next() {
            if !local.is_empty() {
                return local.to_string();
            }
        }
        fallback.to_string()
    }
}

/// Conversation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Individual,
    Group,
}

/// A conversation scope grouping participants and messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Store key; injected on read, never persisted inside the record.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: RoomKind,
    pub participants: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    pub created_by: String,
    pub created_at: i64,
    /// Denormalized preview of the most recent message. Cache, not a
    /// source of truth; updated together with each append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Room {
    pub fn is_group(&self) -> bool {
        self.kind == RoomKind::Group
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.iter().any(|a| a == user_id)
    }

    /// Sort key for room lists: last activity, falling back to creation.
    pub fn activity_at(&self) -> i64 {
        self.last_message
            .as_ref()
            .map(|m| m.timestamp)
            .unwrap_or(self.created_at)
    }
}

/// Message payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Document,
    Audio,
}

/// A single message within one room's log.
///
/// Immutable once appended, except for the `edited` flag and timestamp.
/// Sender name and photo are snapshotted at send time; later profile edits
/// do not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_photo: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
}

/// A message not yet appended to a log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub content: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
            file_url: None,
            file_name: None,
        }
    }

    pub fn attachment(
        kind: MessageKind,
        file_url: impl Into<String>,
        file_name: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            content: caption.into(),
            kind,
            file_url: Some(file_url.into()),
            file_name: Some(file_name.into()),
        }
    }
}

/// Ephemeral per-room, per-user signal that someone is composing input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingMark {
    pub user_id: String,
    pub user_name: String,
    pub chat_id: String,
    /// Last keystroke burst, in epoch milliseconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_label_falls_back_to_email_local_part() {
        let user = User::new("u1", "alice@example.com");
        assert_eq!(user.display_label("Anonymous"), "alice");

        let named = user.clone().with_display_name("Alice");
        assert_eq!(named.display_label("Anonymous"), "Alice");
    }

    #[test]
    fn display_label_placeholder_when_profile_is_bare() {
        let user = User::new("u1", "");
        assert_eq!(user.display_label("Anonymous"), "Anonymous");
    }

    #[test]
    fn activity_prefers_last_message_over_creation() {
        let mut room = Room {
            id: "r1".into(),
            name: None,
            kind: RoomKind::Individual,
            participants: vec!["a".into(), "b".into()],
            admins: vec![],
            created_by: "a".into(),
            created_at: 10,
            last_message: None,
            is_active: true,
            group_photo: None,
            description: None,
        };
        assert_eq!(room.activity_at(), 10);

        room.last_message = Some(Message {
            id: "m1".into(),
            sender_id: "a".into(),
            sender_name: "A".into(),
            sender_photo: None,
            content: "hi".into(),
            kind: MessageKind::Text,
            file_url: None,
            file_name: None,
            timestamp: 99,
            edited: false,
            edited_at: None,
        });
        assert_eq!(room.activity_at(), 99);
    }

    #[test]
    fn room_record_round_trips_without_id() {
        let room = Room {
            id: String::new(),
            name: Some("devs".into()),
            kind: RoomKind::Group,
            participants: vec!["a".into()],
            admins: vec!["a".into()],
            created_by: "a".into(),
            created_at: 1,
            last_message: None,
            is_active: true,
            group_photo: None,
            description: None,
        };
        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(value["type"], "group");
        // id travels in the store key, not the record
        assert!(value.get("id").is_none());
        let back: Room = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind, RoomKind::Group);
    }
}
