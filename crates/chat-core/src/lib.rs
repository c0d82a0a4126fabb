//! Chat synchronization core.
//!
//! Rooms, message logs, presence, typing signals, and unread counts over
//! a key-path addressed realtime store. The store and the object store
//! for attachments are opaque collaborators behind traits; broadcast-backed
//! in-memory implementations are bundled for embedding and tests.
//!
//! All durability, fan-out, and transport concerns belong to the backing
//! store. The core owns the synchronization semantics: idempotent room
//! creation, timestamp-ordered logs, admin/creator authorization,
//! read-time typing expiry, and unread aggregation.

pub mod chat;
pub mod config;
pub mod error;
pub mod groups;
pub mod models;
pub mod objects;
pub mod outbox;
pub mod presence;
pub mod rooms;
pub mod session;
pub mod store;
pub mod typing;
pub mod unread;
pub mod users;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::FmtSubscriber;

pub use chat::MessageLog;
pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use groups::GroupManager;
pub use models::{Message, MessageKind, OutgoingMessage, Room, RoomKind, TypingMark, User};
pub use objects::{MemoryObjectStore, ObjectStore};
pub use outbox::Outbox;
pub use presence::PresenceTracker;
pub use rooms::RoomRegistry;
pub use session::SessionHandle;
pub use store::{MemoryStore, RealtimeStore};
pub use typing::TypingTracker;
pub use unread::{FocusRegistry, UnreadCounters};
pub use users::UserDirectory;

/// Install a global fmt subscriber honoring `RUST_LOG`. Call once from
/// the hosting application; repeated calls are ignored.
pub fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already set, ignore
    }
}

/// The wired-up core: every manager sharing one store and one config.
pub struct ChatCore {
    config: CoreConfig,
    store: Arc<dyn RealtimeStore>,
    objects: Arc<dyn ObjectStore>,
    users: UserDirectory,
    rooms: RoomRegistry,
    groups: GroupManager,
    presence: PresenceTracker,
    typing: TypingTracker,
    unread: Arc<UnreadCounters>,
    chat: MessageLog,
    outbox: Outbox,
}

impl ChatCore {
    pub fn new(
        store: Arc<dyn RealtimeStore>,
        objects: Arc<dyn ObjectStore>,
        config: CoreConfig,
    ) -> Self {
        let users = UserDirectory::new(store.clone());
        let focus = FocusRegistry::default();
        let unread = Arc::new(UnreadCounters::new(store.clone(), focus));
        let chat = MessageLog::new(
            store.clone(),
            users.clone(),
            unread.clone(),
            config.anonymous_label.clone(),
        );
        let core = Self {
            rooms: RoomRegistry::new(store.clone()),
            groups: GroupManager::new(store.clone()),
            presence: PresenceTracker::new(store.clone(), users.clone()),
            typing: TypingTracker::new(store.clone(), config.typing_expiry),
            unread,
            chat,
            outbox: Outbox::new(),
            users,
            objects,
            store,
            config,
        };
        info!("[Core] Chat core initialized");
        core
    }

    /// Fully in-memory core: bundled stores, default config.
    pub fn in_memory() -> Self {
        let config = CoreConfig::default();
        let store = Arc::new(MemoryStore::new(config.channel_capacity));
        Self::new(store, Arc::new(MemoryObjectStore::new()), config)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RealtimeStore> {
        &self.store
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn groups(&self) -> &GroupManager {
        &self.groups
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn typing(&self) -> &TypingTracker {
        &self.typing
    }

    pub fn unread(&self) -> &UnreadCounters {
        &self.unread
    }

    pub fn chat(&self) -> &MessageLog {
        &self.chat
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Begin a user session: upsert the profile, mark online, hand back
    /// the lifecycle handle.
    pub async fn start_session(&self, user: &User) -> Result<SessionHandle> {
        SessionHandle::start(&self.users, self.presence.clone(), user).await
    }

    /// Store an attachment blob and return the URL to embed in a message.
    pub async fn upload_attachment(
        &self,
        uploader_id: &str,
        kind: MessageKind,
        file_name: &str,
        data: bytes::Bytes,
        content_type: &str,
    ) -> Result<String> {
        let folder = match kind {
            MessageKind::Image => "image",
            MessageKind::Document => "document",
            MessageKind::Audio => "audio",
            MessageKind::Text => {
                return Err(CoreError::Validation(
                    "text messages carry no attachment".into(),
                ))
            }
        };
        let path = format!(
            "{folder}/{uploader_id}/{}_{file_name}",
            uuid::Uuid::new_v4()
        );
        self.objects.upload(&path, data, content_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_attachment_rejects_text_kind() {
        let core = ChatCore::in_memory();
        let result = core
            .upload_attachment(
                "u1",
                MessageKind::Text,
                "note.txt",
                bytes::Bytes::from_static(b"x"),
                "text/plain",
            )
            .await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn upload_attachment_namespaces_by_kind_and_user() {
        let core = ChatCore::in_memory();
        let url = core
            .upload_attachment(
                "u1",
                MessageKind::Image,
                "photo.jpg",
                bytes::Bytes::from_static(b"jpeg"),
                "image/jpeg",
            )
            .await
            .unwrap();
        assert!(url.starts_with("mem://image/u1/"));
        assert!(url.ends_with("_photo.jpg"));
    }
}
