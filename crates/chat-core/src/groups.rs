//! Group role manager: admin/creator authorization layered on the registry.
//!
//! Conflicting concurrent writes are kept safe by idempotence: removing an
//! absent participant or demoting a non-admin is a no-op, never an error,
//! so last-writer-wins merges cannot corrupt membership.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::models::Room;
use crate::rooms::fetch_room;
use crate::store::{paths, RealtimeStore};

#[derive(Clone)]
pub struct GroupManager {
    store: Arc<dyn RealtimeStore>,
}

impl GroupManager {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    async fn group(&self, room_id: &str) -> Result<Room> {
        let room = fetch_room(&self.store, room_id).await?;
        if !room.is_group() {
            return Err(CoreError::InvalidOperation(format!(
                "room {room_id} is not a group"
            )));
        }
        Ok(room)
    }

    fn require_admin(room: &Room, actor_id: &str) -> Result<()> {
        if room.is_admin(actor_id) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied(format!(
                "{actor_id} is not an admin of {}",
                room.id
            )))
        }
    }

    /// Append `user_id` to the participants. No-op when already present.
    pub async fn add_participant(&self, room_id: &str, actor_id: &str, user_id: &str) -> Result<()> {
        let room = self.group(room_id).await?;
        Self::require_admin(&room, actor_id)?;

        if room.has_participant(user_id) {
            return Ok(());
        }
        let mut participants = room.participants;
        participants.push(user_id.to_string());
        self.store
            .merge(&paths::room(room_id), json!({ "participants": participants }))
            .await?;
        info!("[Groups] {} added {} to {}", actor_id, user_id, room_id);
        Ok(())
    }

    /// Remove `user_id` from participants and admins. Removing someone who
    /// already left is a no-op; removing the creator is disallowed.
    pub async fn remove_participant(
        &self,
        room_id: &str,
        actor_id: &str,
        user_id: &str,
    ) -> Result<()> {
        let room = self.group(room_id).await?;
        Self::require_admin(&room, actor_id)?;

        if user_id == room.created_by {
            return Err(CoreError::InvalidOperation(
                "the group creator cannot be removed".into(),
            ));
        }
        if !room.has_participant(user_id) && !room.is_admin(user_id) {
            return Ok(());
        }

        let participants: Vec<String> = room
            .participants
            .into_iter()
            .filter(|p| p != user_id)
            .collect();
        let admins: Vec<String> = room.admins.into_iter().filter(|a| a != user_id).collect();
        self.store
            .merge(
                &paths::room(room_id),
                json!({ "participants": participants, "admins": admins }),
            )
            .await?;
        // A departed member has no way to open the room again, so their
        // unread counter for it must not linger.
        self.store
            .remove(&paths::unread_room(user_id, room_id))
            .await?;
        info!("[Groups] {} removed {} from {}", actor_id, user_id, room_id);
        Ok(())
    }

    /// Grant admin to an existing participant.
    pub async fn promote_admin(&self, room_id: &str, actor_id: &str, user_id: &str) -> Result<()> {
        let room = self.group(room_id).await?;
        Self::require_admin(&room, actor_id)?;

        if !room.has_participant(user_id) {
            return Err(CoreError::InvalidOperation(format!(
                "{user_id} is not a participant of {room_id}"
            )));
        }
        if room.is_admin(user_id) {
            return Ok(());
        }
        let mut admins = room.admins;
        admins.push(user_id.to_string());
        self.store
            .merge(&paths::room(room_id), json!({ "admins": admins }))
            .await?;
        info!("[Groups] {} promoted {} in {}", actor_id, user_id, room_id);
        Ok(())
    }

    /// Revoke admin. Only the creator may demote, and never themselves.
    pub async fn demote_admin(&self, room_id: &str, actor_id: &str, user_id: &str) -> Result<()> {
        let room = self.group(room_id).await?;
        if actor_id != room.created_by {
            return Err(CoreError::PermissionDenied(
                "only the group creator can demote admins".into(),
            ));
        }
        if user_id == room.created_by {
            return Err(CoreError::InvalidOperation(
                "the group creator cannot be demoted".into(),
            ));
        }
        if !room.is_admin(user_id) {
            return Ok(());
        }
        let admins: Vec<String> = room.admins.into_iter().filter(|a| a != user_id).collect();
        self.store
            .merge(&paths::room(room_id), json!({ "admins": admins }))
            .await?;
        info!("[Groups] {} demoted {} in {}", actor_id, user_id, room_id);
        Ok(())
    }

    /// Open or close the group for new messages.
    pub async fn set_active(&self, room_id: &str, actor_id: &str, is_active: bool) -> Result<()> {
        let room = self.group(room_id).await?;
        Self::require_admin(&room, actor_id)?;
        self.store
            .merge(&paths::room(room_id), json!({ "isActive": is_active }))
            .await?;
        info!("[Groups] {} set {} active={}", actor_id, room_id, is_active);
        Ok(())
    }

    /// Leave the group, with creator succession.
    ///
    /// A regular member just drops out. A leaving creator hands ownership
    /// to the lowest-ordered remaining admin; with no successor the room
    /// and its message log are destroyed rather than left ownerless.
    pub async fn leave_or_delete_group(&self, room_id: &str, user_id: &str) -> Result<()> {
        let room = self.group(room_id).await?;

        if user_id != room.created_by {
            if !room.has_participant(user_id) && !room.is_admin(user_id) {
                return Ok(());
            }
            let participants: Vec<String> = room
                .participants
                .into_iter()
                .filter(|p| p != user_id)
                .collect();
            let admins: Vec<String> = room.admins.into_iter().filter(|a| a != user_id).collect();
            self.store
                .merge(
                    &paths::room(room_id),
                    json!({ "participants": participants, "admins": admins }),
                )
                .await?;
            self.store
                .remove(&paths::unread_room(user_id, room_id))
                .await?;
            info!("[Groups] {} left {}", user_id, room_id);
            return Ok(());
        }

        let successors: Vec<String> = room
            .admins
            .iter()
            .filter(|a| *a != user_id)
            .cloned()
            .collect();

        if let Some(heir) = successors.first() {
            let participants: Vec<String> = room
                .participants
                .into_iter()
                .filter(|p| p != user_id)
                .collect();
            self.store
                .merge(
                    &paths::room(room_id),
                    json!({
                        "createdBy": heir,
                        "participants": participants,
                        "admins": successors,
                    }),
                )
                .await?;
            self.store
                .remove(&paths::unread_room(user_id, room_id))
                .await?;
            info!(
                "[Groups] Creator {} left {}, ownership passed to {}",
                user_id, room_id, heir
            );
        } else {
            // No successor: destroy the room, its log, its typing marks,
            // and every participant's unread counter for it. A counter
            // surviving the room would be a badge nobody can clear.
            self.store.remove(&paths::room(room_id)).await?;
            self.store.remove(&paths::chat(room_id)).await?;
            self.store.remove(&paths::typing(room_id)).await?;
            for uid in &room.participants {
                self.store
                    .remove(&paths::unread_room(uid, room_id))
                    .await?;
            }
            info!("[Groups] Creator {} left {}; room deleted", user_id, room_id);
        }
        Ok(())
    }
}
