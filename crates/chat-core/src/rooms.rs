//! Room registry: conversation identity, membership, and discovery.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::models::{now_millis, Room, RoomKind};
use crate::store::{keyed_records, paths, RealtimeStore, Snapshot};

#[derive(Clone)]
pub struct RoomRegistry {
    store: Arc<dyn RealtimeStore>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    /// Live list of the rooms `user_id` participates in, most recent
    /// activity first. Replays current state, then updates per change.
    pub async fn watch_rooms_for_user(
        &self,
        user_id: &str,
    ) -> Result<BoxStream<'static, Result<Vec<Room>>>> {
        let user = user_id.to_string();
        let stream = self.store.watch(paths::ROOMS).await?;
        Ok(stream
            .map(move |snapshot| snapshot.map(|s| rooms_of(s, &user)))
            .boxed())
    }

    /// Snapshot of the rooms `user_id` participates in.
    pub async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<Room>> {
        let snapshot = self.store.get(paths::ROOMS).await?;
        Ok(rooms_of(snapshot, user_id))
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room> {
        fetch_room(&self.store, room_id).await
    }

    /// Find or create the 1:1 room for an unordered pair of users.
    ///
    /// Scans existing individual rooms before writing, so repeated calls
    /// (either argument order) return the same room. Two truly concurrent
    /// first calls can still both miss and create duplicates; the design
    /// has no compare-and-set primitive, and this is a known race rather
    /// than a silently patched one.
    pub async fn get_or_create_individual_room(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> Result<Room> {
        if user_id == other_user_id {
            return Err(CoreError::Validation(
                "an individual room needs two distinct users".into(),
            ));
        }

        let snapshot = self.store.get(paths::ROOMS).await?;
        for (key, room) in keyed_records::<Room>(snapshot, "Rooms") {
            if room.kind == RoomKind::Individual
                && room.participants.len() == 2
                && room.has_participant(user_id)
                && room.has_participant(other_user_id)
            {
                let mut room = room;
                room.id = key;
                return Ok(room);
            }
        }

        let mut room = Room {
            id: String::new(),
            name: None,
            kind: RoomKind::Individual,
            participants: vec![user_id.to_string(), other_user_id.to_string()],
            admins: Vec::new(),
            created_by: user_id.to_string(),
            created_at: now_millis(),
            last_message: None,
            is_active: true,
            group_photo: None,
            description: None,
        };
        room.id = self.persist(&room).await?;
        info!(
            "[Rooms] Created individual room {} for {} / {}",
            room.id, user_id, other_user_id
        );
        Ok(room)
    }

    /// Create a group room with the creator as sole admin.
    pub async fn create_group_room(
        &self,
        creator_id: &str,
        name: &str,
        description: &str,
        member_ids: &[String],
    ) -> Result<Room> {
        if name.trim().is_empty() {
            return Err(CoreError::Validation("group name must not be empty".into()));
        }
        if member_ids.is_empty() {
            return Err(CoreError::Validation(
                "a group needs at least one member besides the creator".into(),
            ));
        }

        let mut participants = vec![creator_id.to_string()];
        for id in member_ids {
            if !participants.contains(id) {
                participants.push(id.clone());
            }
        }

        let mut room = Room {
            id: String::new(),
            name: Some(name.trim().to_string()),
            kind: RoomKind::Group,
            participants,
            admins: vec![creator_id.to_string()],
            created_by: creator_id.to_string(),
            created_at: now_millis(),
            last_message: None,
            is_active: true,
            group_photo: None,
            description: if description.trim().is_empty() {
                None
            } else {
                Some(description.trim().to_string())
            },
        };
        room.id = self.persist(&room).await?;
        info!(
            "[Rooms] Created group {} ({:?}) with {} participants",
            room.id,
            room.name,
            room.participants.len()
        );
        Ok(room)
    }

    /// Case-insensitive search over group names and descriptions.
    /// Individual rooms are never discoverable.
    pub async fn search_public_rooms(&self, term: &str) -> Result<Vec<Room>> {
        let snapshot = self.store.get(paths::ROOMS).await?;
        let term = term.trim().to_lowercase();
        let mut rooms: Vec<Room> = keyed_records::<Room>(snapshot, "Rooms")
            .into_iter()
            .map(|(key, mut room)| {
                room.id = key;
                room
            })
            .filter(|room| room.kind == RoomKind::Group)
            .filter(|room| {
                term.is_empty()
                    || room
                        .name
                        .as_deref()
                        .map(|n| n.to_lowercase().contains(&term))
                        .unwrap_or(false)
                    || room
                        .description
                        .as_deref()
                        .map(|d| d.to_lowercase().contains(&term))
                        .unwrap_or(false)
            })
            .collect();
        rooms.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
        Ok(rooms)
    }

    async fn persist(&self, room: &Room) -> Result<String> {
        let record = serde_json::to_value(room)
            .map_err(|e| CoreError::Transport(format!("encode room: {e}")))?;
        self.store.push(paths::ROOMS, record).await
    }
}

/// Point read of one room, shared with the role manager and message log.
pub(crate) async fn fetch_room(store: &Arc<dyn RealtimeStore>, room_id: &str) -> Result<Room> {
    let snapshot = store.get(&paths::room(room_id)).await?;
    let Some(value) = snapshot else {
        return Err(CoreError::NotFound(format!("room {room_id}")));
    };
    let mut room: Room = serde_json::from_value(value)
        .map_err(|e| CoreError::Transport(format!("decode room {room_id}: {e}")))?;
    room.id = room_id.to_string();
    Ok(room)
}

fn rooms_of(snapshot: Snapshot, user_id: &str) -> Vec<Room> {
    let mut rooms: Vec<Room> = keyed_records::<Room>(snapshot, "Rooms")
        .into_iter()
        .map(|(key, mut room)| {
            room.id = key;
            room
        })
        .filter(|room| room.has_participant(user_id))
        .collect();
    rooms.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
    rooms
}
