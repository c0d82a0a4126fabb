//! User directory: profile records in the shared tree.
//!
//! Profile writes are merges, never replacements, so presence transitions
//! and profile edits cannot clobber each other's fields.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::models::User;
use crate::store::{keyed_records, paths, RealtimeStore, Snapshot};

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn RealtimeStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    /// Merge-write a profile at `userschat/{uid}`.
    pub async fn upsert_profile(&self, user: &User) -> Result<()> {
        if user.uid.is_empty() {
            return Err(CoreError::Validation("user id must not be empty".into()));
        }
        let mut record = serde_json::to_value(user)
            .map_err(|e| CoreError::Transport(format!("encode profile: {e}")))?;
        // The uid is the store key, not a record field.
        if let Some(map) = record.as_object_mut() {
            map.remove("uid");
        }
        self.store.merge(&paths::user(&user.uid), record).await?;
        info!("[Users] Upserted profile for {}", user.uid);
        Ok(())
    }

    pub async fn get(&self, user_id: &str) -> Result<User> {
        let snapshot = self.store.get(&paths::user(user_id)).await?;
        let Some(value) = snapshot else {
            return Err(CoreError::NotFound(format!("user {user_id}")));
        };
        let mut user: User = serde_json::from_value(value)
            .map_err(|e| CoreError::Transport(format!("decode user {user_id}: {e}")))?;
        user.uid = user_id.to_string();
        Ok(user)
    }

    /// Live list of all users except the viewer.
    ///
    /// Records with neither display name nor email are skipped; they carry
    /// too little to render or address.
    pub async fn watch_all(&self, viewer_id: &str) -> Result<BoxStream<'static, Result<Vec<User>>>> {
        let viewer = viewer_id.to_string();
        let stream = self.store.watch(paths::USERS).await?;
        Ok(stream
            .map(move |snapshot| snapshot.map(|s| decode_users(s, &viewer)))
            .boxed())
    }

    /// Snapshot of all users except the viewer.
    pub async fn list(&self, viewer_id: &str) -> Result<Vec<User>> {
        let snapshot = self.store.get(paths::USERS).await?;
        Ok(decode_users(snapshot, viewer_id))
    }

    /// Case-insensitive search over display name, email, and phone.
    pub async fn search(&self, viewer_id: &str, query: &str) -> Result<Vec<User>> {
        let users = self.list(viewer_id).await?;
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(users);
        }
        Ok(users
            .into_iter()
            .filter(|u| {
                u.display_name.to_lowercase().contains(&query)
                    || u.email.to_lowercase().contains(&query)
                    || u.phone_number
                        .as_deref()
                        .map(|p| p.contains(&query))
                        .unwrap_or(false)
            })
            .collect())
    }

    /// Merge presence fields without touching the rest of the profile.
    pub(crate) async fn merge_presence(&self, user_id: &str, is_online: bool, at: i64) -> Result<()> {
        self.store
            .merge(
                &paths::user(user_id),
                json!({ "isOnline": is_online, "lastSeen": at }),
            )
            .await
    }
}

fn decode_users(snapshot: Snapshot, viewer_id: &str) -> Vec<User> {
    let mut users: Vec<User> = keyed_records::<User>(snapshot, "Users")
        .into_iter()
        .map(|(uid, mut user)| {
            user.uid = uid;
            user
        })
        .filter(|u| u.uid != viewer_id)
        .filter(|u| !u.display_name.trim().is_empty() || !u.email.trim().is_empty())
        .collect();
    users.sort_by(|a, b| a.display_label("").to_lowercase().cmp(&b.display_label("").to_lowercase()));
    users
}
