//! Presence tracker: online/offline flags and last-seen times.
//!
//! Transitions are best-effort merges over the profile record. A missed
//! offline write (crashed client, dropped connection) is an expected
//! failure mode; readers treat a stale `lastSeen` accordingly.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::info;

use crate::error::Result;
use crate::models::{now_millis, User};
use crate::store::{keyed_records, paths, RealtimeStore, Snapshot};
use crate::users::UserDirectory;

#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn RealtimeStore>,
    users: UserDirectory,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn RealtimeStore>, users: UserDirectory) -> Self {
        Self { store, users }
    }

    /// Idempotent `{isOnline: true, lastSeen: now}` merge.
    pub async fn mark_online(&self, user_id: &str) -> Result<()> {
        self.users.merge_presence(user_id, true, now_millis()).await?;
        info!("[Presence] {} online", user_id);
        Ok(())
    }

    /// Idempotent `{isOnline: false, lastSeen: now}` merge.
    pub async fn mark_offline(&self, user_id: &str) -> Result<()> {
        self.users.merge_presence(user_id, false, now_millis()).await?;
        info!("[Presence] {} offline", user_id);
        Ok(())
    }

    /// Live set of online user ids, excluding the viewer.
    pub async fn watch_online(
        &self,
        viewer_id: &str,
    ) -> Result<BoxStream<'static, Result<Vec<String>>>> {
        let viewer = viewer_id.to_string();
        let stream = self.store.watch(paths::USERS).await?;
        Ok(stream
            .map(move |snapshot| snapshot.map(|s| online_ids(s, &viewer)))
            .boxed())
    }

    /// Snapshot of the online set, excluding the viewer.
    pub async fn online_now(&self, viewer_id: &str) -> Result<Vec<String>> {
        let snapshot = self.store.get(paths::USERS).await?;
        Ok(online_ids(snapshot, viewer_id))
    }

    /// Live online flag for a single user. Unknown users read as offline.
    pub async fn watch_user(&self, user_id: &str) -> Result<BoxStream<'static, Result<bool>>> {
        let stream = self.store.watch(&paths::user(user_id)).await?;
        Ok(stream
            .map(|snapshot| {
                snapshot.map(|s| {
                    s.and_then(|v| v.get("isOnline").and_then(|b| b.as_bool()))
                        .unwrap_or(false)
                })
            })
            .boxed())
    }
}

fn online_ids(snapshot: Snapshot, viewer_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = keyed_records::<User>(snapshot, "Presence")
        .into_iter()
        .filter(|(uid, user)| user.is_online && uid != viewer_id)
        .map(|(uid, _)| uid)
        .collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tracker() -> PresenceTracker {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::default());
        let users = UserDirectory::new(store.clone());
        PresenceTracker::new(store, users)
    }

    #[tokio::test]
    async fn presence_merge_keeps_profile_fields() {
        let tracker = tracker();
        let mut profile = User::new("u1", "alice@x.com").with_display_name("Alice");
        profile.bio = Some("hello".into());
        tracker.users.upsert_profile(&profile).await.unwrap();

        tracker.mark_online("u1").await.unwrap();
        // Marking online twice is harmless.
        tracker.mark_online("u1").await.unwrap();

        let user = tracker.users.get("u1").await.unwrap();
        assert!(user.is_online);
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.bio.as_deref(), Some("hello"));

        tracker.mark_offline("u1").await.unwrap();
        let user = tracker.users.get("u1").await.unwrap();
        assert!(!user.is_online);
        assert_eq!(user.display_name, "Alice");
    }

    #[tokio::test]
    async fn online_set_excludes_viewer_and_offline_users() {
        let tracker = tracker();
        for uid in ["a", "b", "c"] {
            tracker
                .users
                .upsert_profile(&User::new(uid, format!("{uid}@x.com")))
                .await
                .unwrap();
        }
        tracker.mark_online("a").await.unwrap();
        tracker.mark_online("b").await.unwrap();

        assert_eq!(tracker.online_now("a").await.unwrap(), vec!["b"]);
        assert_eq!(tracker.online_now("z").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn per_user_watch_follows_presence_transitions() {
        let tracker = tracker();
        tracker
            .users
            .upsert_profile(&User::new("a", "a@x.com"))
            .await
            .unwrap();

        let mut flag = tracker.watch_user("a").await.unwrap();
        assert!(!flag.next().await.unwrap().unwrap());

        tracker.mark_online("a").await.unwrap();
        assert!(flag.next().await.unwrap().unwrap());

        tracker.mark_offline("a").await.unwrap();
        assert!(!flag.next().await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn per_user_watch_of_unknown_user_reads_offline() {
        let tracker = tracker();
        let mut flag = tracker.watch_user("ghost").await.unwrap();
        assert!(!flag.next().await.unwrap().unwrap());
    }
}
