//! Session lifecycle hooks.
//!
//! The hosting application calls `start` when a user's authenticated
//! session begins and `end` when it closes. Presence is best-effort: a
//! handle dropped without `end` simply leaves the user looking online
//! until a reader notices the stale `lastSeen`.

use tracing::warn;

use crate::error::Result;
use crate::models::User;
use crate::presence::PresenceTracker;
use crate::users::UserDirectory;

pub struct SessionHandle {
    presence: PresenceTracker,
    user_id: String,
    ended: bool,
}

impl SessionHandle {
    /// Upsert the profile and mark the user online.
    pub(crate) async fn start(
        users: &UserDirectory,
        presence: PresenceTracker,
        user: &User,
    ) -> Result<Self> {
        users.upsert_profile(user).await?;
        presence.mark_online(&user.uid).await?;
        Ok(Self {
            presence,
            user_id: user.uid.clone(),
            ended: false,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Mark the user offline. Safe to call more than once.
    pub async fn end(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.presence.mark_offline(&self.user_id).await?;
        self.ended = true;
        Ok(())
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if !self.ended {
            // Cannot write from a sync drop; this is the documented
            // missed-offline-signal case.
            warn!(
                "[Session] Handle for {} dropped without end(); user stays online until observed stale",
                self.user_id
            );
        }
    }
}
