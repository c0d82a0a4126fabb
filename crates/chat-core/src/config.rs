//! Core configuration shared by the managers.

use std::time::Duration;

/// Tunables for the synchronization core.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Age after which a typing mark is excluded from live views.
    pub typing_expiry: Duration,
    /// Idle period after which callers should clear their typing mark.
    pub typing_idle: Duration,
    /// Capacity of the change fan-out channel in the bundled memory store.
    pub channel_capacity: usize,
    /// Placeholder shown when a user has neither display name nor email.
    pub anonymous_label: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            typing_expiry: Duration::from_millis(3000),
            typing_idle: Duration::from_millis(1000),
            channel_capacity: 100,
            anonymous_label: "Anonymous".to_string(),
        }
    }
}
