//! Error taxonomy for the synchronization core.
//!
//! Every fallible operation surfaces one of these kinds to the caller;
//! nothing in the core swallows a failed write. `Transport` is the only
//! kind a caller can meaningfully retry.

use thiserror::Error;

/// Errors produced by the chat core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input: empty group name, empty member list, blank message.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The acting user does not hold the role the operation requires.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Structurally disallowed transition (e.g. removing the group creator).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Write attempted against a group whose active flag is false.
    #[error("room {0} is closed")]
    RoomClosed(String),

    /// Referenced room, user, or message does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying store call failed (network, auth expiry).
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// True when a retry of the same call could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transport(_))
    }
}
