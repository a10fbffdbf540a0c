//! Session error type.

use terminus_core::TerminusError;

/// Errors that end a session or prevent it from starting.
///
/// Per-turn generation and tool failures never surface here; the session
/// absorbs them into the conversation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] TerminusError),

    #[error("Failed to join room {room}: {reason}")]
    Connection { room: String, reason: String },

    #[error("A session is already bound to job {0}")]
    AlreadyStarted(uuid::Uuid),

    #[error("Generation failed: {0}")]
    Generation(#[from] terminus_providers::ProviderError),

    #[error("Room error: {0}")]
    Room(String),
}

impl SessionError {
    /// Whether the hosting runtime should treat this as a failed job.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Configuration(_)
                | SessionError::Connection { .. }
                | SessionError::AlreadyStarted(_)
        )
    }
}
