use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted by a running conversation session.
///
/// Published on the session's broadcast channel and consumed by:
/// - the job runner in `terminus-app`, which logs each event at debug level
/// - tests (to assert ordering between turns, waiting phrases and tool calls)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SessionEvent {
    /// The session is bound to its room and accepting input.
    SessionStarted {
        job_id: Uuid,
        room: String,
        tool_count: usize,
    },

    /// The opening greeting was spoken.
    GreetingEmitted { text: String },

    /// The opening greeting could not be produced; the session continues.
    GreetingFailed { reason: String },

    /// Speech-to-text (or typed input) produced a final transcript.
    TurnFinalized { turn: u64, normalized_text: String },

    /// A waiting phrase was emitted ahead of slow tool calls.
    WaitingPhraseEmitted { turn: u64, text: String },

    /// A tool call finished, successfully or not.
    ToolCallCompleted {
        turn: u64,
        action: String,
        success: bool,
        duration: Duration,
    },

    /// The final reply for a turn was emitted.
    ReplyEmitted { turn: u64, text: String },

    /// A turn was abandoned after a generation or synthesis failure.
    TurnDropped { turn: u64, reason: String },

    /// The room disconnected or the job was cancelled.
    SessionEnded { job_id: Uuid, turns: u64 },
}

impl SessionEvent {
    /// The turn number this event belongs to, if any.
    pub fn turn(&self) -> Option<u64> {
        match self {
            SessionEvent::TurnFinalized { turn, .. }
            | SessionEvent::WaitingPhraseEmitted { turn, .. }
            | SessionEvent::ToolCallCompleted { turn, .. }
            | SessionEvent::ReplyEmitted { turn, .. }
            | SessionEvent::TurnDropped { turn, .. } => Some(*turn),
            _ => None,
        }
    }
}
