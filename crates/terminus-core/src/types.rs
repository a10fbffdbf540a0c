use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerminusError};

// =============================================================================
// Audio
// =============================================================================

/// A block of mono PCM audio.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    /// Samples as f32 values in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// =============================================================================
// Persona clock
// =============================================================================

/// Date and time the persona is told about, fixed at session start.
///
/// Invariant: all three fields are non-empty once `validate` has passed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaContext {
    /// e.g. "Monday, October 19, 2026"
    pub date: String,
    /// e.g. "09:30 AM"
    pub time: String,
    /// IANA name, e.g. "Asia/Kolkata"
    pub timezone: String,
    /// Abbreviation at that instant, e.g. "IST"
    pub zone_abbreviation: String,
}

impl PersonaContext {
    pub const DATE_FORMAT: &'static str = "%A, %B %d, %Y";
    pub const TIME_FORMAT: &'static str = "%I:%M %p";

    /// Build the context for a given instant in the given zone.
    pub fn at(instant: DateTime<Utc>, tz: Tz) -> Self {
        let local = instant.with_timezone(&tz);
        Self {
            date: local.format(Self::DATE_FORMAT).to_string(),
            time: local.format(Self::TIME_FORMAT).to_string(),
            timezone: tz.name().to_string(),
            zone_abbreviation: local.format("%Z").to_string(),
        }
    }

    /// Build the context for the current instant.
    pub fn now(tz: Tz) -> Self {
        Self::at(Utc::now(), tz)
    }

    /// Reject contexts with missing fields instead of falling back to a default date.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("date", &self.date),
            ("time", &self.time),
            ("timezone", &self.timezone),
        ] {
            if value.trim().is_empty() {
                return Err(TerminusError::PersonaContext(format!("{} is empty", field)));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Turns and tool calls
// =============================================================================

/// Result of one tool invocation as reported back to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Failure(String),
}

/// One in-flight or completed tool call.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRecord {
    /// Provider-assigned call id, echoed back with the result.
    pub call_id: String,
    pub action_name: String,
    pub input: serde_json::Value,
    pub outcome: ToolOutcome,
    pub duration: Duration,
}

impl ToolCallRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success(_))
    }

    /// Render the outcome as the content of a tool message for the model.
    ///
    /// Failures become `{"error": "..."}` so the model can talk about them.
    pub fn to_model_content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(value) => value.to_string(),
            ToolOutcome::Failure(reason) => serde_json::json!({ "error": reason }).to_string(),
        }
    }
}

/// One recognized-input to generated-reply exchange. Discarded after the reply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationTurn {
    pub raw_text: String,
    pub normalized_text: String,
    pub reply_text: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl ConversationTurn {
    pub fn new(raw_text: impl Into<String>, normalized_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            normalized_text: normalized_text.into(),
            ..Self::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
