//! Tool actions and the catalogs personas enable.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// ToolAction
// =============================================================================

/// One externally executed capability, identified by its provider name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ToolAction {
    #[serde(rename = "GOOGLECALENDAR_FIND_EVENT")]
    FindEvent,
    #[serde(rename = "GOOGLECALENDAR_LIST_CALENDARS")]
    ListCalendars,
    #[serde(rename = "GOOGLECALENDAR_UPDATE_EVENT")]
    UpdateEvent,
    #[serde(rename = "GOOGLECALENDAR_GET_CURRENT_DATE_TIME")]
    GetCurrentDateTime,
    #[serde(rename = "GOOGLECALENDAR_CREATE_EVENT")]
    CreateEvent,
    #[serde(rename = "GOOGLECALENDAR_DELETE_EVENT")]
    DeleteEvent,
    #[serde(rename = "GOOGLECALENDAR_GET_CALENDAR")]
    GetCalendar,
    #[serde(rename = "GMAIL_SEND_EMAIL")]
    SendEmail,
}

impl ToolAction {
    pub const ALL: [ToolAction; 8] = [
        ToolAction::FindEvent,
        ToolAction::ListCalendars,
        ToolAction::UpdateEvent,
        ToolAction::GetCurrentDateTime,
        ToolAction::CreateEvent,
        ToolAction::DeleteEvent,
        ToolAction::GetCalendar,
        ToolAction::SendEmail,
    ];

    /// Stable provider name.
    pub fn name(&self) -> &'static str {
        match self {
            ToolAction::FindEvent => "GOOGLECALENDAR_FIND_EVENT",
            ToolAction::ListCalendars => "GOOGLECALENDAR_LIST_CALENDARS",
            ToolAction::UpdateEvent => "GOOGLECALENDAR_UPDATE_EVENT",
            ToolAction::GetCurrentDateTime => "GOOGLECALENDAR_GET_CURRENT_DATE_TIME",
            ToolAction::CreateEvent => "GOOGLECALENDAR_CREATE_EVENT",
            ToolAction::DeleteEvent => "GOOGLECALENDAR_DELETE_EVENT",
            ToolAction::GetCalendar => "GOOGLECALENDAR_GET_CALENDAR",
            ToolAction::SendEmail => "GMAIL_SEND_EMAIL",
        }
    }

    /// Whether running this action changes the user's calendar or mailbox.
    ///
    /// Mutating actions require spoken confirmation and are never retried.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ToolAction::UpdateEvent
                | ToolAction::CreateEvent
                | ToolAction::DeleteEvent
                | ToolAction::SendEmail
        )
    }

    /// How the persona describes this capability to the user.
    pub fn capability(&self) -> &'static str {
        match self {
            ToolAction::FindEvent => "Finding and searching for events or appointments in Google Calendar",
            ToolAction::ListCalendars => "Listing the calendars you have access to",
            ToolAction::UpdateEvent => "Updating or rescheduling calendar events",
            ToolAction::GetCurrentDateTime => "Providing the current date and time",
            ToolAction::CreateEvent => "Creating new calendar events",
            ToolAction::DeleteEvent => "Deleting calendar events",
            ToolAction::GetCalendar => "Getting the details of a calendar",
            ToolAction::SendEmail => "Sending emails to your contacts",
        }
    }

    /// Phrase spoken while this action runs, when the model gave none.
    pub fn waiting_phrase(&self) -> &'static str {
        match self {
            ToolAction::FindEvent | ToolAction::GetCalendar | ToolAction::ListCalendars => {
                "Just a moment while I check your calendar."
            }
            ToolAction::GetCurrentDateTime => "Let me check the time for you.",
            ToolAction::CreateEvent | ToolAction::UpdateEvent => {
                "Give me a second while I update your calendar."
            }
            ToolAction::DeleteEvent => "Okay, removing that from your calendar now.",
            ToolAction::SendEmail => "I'm sending that email now, hang tight.",
        }
    }
}

impl fmt::Display for ToolAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ToolAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolAction::ALL
            .iter()
            .find(|a| a.name() == s)
            .copied()
            .ok_or_else(|| format!("Unknown tool action: {}", s))
    }
}

// =============================================================================
// ToolCatalog
// =============================================================================

/// The set of actions enabled for one session. Ordered, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCatalog {
    actions: Vec<ToolAction>,
}

impl ToolCatalog {
    pub fn new<I: IntoIterator<Item = ToolAction>>(actions: I) -> Self {
        let mut unique: Vec<ToolAction> = Vec::new();
        for action in actions {
            if !unique.contains(&action) {
                unique.push(action);
            }
        }
        Self { actions: unique }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog of the calendar and email assistant.
    pub fn calendar_assistant() -> Self {
        Self::new(ToolAction::ALL)
    }

    /// Catalog of the action-mode assistant.
    pub fn action_assistant() -> Self {
        Self::new([
            ToolAction::CreateEvent,
            ToolAction::UpdateEvent,
            ToolAction::DeleteEvent,
            ToolAction::SendEmail,
            ToolAction::FindEvent,
            ToolAction::GetCurrentDateTime,
            ToolAction::ListCalendars,
            ToolAction::GetCalendar,
        ])
    }

    /// Drop actions whose provider names appear in `disabled`.
    ///
    /// Unknown names are ignored with a warning.
    pub fn without(mut self, disabled: &[String]) -> Self {
        for name in disabled {
            match name.parse::<ToolAction>() {
                Ok(action) => self.actions.retain(|a| *a != action),
                Err(e) => tracing::warn!(error = %e, "Ignoring disabled action"),
            }
        }
        self
    }

    pub fn actions(&self) -> &[ToolAction] {
        &self.actions
    }

    pub fn contains(&self, action: ToolAction) -> bool {
        self.actions.contains(&action)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn has_mutating_actions(&self) -> bool {
        self.actions.iter().any(ToolAction::is_mutating)
    }
}

// =============================================================================
// Provider contract
// =============================================================================

/// Body sent to the action provider to execute one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub input: serde_json::Value,
}

/// Body returned by the action provider for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(alias = "successfull")]
    pub successful: bool,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

/// Schema the action provider publishes for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

// =============================================================================
// Tests
// =============================================================================
