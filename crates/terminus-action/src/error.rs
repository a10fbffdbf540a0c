//! Error types for tool resolution and execution.

use crate::types::ToolAction;

/// Failure to turn one catalog action into an invocable tool.
///
/// Recovered locally: the action is left out of the tool set.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("Action {0} is not offered by the provider")]
    Unavailable(ToolAction),
    #[error("Action {action} has an invalid schema: {reason}")]
    InvalidSchema { action: ToolAction, reason: String },
    #[error("Provider request failed for {action}: {reason}")]
    Provider { action: ToolAction, reason: String },
}

impl ResolutionError {
    pub fn action(&self) -> ToolAction {
        match self {
            ResolutionError::Unavailable(action)
            | ResolutionError::InvalidSchema { action, .. }
            | ResolutionError::Provider { action, .. } => *action,
        }
    }
}

/// Failure of one invoked tool call.
///
/// Recovered at the conversation level: reported to the model as a failed
/// tool result.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Tool not available in this session: {0}")]
    UnknownTool(String),
    #[error("Invalid tool input: {0}")]
    InvalidInput(String),
    #[error("Tool failed: {0}")]
    Failed(String),
    #[error("Tool timed out after {0} seconds")]
    Timeout(u64),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
