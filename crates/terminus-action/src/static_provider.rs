//! In-process action provider, used in tests and offline runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ResolutionError;
use crate::provider::ActionProvider;
use crate::tool::{FnTool, InvocableTool};
use crate::types::ToolAction;

/// Provider that hands out pre-registered tools.
#[derive(Default)]
pub struct StaticActionProvider {
    tools: HashMap<ToolAction, Arc<dyn InvocableTool>>,
    failing: HashSet<ToolAction>,
}

impl StaticActionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every action registered with a tool that echoes its input back.
    pub fn echo_all() -> Self {
        ToolAction::ALL.into_iter().fold(Self::new(), |provider, action| {
            provider.with_tool(Arc::new(FnTool::new(action, |input| {
                Ok(serde_json::json!({ "echo": input }))
            })))
        })
    }

    pub fn with_tool(mut self, tool: Arc<dyn InvocableTool>) -> Self {
        self.tools.insert(tool.action(), tool);
        self
    }

    /// Make resolution of these actions fail.
    pub fn failing_on<I: IntoIterator<Item = ToolAction>>(mut self, actions: I) -> Self {
        self.failing.extend(actions);
        self
    }
}

#[async_trait]
impl ActionProvider for StaticActionProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self, action: ToolAction) -> Result<Arc<dyn InvocableTool>, ResolutionError> {
        if self.failing.contains(&action) {
            return Err(ResolutionError::Provider {
                action,
                reason: "resolution disabled".to_string(),
            });
        }
        self.tools
            .get(&action)
            .cloned()
            .ok_or(ResolutionError::Unavailable(action))
    }
}
