//! Invocable tool trait and the per-session tool set.
//!
//! A resolved tool pairs a catalog action with the schema the model sees and
//! an async `invoke`. The `ToolSet` is what the session advertises to the
//! language model and dispatches tool calls through.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use terminus_providers::ToolSpec;

use crate::error::ExecutionError;
use crate::types::ToolAction;

/// A tool the language model can call mid-conversation.
#[async_trait]
pub trait InvocableTool: Send + Sync {
    /// The catalog action this tool executes.
    fn action(&self) -> ToolAction;

    /// Name, description and argument schema advertised to the model.
    fn spec(&self) -> &ToolSpec;

    /// Run the action with the model-supplied arguments.
    async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, ExecutionError>;
}

/// Resolved tools for one session, keyed by provider name.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<&'static str, Arc<dyn InvocableTool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any previous tool for the same action.
    pub fn insert(&mut self, tool: Arc<dyn InvocableTool>) {
        self.tools.insert(tool.action().name(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn InvocableTool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, action: ToolAction) -> bool {
        self.tools.contains_key(action.name())
    }

    /// Actions present, in name order.
    pub fn actions(&self) -> Vec<ToolAction> {
        self.tools.values().map(|t| t.action()).collect()
    }

    /// Specs to advertise to the language model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

impl FromIterator<Arc<dyn InvocableTool>> for ToolSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn InvocableTool>>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        for tool in iter {
            set.insert(tool);
        }
        set
    }
}

/// Signature of the closure behind an `FnTool`.
pub type ToolFn =
    Box<dyn Fn(serde_json::Value) -> Result<serde_json::Value, ExecutionError> + Send + Sync>;

/// In-process tool backed by a synchronous closure.
pub struct FnTool {
    action: ToolAction,
    spec: ToolSpec,
    run: ToolFn,
}

impl FnTool {
    pub fn new<F>(action: ToolAction, run: F) -> Self
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value, ExecutionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            action,
            spec: ToolSpec {
                name: action.name().to_string(),
                description: action.capability().to_string(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            },
            run: Box::new(run),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.spec.parameters = parameters;
        self
    }
}

#[async_trait]
impl InvocableTool for FnTool {
    fn action(&self) -> ToolAction {
        self.action
    }

    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, ExecutionError> {
        (self.run)(input)
    }
}
