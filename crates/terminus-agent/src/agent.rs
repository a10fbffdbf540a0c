//! The conversational agent bundle.
//!
//! A persona is data, not a type: instructions text, a resolved tool set, and
//! the two turn-processing hooks. The calendar assistant and the action-mode
//! assistant are two values of the same struct.

use std::sync::Arc;

use terminus_action::{resolve_catalog, ActionProvider, ToolCatalog, ToolSet};
use terminus_core::{PersonaContext, Result};

use crate::backchannel::BackchannelSelector;
use crate::normalizer::SpeechNormalizer;
use crate::persona::{PersonaInstructionBuilder, PersonaKind};

/// Cleans recognized text before it reaches the model.
pub type NormalizeHook = Arc<dyn Fn(&str) -> String + Send + Sync>;
/// Adjusts a generated reply before synthesis. The flag marks the greeting.
pub type EnhanceHook = Arc<dyn Fn(&str, bool) -> String + Send + Sync>;

/// Turn-processing hooks injected into an agent.
#[derive(Clone)]
pub struct TurnHooks {
    pub normalize: NormalizeHook,
    pub enhance: EnhanceHook,
}

impl TurnHooks {
    /// Filler removal plus backchannel prefixes.
    pub fn conversational(normalizer: SpeechNormalizer, backchannel: Arc<BackchannelSelector>) -> Self {
        Self {
            normalize: Arc::new(move |text| normalizer.normalize(text)),
            enhance: Arc::new(move |reply, is_greeting| backchannel.maybe_prefix(reply, is_greeting)),
        }
    }

    /// Hooks that leave text untouched.
    pub fn passthrough() -> Self {
        Self {
            normalize: Arc::new(|text| text.to_string()),
            enhance: Arc::new(|reply, _| reply.to_string()),
        }
    }
}

impl std::fmt::Debug for TurnHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnHooks").finish_non_exhaustive()
    }
}

/// One addressable conversational entity.
#[derive(Debug, Clone)]
pub struct ConversationalAgent {
    pub name: String,
    pub kind: PersonaKind,
    pub instructions: String,
    pub greeting_instruction: String,
    pub tools: ToolSet,
    pub hooks: TurnHooks,
}

impl ConversationalAgent {
    /// Assemble an agent from already-resolved tools.
    ///
    /// The instructions only advertise capabilities that actually resolved.
    pub fn assemble(
        kind: PersonaKind,
        name: &str,
        context: &PersonaContext,
        catalog: &ToolCatalog,
        tools: ToolSet,
        hooks: TurnHooks,
    ) -> Result<Self> {
        let available = ToolCatalog::new(
            catalog
                .actions()
                .iter()
                .copied()
                .filter(|a| tools.contains(*a)),
        );
        let builder = PersonaInstructionBuilder::new(kind, name);
        let instructions = builder.build(context, &available)?;
        Ok(Self {
            name: name.to_string(),
            kind,
            instructions,
            greeting_instruction: builder.greeting_instruction(),
            tools,
            hooks,
        })
    }

    /// Resolve `catalog` through `provider`, then assemble.
    ///
    /// Actions that fail to resolve are left out; an empty tool set is fine.
    pub async fn resolve(
        kind: PersonaKind,
        name: &str,
        context: &PersonaContext,
        catalog: &ToolCatalog,
        provider: &dyn ActionProvider,
        hooks: TurnHooks,
    ) -> Result<Self> {
        // Validate before any provider traffic.
        context.validate()?;
        let tools = resolve_catalog(provider, catalog).await;
        Self::assemble(kind, name, context, catalog, tools, hooks)
    }

    pub fn normalize(&self, text: &str) -> String {
        (self.hooks.normalize)(text)
    }

    pub fn enhance(&self, reply: &str, is_greeting: bool) -> String {
        (self.hooks.enhance)(reply, is_greeting)
    }
}
