//! Action provider contract and catalog resolution.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::ResolutionError;
use crate::tool::{InvocableTool, ToolSet};
use crate::types::{ToolAction, ToolCatalog};

/// External service that turns catalog actions into invocable tools.
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Provider name, for logging.
    fn name(&self) -> &str;

    /// Resolve one action. Failures are per action.
    async fn resolve(&self, action: ToolAction) -> Result<Arc<dyn InvocableTool>, ResolutionError>;
}

/// Resolve every action of `catalog` concurrently.
///
/// Actions that fail to resolve are logged and left out; the session
/// continues with the rest. An empty catalog yields an empty set.
pub async fn resolve_catalog(provider: &dyn ActionProvider, catalog: &ToolCatalog) -> ToolSet {
    let results = join_all(catalog.actions().iter().map(|a| provider.resolve(*a))).await;

    let mut tools = ToolSet::new();
    for result in results {
        match result {
            Ok(tool) => tools.insert(tool),
            Err(e) => tracing::warn!(
                provider = provider.name(),
                action = %e.action(),
                error = %e,
                "Action unavailable, continuing without it"
            ),
        }
    }

    tracing::info!(
        provider = provider.name(),
        requested = catalog.len(),
        resolved = tools.len(),
        "Resolved tool catalog"
    );
    tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_provider::StaticActionProvider;

    #[tokio::test]
    async fn test_resolve_catalog_skips_failures() {
        let provider = StaticActionProvider::echo_all().failing_on([ToolAction::SendEmail]);
        let catalog = ToolCatalog::new([ToolAction::SendEmail, ToolAction::FindEvent]);

        let tools = resolve_catalog(&provider, &catalog).await;
        assert_eq!(tools.actions(), vec![ToolAction::FindEvent]);
    }

    #[tokio::test]
    async fn test_resolve_empty_catalog() {
        let provider = StaticActionProvider::echo_all();
        let tools = resolve_catalog(&provider, &ToolCatalog::empty()).await;
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_full_catalog() {
        let provider = StaticActionProvider::echo_all();
        let tools = resolve_catalog(&provider, &ToolCatalog::calendar_assistant()).await;
        assert_eq!(tools.len(), 8);
    }

    #[tokio::test]
    async fn test_resolve_only_unregistered() {
        let provider = StaticActionProvider::new();
        let tools = resolve_catalog(&provider, &ToolCatalog::calendar_assistant()).await;
        assert!(tools.is_empty());
    }
}
