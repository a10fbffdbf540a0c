//! HTTP action provider.
//!
//! Talks to a hosted action service that publishes one descriptor per action
//! and executes actions on the user's connected calendar and mail accounts.
//!
//! - `GET  {base}/actions/{name}` returns an [`ActionDescriptor`]
//! - `POST {base}/actions/{name}/execute` takes an [`ActionRequest`] and
//!   returns an [`ActionResponse`]

use std::sync::Arc;

use async_trait::async_trait;
use terminus_providers::ToolSpec;

use crate::error::{ExecutionError, ResolutionError};
use crate::provider::ActionProvider;
use crate::tool::InvocableTool;
use crate::types::{ActionDescriptor, ActionRequest, ActionResponse, ToolAction};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
struct Endpoint {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Endpoint {
    fn action_url(&self, action: ToolAction) -> String {
        format!("{}/actions/{}", self.base_url, action.name())
    }
}

/// Action provider backed by the hosted action service.
pub struct HttpActionProvider {
    endpoint: Endpoint,
}

impl HttpActionProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint {
                client: reqwest::Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
                api_key: api_key.into(),
            },
        }
    }
}

#[async_trait]
impl ActionProvider for HttpActionProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn resolve(&self, action: ToolAction) -> Result<Arc<dyn InvocableTool>, ResolutionError> {
        let provider_err = |reason: String| ResolutionError::Provider { action, reason };

        let response = self
            .endpoint
            .client
            .get(self.endpoint.action_url(action))
            .header(API_KEY_HEADER, &self.endpoint.api_key)
            .send()
            .await
            .map_err(|e| provider_err(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolutionError::Unavailable(action));
        }
        if !response.status().is_success() {
            return Err(provider_err(format!("status {}", response.status())));
        }

        let descriptor: ActionDescriptor = response
            .json()
            .await
            .map_err(|e| provider_err(e.to_string()))?;
        let spec = spec_from_descriptor(action, descriptor)?;

        tracing::debug!(action = %action, "Resolved remote action");
        Ok(Arc::new(HttpTool {
            action,
            spec,
            endpoint: self.endpoint.clone(),
        }))
    }
}

/// Validate a descriptor and turn it into the `ToolSpec` advertised to the model.
fn spec_from_descriptor(
    action: ToolAction,
    descriptor: ActionDescriptor,
) -> Result<ToolSpec, ResolutionError> {
    if descriptor.name != action.name() {
        return Err(ResolutionError::InvalidSchema {
            action,
            reason: format!("descriptor names {}", descriptor.name),
        });
    }
    if !descriptor.parameters.is_object() {
        return Err(ResolutionError::InvalidSchema {
            action,
            reason: "parameters is not an object".to_string(),
        });
    }
    let description = if descriptor.description.trim().is_empty() {
        action.capability().to_string()
    } else {
        descriptor.description
    };
    Ok(ToolSpec {
        name: descriptor.name,
        description,
        parameters: descriptor.parameters,
    })
}

struct HttpTool {
    action: ToolAction,
    spec: ToolSpec,
    endpoint: Endpoint,
}

#[async_trait]
impl InvocableTool for HttpTool {
    fn action(&self) -> ToolAction {
        self.action
    }

    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value, ExecutionError> {
        if !input.is_object() {
            return Err(ExecutionError::InvalidInput(
                "arguments must be a JSON object".to_string(),
            ));
        }

        let response = self
            .endpoint
            .client
            .post(format!("{}/execute", self.endpoint.action_url(self.action)))
            .header(API_KEY_HEADER, &self.endpoint.api_key)
            .json(&ActionRequest { input })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Failed(format!("status {}: {}", status, detail)));
        }

        let body: ActionResponse = response.json().await?;
        into_result(body)
    }
}

fn into_result(response: ActionResponse) -> Result<serde_json::Value, ExecutionError> {
    if response.successful {
        Ok(response.data)
    } else {
        Err(ExecutionError::Failed(
            response
                .error
                .unwrap_or_else(|| "action reported failure".to_string()),
        ))
    }
}
