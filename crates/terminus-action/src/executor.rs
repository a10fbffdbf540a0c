//! Tool call execution.
//!
//! Every call produces a [`ToolCallRecord`]. Unknown tools, invalid input,
//! provider errors and timeouts are all folded into a failed outcome so the
//! model can explain them to the user.

use std::time::{Duration, Instant};

use futures::future::join_all;
use terminus_core::{ToolCallRecord, ToolOutcome};
use terminus_providers::ToolCallRequest;

use crate::error::ExecutionError;
use crate::tool::{InvocableTool, ToolSet};

const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Run one tool call under `timeout`.
///
/// Read-only actions get a single retry on failure. Mutating actions are run
/// at most once.
pub async fn execute_call(
    tools: &ToolSet,
    call: &ToolCallRequest,
    timeout: Duration,
) -> ToolCallRecord {
    let started = Instant::now();

    let result = match tools.get(&call.name) {
        None => Err(ExecutionError::UnknownTool(call.name.clone())),
        Some(tool) => {
            match tokio::time::timeout(timeout, invoke_with_retry(tool.as_ref(), call)).await {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Timeout(timeout.as_secs())),
            }
        }
    };

    let outcome = match result {
        Ok(value) => ToolOutcome::Success(value),
        Err(e) => {
            tracing::warn!(action = %call.name, call_id = %call.id, error = %e, "Tool call failed");
            ToolOutcome::Failure(e.to_string())
        }
    };

    ToolCallRecord {
        call_id: call.id.clone(),
        action_name: call.name.clone(),
        input: call.arguments.clone(),
        outcome,
        duration: started.elapsed(),
    }
}

/// Run a batch of tool calls concurrently. Records come back in call order.
pub async fn execute_calls(
    tools: &ToolSet,
    calls: &[ToolCallRequest],
    timeout: Duration,
) -> Vec<ToolCallRecord> {
    join_all(calls.iter().map(|call| execute_call(tools, call, timeout))).await
}

async fn invoke_with_retry(
    tool: &dyn InvocableTool,
    call: &ToolCallRequest,
) -> Result<serde_json::Value, ExecutionError> {
    match tool.invoke(call.arguments.clone()).await {
        Ok(value) => Ok(value),
        Err(first_err) if tool.action().is_mutating() => Err(first_err),
        Err(first_err) => {
            tracing::debug!(action = %call.name, error = %first_err, "Retrying tool call");
            tokio::time::sleep(RETRY_DELAY).await;
            tool.invoke(call.arguments.clone()).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FnTool;
    use crate::types::ToolAction;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn call(name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: json!({"q": "standup"}),
        }
    }

    fn counting_tool(action: ToolAction, fail_first: usize) -> (Arc<AtomicUsize>, ToolSet) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let tool = FnTool::new(action, move |_| {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n < fail_first {
                Err(ExecutionError::Failed("flaky".to_string()))
            } else {
                Ok(json!({"attempt": n + 1}))
            }
        });
        let mut set = ToolSet::new();
        set.insert(Arc::new(tool));
        (attempts, set)
    }

    #[tokio::test]
    async fn test_successful_call() {
        let (_, tools) = counting_tool(ToolAction::FindEvent, 0);
        let record = execute_call(&tools, &call("GOOGLECALENDAR_FIND_EVENT"), Duration::from_secs(1)).await;
        assert!(record.succeeded());
        assert_eq!(record.call_id, "call_1");
        assert_eq!(record.input["q"], "standup");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_failure() {
        let tools = ToolSet::new();
        let record = execute_call(&tools, &call("GMAIL_SEND_EMAIL"), Duration::from_secs(1)).await;
        assert!(!record.succeeded());
        assert!(record.to_model_content().contains("Tool not available"));
    }

    #[tokio::test]
    async fn test_read_only_action_retries_once() {
        let (attempts, tools) = counting_tool(ToolAction::FindEvent, 1);
        let record = execute_call(&tools, &call("GOOGLECALENDAR_FIND_EVENT"), Duration::from_secs(1)).await;
        assert!(record.succeeded());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_only_action_gives_up_after_retry() {
        let (attempts, tools) = counting_tool(ToolAction::FindEvent, 5);
        let record = execute_call(&tools, &call("GOOGLECALENDAR_FIND_EVENT"), Duration::from_secs(1)).await;
        assert!(!record.succeeded());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mutating_action_never_retried() {
        let (attempts, tools) = counting_tool(ToolAction::SendEmail, 1);
        let record = execute_call(&tools, &call("GMAIL_SEND_EMAIL"), Duration::from_secs(1)).await;
        assert!(!record.succeeded());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(record.to_model_content(), r#"{"error":"Tool failed: flaky"}"#);
    }

    struct SlowTool {
        spec: terminus_providers::ToolSpec,
    }

    #[async_trait::async_trait]
    impl InvocableTool for SlowTool {
        fn action(&self) -> ToolAction {
            ToolAction::CreateEvent
        }
        fn spec(&self) -> &terminus_providers::ToolSpec {
            &self.spec
        }
        async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value, ExecutionError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failure() {
        let mut tools = ToolSet::new();
        tools.insert(Arc::new(SlowTool {
            spec: terminus_providers::ToolSpec {
                name: "GOOGLECALENDAR_CREATE_EVENT".to_string(),
                description: String::new(),
                parameters: json!({}),
            },
        }));
        let record = execute_call(&tools, &call("GOOGLECALENDAR_CREATE_EVENT"), Duration::from_secs(2)).await;
        assert_eq!(record.outcome, ToolOutcome::Failure("Tool timed out after 2 seconds".to_string()));
    }

    #[tokio::test]
    async fn test_execute_calls_keeps_order() {
        let (_, mut tools) = counting_tool(ToolAction::FindEvent, 0);
        tools.insert(Arc::new(FnTool::new(ToolAction::ListCalendars, |_| Ok(json!(["primary"])))));
        let calls = vec![
            call("GOOGLECALENDAR_LIST_CALENDARS"),
            call("GMAIL_SEND_EMAIL"),
            call("GOOGLECALENDAR_FIND_EVENT"),
        ];
        let records = execute_calls(&tools, &calls, Duration::from_secs(1)).await;
        let names: Vec<&str> = records.iter().map(|r| r.action_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["GOOGLECALENDAR_LIST_CALENDARS", "GMAIL_SEND_EMAIL", "GOOGLECALENDAR_FIND_EVENT"]
        );
        assert!(records[0].succeeded());
        assert!(!records[1].succeeded());
        assert!(records[2].succeeded());
    }
}
