//! MCP (Model Context Protocol) surface of the task controller
//!
//! Tools: `task_run`, `task_interrupt`, `task_status`, `task_decide`.

pub mod handler;
pub use handler::WandServer;

use crate::task::{TaskSnapshot, TaskStatus, UserDecision};
use rmcp::{
    ErrorData as McpError,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    tool, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Task run parameters
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunParams {
    /// What the agent should do, in plain language
    pub instructions: String,
}

/// Status parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatusParams {
    /// Include full prompts and raw model responses in the history (default: false)
    #[serde(default)]
    pub include_prompts: bool,
}

/// Checkpoint decision parameters
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecideParams {
    /// `approve` to perform the held action, `reject` to have the agent choose another
    pub decision: UserDecision,
}

fn text_result(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text.into())]))
}

/// Snapshot as pretty JSON, optionally without the bulky prompt text
fn render_snapshot(mut snapshot: TaskSnapshot, include_prompts: bool) -> Result<String, McpError> {
    if !include_prompts {
        for entry in &mut snapshot.history {
            entry.prompt.clear();
            entry.raw_response.clear();
        }
    }
    serde_json::to_string_pretty(&snapshot).map_err(|e| McpError::internal_error(e.to_string(), None))
}

#[tool_router]
impl WandServer {
    /// Start a task in the background
    #[tool(description = "Start a browser task described in natural language. Returns immediately; poll task_status.")]
    async fn task_run(&self, Parameters(params): Parameters<RunParams>) -> Result<CallToolResult, McpError> {
        if params.instructions.trim().is_empty() {
            return Err(McpError::invalid_params("instructions must not be empty", None));
        }
        if self.controller().status() == TaskStatus::Running {
            return Err(McpError::invalid_request("a task is already running", None));
        }

        let controller = self.controller().clone();
        let instructions = params.instructions.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.run_task(&instructions).await {
                log::error!("task failed: {}", e);
            }
        });

        text_result(format!("Started task: {}", params.instructions))
    }

    /// Interrupt the running task
    #[tool(description = "Interrupt the running browser task")]
    async fn task_interrupt(&self) -> Result<CallToolResult, McpError> {
        if self.controller().interrupt() {
            text_result("Task interrupted")
        } else {
            text_result(format!("No task running (status: {})", self.controller().status()))
        }
    }

    /// Report the controller state
    #[tool(description = "Get the status, current step, history and any action waiting for approval")]
    async fn task_status(&self, Parameters(params): Parameters<StatusParams>) -> Result<CallToolResult, McpError> {
        text_result(render_snapshot(self.controller().snapshot(), params.include_prompts)?)
    }

    /// Answer a safety checkpoint
    #[tool(description = "Approve or reject the action waiting at a safety checkpoint")]
    async fn task_decide(&self, Parameters(params): Parameters<DecideParams>) -> Result<CallToolResult, McpError> {
        if self.controller().set_user_decision(params.decision) {
            text_result(format!("Decision recorded: {:?}", params.decision))
        } else {
            Err(McpError::invalid_request("no action is waiting for approval", None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        action::{Action, Operation},
        task::{HistoryEntry, Outcome},
    };

    #[test]
    fn test_decide_params() {
        let params: DecideParams = serde_json::from_value(serde_json::json!({"decision": "reject"})).unwrap();
        assert_eq!(params.decision, UserDecision::Reject);
    }

    #[test]
    fn test_status_strips_prompts_by_default() {
        let mut snapshot = TaskSnapshot::started("t");
        snapshot.history.push(HistoryEntry::new(
            "a very long prompt",
            "{\"thought\":\"x\"}",
            Outcome::Action(Action::new("x", Operation::Wait)),
        ));

        let brief = render_snapshot(snapshot.clone(), false).unwrap();
        assert!(!brief.contains("a very long prompt"));
        assert!(brief.contains("\"thought\": \"x\""));

        let full = render_snapshot(snapshot, true).unwrap();
        assert!(full.contains("a very long prompt"));
    }
}
