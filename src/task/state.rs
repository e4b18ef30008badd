use crate::{action::Action, task::HistoryEntry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
    Interrupted,
}

/// Inputs of the lifecycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Start,
    Succeed,
    Fail,
    Interrupt,
}

impl TaskStatus {
    /// Next status after `event`; events that do not apply leave it unchanged
    pub fn apply(self, event: TaskEvent) -> TaskStatus {
        use TaskEvent::*;
        use TaskStatus::*;

        match (self, event) {
            (_, Start) => Running,
            (Running, Succeed) => Success,
            (Running, Fail) => Error,
            (Running, Interrupt) => Interrupted,
            (status, _) => status,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Error | TaskStatus::Interrupted)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
            TaskStatus::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// What a running task is doing right now; diagnostic only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionStatus {
    #[default]
    Idle,
    AttachingControlSession,
    ResolvingKnowledge,
    CapturingPerception,
    GeneratingAction,
    AwaitingApproval,
    PerformingAction,
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum UserDecision {
    Approve,
    Reject,
}

impl std::str::FromStr for UserDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" | "yes" | "y" => Ok(UserDecision::Approve),
            "reject" | "rejected" | "no" | "n" => Ok(UserDecision::Reject),
            other => Err(format!("decision must be approve or reject, got `{}`", other)),
        }
    }
}

/// An action held at a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingApproval {
    pub proposed_action: Action,
    pub decision: Option<UserDecision>,
}

/// Observable state of the controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub action_status: ActionStatus,
    pub instructions: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub pending_approval: Option<PendingApproval>,
    /// 1-based index of the current iteration; 0 before the first
    pub iteration: usize,
    pub last_error: Option<String>,
    /// Retryable problems met along the way
    pub notices: Vec<String>,
}

impl TaskSnapshot {
    /// Fresh state for a task that is starting
    pub fn started(instructions: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Idle.apply(TaskEvent::Start),
            instructions: Some(instructions.into()),
            ..Default::default()
        }
    }
}
