//! The closed action vocabulary the model chooses from.

mod parse;

pub use parse::{ParseError, extract_json_blocks, parse_response};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Top => "top",
            ScrollDirection::Bottom => "bottom",
        }
    }
}

impl std::str::FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "top" => Ok(ScrollDirection::Top),
            "bottom" => Ok(ScrollDirection::Bottom),
            other => Err(format!("scroll value must be up, down, top or bottom, got `{}`", other)),
        }
    }
}

/// One atomic step against the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "name", content = "args", rename_all = "camelCase")]
pub enum Operation {
    /// Click on an element with the label on the annotation
    Click { label: String },
    /// Focus on and set the value of an input element with the label on the annotation
    SetValue { label: String, value: String },
    /// Set the value of an input element and press Enter
    SetValueAndEnter { label: String, value: String },
    /// Scroll half a window up or down, or jump to the top or bottom
    Scroll { value: ScrollDirection },
    /// Wait before the next action, useful while the page is loading
    Wait,
    /// Open a URL in the current tab
    Navigate { url: String },
    /// The task is finished
    Finish,
    /// The task cannot be completed
    Fail,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Click { .. } => "click",
            Operation::SetValue { .. } => "setValue",
            Operation::SetValueAndEnter { .. } => "setValueAndEnter",
            Operation::Scroll { .. } => "scroll",
            Operation::Wait => "wait",
            Operation::Navigate { .. } => "navigate",
            Operation::Finish => "finish",
            Operation::Fail => "fail",
        }
    }

    /// `finish` and `fail` end the task
    pub fn is_terminal(&self) -> bool {
        matches!(self, Operation::Finish | Operation::Fail)
    }

    /// Label targeted by the operation, if any
    pub fn label(&self) -> Option<&str> {
        match self {
            Operation::Click { label } | Operation::SetValue { label, .. } | Operation::SetValueAndEnter { label, .. } => {
                Some(label)
            }
            _ => None,
        }
    }
}

/// A parsed model decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    pub thought: String,
    pub operation: Operation,
    /// Short sentence for the user; never spoken by this crate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
}

impl Action {
    pub fn new(thought: impl Into<String>, operation: Operation) -> Self {
        Self { thought: thought.into(), operation, speak: None }
    }

    pub fn is_terminal(&self) -> bool {
        self.operation.is_terminal()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation = serde_json::to_string(&self.operation).map_err(|_| fmt::Error)?;
        write!(f, "Thought: {}\nAction:{}", self.thought, operation)
    }
}

/// The JSON envelope the model must answer with
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResponseEnvelope {
    /// Reasoning behind the chosen action
    pub thought: String,
    pub action: Operation,
    /// Optional short status message for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speak: Option<String>,
}

/// Prompt-facing description of one operation
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub args: &'static [&'static str],
}

const VISION_TOOLS: &[ToolSpec] = &[
    ToolSpec { name: "click", description: "Click on an element with the label on the annotation.", args: &["label"] },
    ToolSpec {
        name: "setValue",
        description: "Focus on and set the value of an input element with the label on the annotation.",
        args: &["label", "value"],
    },
    ToolSpec {
        name: "setValueAndEnter",
        description: "Like setValue, and then press Enter. Use this to submit search boxes and single-field forms.",
        args: &["label", "value"],
    },
    ToolSpec {
        name: "scroll",
        description: "Scroll the page to see the other parts. Use \"up\" or \"down\" to scroll half the height of the window. Use \"top\" or \"bottom\" to quickly scroll to the top or bottom of the page.",
        args: &["value"],
    },
    ToolSpec { name: "wait", description: "Wait for 3 seconds before the next action. Useful when the page is loading.", args: &[] },
    ToolSpec { name: "navigate", description: "Open the given URL in the current tab.", args: &["url"] },
    ToolSpec { name: "finish", description: "Indicate the task is finished.", args: &[] },
    ToolSpec { name: "fail", description: "Indicate that you are unable to complete the task.", args: &[] },
];

/// Every operation the model may choose
pub fn tool_catalog() -> &'static [ToolSpec] {
    VISION_TOOLS
}

/// Operation names, in catalog order
pub fn operation_names() -> Vec<&'static str> {
    VISION_TOOLS.iter().map(|t| t.name).collect()
}

/// The catalog as plain text for the system prompt
pub fn tool_descriptions() -> String {
    VISION_TOOLS
        .iter()
        .map(|tool| {
            let mut text = format!("Name: {}\nDescription: {}\n", tool.name, tool.description);
            if tool.args.is_empty() {
                text.push_str("No arguments.\n");
            } else {
                text.push_str("Arguments:\n");
                for arg in tool.args {
                    text.push_str(&format!("  - {} (string)\n", arg));
                }
            }
            text
        })
        .collect::<Vec<_>>()
        .join("\n")
}
