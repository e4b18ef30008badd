//! # webwand
//!
//! An autonomous browser action agent driven over the Chrome DevTools Protocol (CDP).
//!
//! Given a task in plain language, webwand looks at the current page, asks a
//! language model for the next atomic action, checks it against the user's
//! safety checkpoints, performs it with real mouse and keyboard input, and
//! repeats until the model says the task is finished.
//!
//! ## Features
//!
//! - **Element grounding**: every actionable element on the page gets a short numeric label
//!   the model can refer to; labels are resolved back to screen coordinates at execution time
//! - **Vision and text perception**: annotated screenshots or simplified HTML
//! - **Safety checkpoints**: user rules that hold matching actions for human approval
//! - **Site knowledge**: per-host notes and labeling rules, built in and user supplied
//! - **Multiple providers**: OpenAI and Anthropic models behind one [`ModelClient`] trait
//! - **MCP Server**: run and steer tasks from any Model Context Protocol client
//!
//! ## Running a task
//!
//! ```bash
//! # One task from the command line, with a visible browser
//! cargo run --bin webwand -- run --headed --start-url https://example.com "Find the contact email"
//!
//! # As an MCP server over stdio
//! cargo run --bin webwand-mcp --features mcp-server
//! ```
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use webwand::{AgentConfig, BrowserSession, LaunchOptions, Settings, TaskController};
//!
//! # async fn run() -> webwand::Result<()> {
//! let session = Arc::new(BrowserSession::launch(LaunchOptions::default())?);
//! session.navigate("https://example.com")?;
//!
//! let tab = Arc::new(session.active_tab_handle());
//! let settings = Settings::load("settings.json")?;
//! let controller = TaskController::from_settings(tab, &settings, AgentConfig::default())?;
//!
//! let status = controller.run_task("Open the first link on the page").await?;
//! println!("task ended: {}", status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`browser`]: Browser session management and the [`TabHandle`] seam
//! - [`knowledge`]: Per-host notes and annotation rules
//! - [`dom`]: Page snapshots, element grounding and labels
//! - [`perception`]: Annotated screenshots or simplified HTML
//! - [`prompt`]: System message and user prompt
//! - [`llm`]: Model clients and provider error classification
//! - [`action`]: The action vocabulary and response parsing
//! - [`checkpoint`]: Human-approval rules
//! - [`executor`]: Actions to DevTools input events
//! - [`task`]: The task loop and its observable state
//! - [`error`]: Error types and result aliases
//! - [`mcp`]: **Model Context Protocol server** (requires `mcp-handler` feature)

pub mod action;
pub mod browser;
pub mod checkpoint;
pub mod config;
pub mod dom;
pub mod error;
pub mod executor;
pub mod knowledge;
pub mod llm;
pub mod perception;
pub mod prompt;
pub mod task;
pub mod utils;

#[cfg(feature = "mcp-handler")]
pub mod mcp;

pub use action::{Action, Operation, ParseError, ScrollDirection, parse_response};
pub use browser::{BrowserSession, ChromeTab, ConnectionOptions, LaunchOptions, TabHandle};
pub use checkpoint::{CheckpointGate, CheckpointRule};
pub use config::{AgentConfig, AgentMode, Settings};
pub use dom::{DomSnapshot, ElementNode, LabelMap, LabelRecord};
pub use error::{AgentError, Result};
pub use knowledge::{AnnotationRule, Knowledge, KnowledgeResolver};
pub use llm::{ModelClient, ModelRequest, ModelResponse, ProviderError};
pub use task::{TaskController, TaskSnapshot, TaskStatus, UserDecision};

#[cfg(feature = "mcp-handler")]
pub use mcp::WandServer;
#[cfg(feature = "mcp-handler")]
pub use rmcp::ServiceExt;
