use crate::{action::ParseError, llm::ProviderError};
use thiserror::Error;

/// Errors produced by the agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Failed to parse DOM snapshot: {0}")]
    DomParseFailed(String),

    /// The debugger session could not be attached or a remote call failed
    #[error("Control session error: {0}")]
    ControlSession(String),

    /// A label could not be resolved to an on-page target
    #[error("Grounding failed: {0}")]
    Grounding(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Invalid model response: {0}")]
    ResponseFormat(#[from] ParseError),

    #[error("Model query failed after {attempts} attempts: {last_error}")]
    QueryFailed { attempts: usize, last_error: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the error ends the running task
    pub fn is_fatal(&self) -> bool {
        match self {
            AgentError::Grounding(_) => false,
            AgentError::Provider(e) => !e.is_retryable(),
            _ => true,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AgentError>;
