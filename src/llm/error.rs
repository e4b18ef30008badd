use thiserror::Error;

/// A failed model request, classified by whether trying again can help
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// 401 / 403
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 400 / 404 / 422
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 500
    #[error("Provider internal error: {0}")]
    Server(String),

    #[error("Unsupported model `{0}`")]
    UnsupportedModel(String),

    #[error("No API key configured for {0}")]
    MissingApiKey(String),

    /// 429 / 502 / 503 / 504 / 529
    #[error("Provider unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Connect, DNS or timeout failure before a response arrived
    #[error("Connection error: {0}")]
    Connectivity(String),

    /// Anything not classified above, including malformed response bodies
    #[error("Unexpected provider error: {0}")]
    Unexpected(String),
}

impl ProviderError {
    /// Whether the request may succeed when repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Auth(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::Server(_)
            | ProviderError::UnsupportedModel(_)
            | ProviderError::MissingApiKey(_) => false,
            ProviderError::Unavailable { .. } | ProviderError::Connectivity(_) | ProviderError::Unexpected(_) => true,
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            401 | 403 => ProviderError::Auth(message),
            400 | 404 | 422 => ProviderError::InvalidRequest(message),
            500 => ProviderError::Server(message),
            429 | 502 | 503 | 504 | 529 => ProviderError::Unavailable { status, message },
            _ => ProviderError::Unexpected(format!("HTTP {}: {}", status, message)),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            ProviderError::Connectivity(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::from_status(status.as_u16(), e.to_string())
        } else {
            ProviderError::Unexpected(e.to_string())
        }
    }
}
