//! Error taxonomy
//!
//! Only model-invocation and transport failures ever leave an agent loop.
//! Tool failures (execution, validation, ownership) are `ToolResult` envelopes
//! fed back to the model, and parse failures are recovered where they happen.

use std::time::Duration;

use crate::ai::retry::{is_retryable_status, IsRetryable};

/// The generative backend call itself failed (network, auth, quota).
#[derive(Debug, Clone)]
pub struct ModelError {
    pub message: String,
    pub status: Option<u16>,
    pub retry_after: Option<Duration>,
}

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(status) = self.status {
            write!(f, "HTTP {}: {}", status, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ModelError {}

impl IsRetryable for ModelError {
    fn is_retryable(&self) -> bool {
        match self.status {
            Some(status) => is_retryable_status(status),
            // Network errors without status codes are typically retryable
            None => {
                let lower = self.message.to_ascii_lowercase();
                lower.contains("timeout")
                    || lower.contains("timed out")
                    || lower.contains("connection")
                    || lower.contains("network")
            }
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        let mut model_err = ModelError::new(err.to_string());
        if err.is_timeout() {
            model_err.message = format!("request timed out: {}", err);
        }
        if let Some(status) = err.status() {
            model_err.status = Some(status.as_u16());
        }
        model_err
    }
}

/// Failures that end an agent turn and reach the user.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model invocation failed: {0}")]
    ModelInvocation(#[from] ModelError),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("transport error: {0}")]
    Transport(String),

    /// A sub-agent finished without the result its delegation needs.
    #[error("delegation failed: {0}")]
    Delegation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AgentError {
    /// Whether the client may resend the same user message.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::ModelInvocation(err) => err.is_retryable(),
            AgentError::Transport(_) => true,
            AgentError::Storage(_) | AgentError::Delegation(_) | AgentError::InvalidRequest(_) => false,
        }
    }

    /// Machine-readable kind for error frames.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ModelInvocation(_) => "model_invocation_failed",
            AgentError::Storage(_) => "storage_failed",
            AgentError::Transport(_) => "transport_failed",
            AgentError::Delegation(_) => "delegation_failed",
            AgentError::InvalidRequest(_) => "invalid_request",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = AgentError::from(ModelError::new("slow down").with_status(429));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "model_invocation_failed");
    }

    #[test]
    fn test_auth_failure_is_not_retryable() {
        let err = ModelError::new("invalid x-api-key").with_status(401);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "HTTP 401: invalid x-api-key");
    }

    #[test]
    fn test_connection_failure_without_status_is_retryable() {
        assert!(ModelError::new("connection reset by peer").is_retryable());
        assert!(!ModelError::new("malformed request body").is_retryable());
    }
}
