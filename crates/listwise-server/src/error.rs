//! API errors and their JSON bodies

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use listwise_core::AgentError;

/// API error response body
#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    /// Set for turn failures; the client may resend the same message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// A turn that failed before it could stream.
    Agent(AgentError),
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, String, Option<bool>) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND".into(), None),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST".into(), None),
            AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR".into(), None)
            }
            AppError::Agent(err) => {
                let status = match err {
                    AgentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    AgentError::ModelInvocation(_) if err.is_retryable() => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    AgentError::ModelInvocation(_) | AgentError::Transport(_) => {
                        StatusCode::BAD_GATEWAY
                    }
                    AgentError::Storage(_) | AgentError::Delegation(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.kind().to_ascii_uppercase(), Some(err.is_retryable()))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = self.parts();
        let message = match self {
            AppError::NotFound(msg) | AppError::BadRequest(msg) | AppError::Internal(msg) => msg,
            AppError::Agent(err) => err.to_string(),
        };
        (
            status,
            Json(ApiError {
                error: message,
                code,
                retryable,
            }),
        )
            .into_response()
    }
}

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        if !matches!(err, AgentError::InvalidRequest(_)) {
            tracing::error!(kind = err.kind(), "Turn error: {}", err);
        }
        AppError::Agent(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", err);
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listwise_core::ModelError;

    #[test]
    fn test_invalid_turn_is_bad_request() {
        let err = AppError::from(AgentError::InvalidRequest("no user message".into()));
        let (status, code, retryable) = err.parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "INVALID_REQUEST");
        assert_eq!(retryable, Some(false));
    }

    #[test]
    fn test_overloaded_model_is_retryable_unavailable() {
        let err = AppError::from(AgentError::ModelInvocation(
            ModelError::new("overloaded").with_status(529),
        ));
        let (status, code, retryable) = err.parts();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(code, "MODEL_INVOCATION_FAILED");
        assert_eq!(retryable, Some(true));
    }

    #[test]
    fn test_draft_errors_keep_plain_codes() {
        let response = AppError::NotFound("Draft d1 not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
