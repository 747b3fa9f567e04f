use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use loom_ai::RuntimeError;
use serde_json::json;

/// JSON error returned before a stream starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl GatewayApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn runtime_failure(error: &RuntimeError) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            "agent_runtime_error",
            error.to_string(),
        )
    }
}

impl std::fmt::Display for GatewayApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for GatewayApiError {}

impl IntoResponse for GatewayApiError {
    fn into_response(self) -> Response {
        let error_type = if self.status.is_client_error() {
            "invalid_request_error"
        } else {
            "server_error"
        };
        (
            self.status,
            Json(json!({
                "error": {
                    "type": error_type,
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}
