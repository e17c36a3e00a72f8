use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use orchestrator_core::{ErrorKind, OrchestratorError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Orchestrator(err) => match err {
                OrchestratorError::TaskNotFound { .. } => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
                OrchestratorError::ModuleNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "MODULE_NOT_FOUND")
                }
                OrchestratorError::ChainNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "CHAIN_NOT_FOUND")
                }
                OrchestratorError::ExecutionNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "EXECUTION_NOT_FOUND")
                }
                OrchestratorError::ResultNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "RESULT_NOT_FOUND")
                }
                OrchestratorError::FileNotFound { .. } => (StatusCode::NOT_FOUND, "FILE_NOT_FOUND"),
                OrchestratorError::ModuleUnavailable { .. } => {
                    (StatusCode::CONFLICT, "MODULE_UNAVAILABLE")
                }
                other => match other.kind() {
                    ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                    ErrorKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                    ErrorKind::ExecutionFailure => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "EXECUTION_FAILURE")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                },
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
