use crate::executor::ExecutorError;
use crate::store::StoreError;
use axum::Json;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::ZapNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Executor(ExecutorError::ZapNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Executor(ExecutorError::InvalidZap(_)) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Executor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        let message = match &self {
            ApiError::Store(StoreError::ZapNotFound(_)) => "Zap not found".to_string(),
            other => other.to_string(),
        };
        let body = json!({
            "status": "error",
            "success": false,
            "message": message,
            "timestamp": Utc::now(),
        });
        (status, Json(body)).into_response()
    }
}

/// Parses a request body leniently: an empty body is an empty object.
pub fn json_body(bytes: &Bytes) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}
