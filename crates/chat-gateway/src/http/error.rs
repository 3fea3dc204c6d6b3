use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use chat_auth::ValidationError;
use chat_engine::error::EngineError;

/// Top-level error enum at the HTTP edge implementing the status-code
/// mapping from the error taxonomy (§7). Every other crate's typed error
/// funnels through here on its way out to a response.
#[derive(Debug)]
pub enum ApiError {
    AuthFailure(ValidationError),
    PermissionDenied,
    ServiceUnavailable,
    NotFound,
    Forbidden,
    Validation(String),
    BadRequest(String),
    Internal(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::AuthFailure(e)
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound => ApiError::NotFound,
            EngineError::Forbidden => ApiError::Forbidden,
            EngineError::Validation(msg) => ApiError::Validation(msg),
            EngineError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::AuthFailure(e) => (StatusCode::UNAUTHORIZED, e.to_string()),
            ApiError::PermissionDenied => (StatusCode::FORBIDDEN, "permission denied".to_string()),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "authorization service unavailable".to_string(),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
