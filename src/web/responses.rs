use axum::{Json, http::StatusCode};
use serde::Serialize;

use crate::reviews::ValidationErrors;

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize, Clone)]
pub struct ApiSuccess<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiSuccess<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Canonical JSON payload for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
            details: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_detail(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.details.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
        self
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

pub type ApiResult<T> = Result<(StatusCode, Json<ApiSuccess<T>>), (StatusCode, Json<ApiError>)>;

/// Helper for handlers that need to return `(StatusCode, Json<ApiError>)`.
pub fn json_error(status: StatusCode, error: ApiError) -> (StatusCode, Json<ApiError>) {
    (status, Json(error))
}

/// 400 with one detail per invalid field.
pub fn validation_failed(errors: &ValidationErrors) -> (StatusCode, Json<ApiError>) {
    let body = errors
        .errors()
        .iter()
        .fold(ApiError::new("Validation failed"), |body, err| {
            body.with_detail(err.field(), err.to_string())
        });
    json_error(StatusCode::BAD_REQUEST, body)
}

/// Generic 500 that never leaks internal detail.
pub fn try_again_later(error: &str, action: &str) -> (StatusCode, Json<ApiError>) {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        ApiError::new(error).with_message(format!(
            "An error occurred while {action}. Please try again later."
        )),
    )
}
