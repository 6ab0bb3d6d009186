//! Uniform error body: `{error, details?}` with 4xx/5xx status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// API error returned by every handler on failure.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            details: None,
        }
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: error.into(),
            details: None,
        }
    }

    pub fn conflict(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            error: error.into(),
            details: None,
        }
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.error });
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<tandem::StoreError> for ApiError {
    fn from(e: tandem::StoreError) -> Self {
        ApiError::internal(e.to_string())
    }
}

impl From<tandem_workspace::WorkspaceError> for ApiError {
    fn from(e: tandem_workspace::WorkspaceError) -> Self {
        match e {
            tandem_workspace::WorkspaceError::NotFound(_)
            | tandem_workspace::WorkspaceError::NotADirectory(_) => {
                ApiError::bad_request(e.to_string())
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_shape() {
        let err = ApiError::bad_request("missing model").with_details(json!({"field": "model"}));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error, "missing model");
        assert_eq!(err.details.unwrap()["field"], "model");
    }
}
