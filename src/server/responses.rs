use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::error::WebhookError;

/// Error response body shared by all API errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    status_code: u16,
    code: &'static str,
    message: String,
}

/// HTTP face of [`WebhookError`]
#[derive(Debug)]
pub struct ApiError(pub WebhookError);

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            WebhookError::NotFound { .. } => StatusCode::NOT_FOUND,
            WebhookError::Validation(_) => StatusCode::BAD_REQUEST,
            WebhookError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebhookError::Disabled(_) => StatusCode::CONFLICT,
            WebhookError::Configuration(_)
            | WebhookError::Store(_)
            | WebhookError::Crypto(_)
            | WebhookError::Delivery { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::NOT_FOUND => "NOT_FOUND",
            StatusCode::BAD_REQUEST => "BAD_REQUEST",
            StatusCode::FORBIDDEN => "FORBIDDEN",
            StatusCode::CONFLICT => "CONFLICT",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = %self.0, "Request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let body = ErrorBody {
            status_code: status.as_u16(),
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
