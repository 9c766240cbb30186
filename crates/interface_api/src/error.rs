//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use domain_billing::{BillingError, ErrorKind};

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Option<Vec<String>>,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) | ApiError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_type, message, details) = match self {
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized => ("unauthorized", "Unauthorized".to_string(), None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::Internal(msg) => ("internal_error", msg, None),
            ApiError::Configuration(msg) => ("configuration_error", msg, None),
            ApiError::Unavailable(msg) => ("service_unavailable", msg, None),
            ApiError::Validation { message, details } => ("validation_error", message, details),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Configuration => {
                error!(error = %message, "billing configuration problem");
                ApiError::Configuration(message)
            }
            ErrorKind::Input => ApiError::validation(message),
            ErrorKind::Concurrency => ApiError::Conflict(message),
            ErrorKind::NotFound => ApiError::NotFound(message),
            ErrorKind::Infrastructure => match &err {
                BillingError::Storage(port) if port.is_transient() => ApiError::Unavailable(message),
                _ => {
                    error!(error = %message, "storage failure");
                    ApiError::Internal(message)
                }
            },
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingPermission(permission) => ApiError::Forbidden(format!("missing permission {}", permission)),
            AuthError::InvalidToken | AuthError::TokenExpired | AuthError::InvalidSubject(_) => ApiError::Unauthorized,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        details.sort();

        ApiError::Validation {
            message: "request validation failed".to_string(),
            details: Some(details),
        }
    }
}
