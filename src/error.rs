use crate::{auth::error::AuthError, database::DatabaseError};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced over HTTP
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("{message}")]
    BadRequest {
        message: String,
        details: Option<String>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Option<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
            details,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(err) => err.status(),
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(err) => err.code(),
            AppError::BadRequest { .. } => "INVALID_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHENTICATED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Config(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn public_message(&self) -> String {
        match self {
            // Storage and config internals stay in the logs
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<&str> {
        match self {
            AppError::Auth(err) => err.details(),
            AppError::BadRequest { details, .. } => details.as_deref(),
            _ => None,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request("Incorrect body structure", Some(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        }

        let mut error = json!({
            "message": self.public_message(),
            "code": self.code(),
        });
        if let Some(details) = self.details() {
            error["details"] = json!(details);
        }

        let body = Json(json!({
            "error": error,
            "success": false,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
