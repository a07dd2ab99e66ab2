use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// A feature whose environment is incomplete. Reported as `{error, details}`.
    #[error("{error}")]
    NotConfigured { error: String, details: String },
    /// An upstream provider answered with a non-success status.
    #[error("{error}")]
    Upstream {
        error: String,
        details: String,
        status: u16,
    },
    #[error("External dependency error: {0}")]
    External(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_configured(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self::NotConfigured {
            error: error.into(),
            details: details.into(),
        }
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::External(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::External(_) => StatusCode::BAD_GATEWAY,
            Self::NotConfigured { .. }
            | Self::Upstream { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            Self::NotConfigured { error, details } => ErrorBody {
                error,
                details: Some(details),
                status: None,
            },
            Self::Upstream {
                error,
                details,
                status,
            } => ErrorBody {
                error,
                details: Some(details),
                status: Some(status),
            },
            other => ErrorBody {
                error: other.to_string(),
                details: None,
                status: None,
            },
        };

        (status, Json(body)).into_response()
    }
}
