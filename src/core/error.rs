//! Error - Tipo di errore unico dell'applicazione
//!
//! Lo stesso `AppError` viene restituito dagli handler HTTP (come risposta JSON) e dal gateway
//! WebSocket (come evento `error` inviato solo alla sessione che ha generato l'operazione).

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

/// Categoria dell'errore, esposta al client anche sul canale live
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Unauthenticated,
    NotFound,
    Upstream,
    Internal,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: ErrorKind,
    status: StatusCode,
    message: &'static str,
    details: Option<String>,
}

impl AppError {
    pub fn new(kind: ErrorKind, status: StatusCode, message: &'static str) -> Self {
        Self {
            kind,
            status,
            message,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &'static str {
        self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    // Common error constructors
    pub fn validation(message: &'static str) -> Self {
        Self::new(ErrorKind::Validation, StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: &'static str) -> Self {
        Self::new(ErrorKind::Authorization, StatusCode::FORBIDDEN, message)
    }

    pub fn unauthorized(message: &'static str) -> Self {
        Self::new(ErrorKind::Unauthenticated, StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(ErrorKind::NotFound, StatusCode::NOT_FOUND, message)
    }

    pub fn upstream(message: &'static str) -> Self {
        Self::new(ErrorKind::Upstream, StatusCode::BAD_GATEWAY, message)
    }

    pub fn service_unavailable(message: &'static str) -> Self {
        Self::new(ErrorKind::Upstream, StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal_server_error(message: &'static str) -> Self {
        Self::new(
            ErrorKind::Internal,
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
        )
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{:?}: {} ({})", self.kind, self.message, details),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Resource not found"),

            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::service_unavailable("Message store unavailable")
            }

            sqlx::Error::Database(e) => Self::upstream("Message store error").with_details(e.to_string()),

            other => Self::internal_server_error("Internal server error").with_details(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::validation("Validation error").with_details(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        // 413 quando il body supera il limite di upload
        Self::new(ErrorKind::Validation, err.status(), "Malformed multipart body")
            .with_details(err.body_text())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation("Malformed event").with_details(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorResponse {
            error: self.message,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}
