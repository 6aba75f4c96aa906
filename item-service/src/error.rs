use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rls_core::error::is_policy_rejection;
use rls_core::RlsError;
use serde::Serialize;
use thiserror::Error;

/// Application error taxonomy.
///
/// `NotFound`, `Forbidden`, and `ValidationError` are distinct variants with
/// distinct status codes and stable client-facing codes, so clients can tell
/// "not found", "validation failed", and "not yours" apart without parsing
/// messages. The two RLS variants cover the database refusing a statement
/// under a policy (`RlsDenied`) and the application-level ownership check
/// (`OwnershipViolation`).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Access denied by row security policy")]
    RlsDenied(#[source] sqlx::Error),

    #[error("Ownership violation: {0}")]
    OwnershipViolation(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code included in every error response.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::RlsDenied(_) => "RLS_ACCESS_DENIED",
            AppError::OwnershipViolation(_) => "RLS_OWNERSHIP_VIOLATION",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidToken(_) => "INVALID_TOKEN",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
            AppError::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) | AppError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_)
            | AppError::RlsDenied(_)
            | AppError::OwnershipViolation(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DatabaseError(_)
            | AppError::InternalError(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if is_policy_rejection(&err) {
            return AppError::RlsDenied(err);
        }
        match err {
            sqlx::Error::RowNotFound => {
                AppError::NotFound(anyhow::anyhow!("Record not found"))
            }
            _ => AppError::DatabaseError(anyhow::Error::new(err)),
        }
    }
}

impl From<RlsError> for AppError {
    fn from(err: RlsError) -> Self {
        match err {
            RlsError::Database(e) => AppError::from(e),
            other => AppError::InternalError(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            error_code: &'static str,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let status = self.status_code();
        let error_code = self.error_code();

        let (error, details) = match &self {
            AppError::ValidationError(err) => {
                ("Validation error".to_string(), Some(err.to_string()))
            }
            AppError::RlsDenied(_) | AppError::OwnershipViolation(_) => (
                "Access denied: You can only access your own data".to_string(),
                None,
            ),
            AppError::DatabaseError(_) | AppError::InternalError(_) | AppError::ConfigError(_) => {
                tracing::error!(error = %self, "Internal error");
                ("Internal server error".to_string(), None)
            }
            other => (other.to_string(), None),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                error_code,
                details,
            }),
        )
            .into_response()
    }
}
