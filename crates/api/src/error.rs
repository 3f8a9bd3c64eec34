//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use linkvault_engine::EngineError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Authentication required")]
    Unauthorized,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Insufficient permissions")]
    Forbidden,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Resource already exists")]
    Conflict(String),

    // Entitlement errors
    #[error("No plan selected. Please choose a plan first.")]
    NoPlanSelected,
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("Upload not allowed: {0}")]
    UploadNotAllowed(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Entitlement refusals carry a specific, actionable message;
            // they must never look like transient failures.
            ApiError::NoPlanSelected => {
                (StatusCode::BAD_REQUEST, "NO_PLAN_SELECTED", self.to_string())
            }
            ApiError::QuotaExhausted(msg) => (
                StatusCode::PAYMENT_REQUIRED,
                "QUOTA_EXHAUSTED",
                format!("{}. Upgrade your plan or buy credits.", msg),
            ),
            ApiError::UploadNotAllowed(msg) => {
                (StatusCode::PAYMENT_REQUIRED, "UPLOAD_NOT_ALLOWED", msg.clone())
            }

            // Internal: generic message, safe to retry
            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Something went wrong. Please try again.".to_string(),
            ),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => ApiError::NotFound,
            EngineError::NoPlanSelected => ApiError::NoPlanSelected,
            EngineError::QuotaExhausted { .. } => ApiError::QuotaExhausted(err.to_string()),
            EngineError::UploadNotAllowed { .. } => ApiError::UploadNotAllowed(err.to_string()),
            EngineError::ExpirationTooFar { .. } => ApiError::Validation(err.to_string()),
            EngineError::Forbidden => ApiError::Forbidden,
            EngineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            EngineError::Password(e) => {
                tracing::error!(error = %e, "Password hashing failure");
                ApiError::Internal
            }
            EngineError::Database(msg) => {
                tracing::error!(error = %msg, "Engine database error");
                ApiError::Database(msg)
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // PostgreSQL unique violation
                    if code == "23505" {
                        return ApiError::Conflict("Resource already exists".to_string());
                    }
                }
                ApiError::Database(db_err.to_string())
            }
            _ => ApiError::Database(err.to_string()),
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_refusal_keeps_plan_detail() {
        let err: ApiError = EngineError::QuotaExhausted {
            plan_name: "Explorer".to_string(),
            links_limit: 5,
        }
        .into();

        match err {
            ApiError::QuotaExhausted(msg) => {
                assert!(msg.contains("Explorer"));
                assert!(msg.contains('5'));
            }
            other => panic!("expected QuotaExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_transient_failure_maps_to_generic_500() {
        // A database outage must never surface as a business refusal.
        let err: ApiError = EngineError::Database("connection refused".to_string()).into();
        assert!(matches!(err, ApiError::Database(_)));
    }

    #[test]
    fn test_forbidden_and_no_plan_mapping() {
        assert!(matches!(
            ApiError::from(EngineError::Forbidden),
            ApiError::Forbidden
        ));
        assert!(matches!(
            ApiError::from(EngineError::NoPlanSelected),
            ApiError::NoPlanSelected
        ));
    }
}
