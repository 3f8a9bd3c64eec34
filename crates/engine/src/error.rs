//! Engine error types

use thiserror::Error;

use crate::password::PasswordError;

/// Errors produced by the link access and entitlement engine.
///
/// Everything except `Database` is an expected, caller-visible outcome the
/// UI layer branches on. `Database` is the transient infrastructure class:
/// safe to retry, and never to be confused with a business-rule refusal.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No plan selected for this account")]
    NoPlanSelected,

    #[error("{plan_name} plan limit of {links_limit} links reached and no credits remain")]
    QuotaExhausted { plan_name: String, links_limit: u32 },

    #[error("The {plan_name} plan does not allow file uploads")]
    UploadNotAllowed { plan_name: String },

    #[error("Expiration date exceeds the plan maximum of {max_days} days")]
    ExpirationTooFar { max_days: u32 },

    #[error("Only the link owner may perform this operation")]
    Forbidden,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Database error: {0}")]
    Database(String),
}

impl EngineError {
    /// Whether this error is transient infrastructure failure (retryable)
    /// rather than a business-rule refusal.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Database(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Database(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Database("connection reset".into()).is_transient());
        assert!(!EngineError::NoPlanSelected.is_transient());
        assert!(!EngineError::QuotaExhausted {
            plan_name: "Explorer".into(),
            links_limit: 5
        }
        .is_transient());
    }
}
