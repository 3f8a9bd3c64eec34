//! Request identity
//!
//! Session tokens are issued by the external auth provider. This module only
//! verifies the signature and lifts the account id out of the claims; no
//! authentication happens in this service.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use linkvault_shared::AccountId;
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Claims we care about from the provider's token
#[derive(Debug, Deserialize)]
struct Claims {
    /// Account id
    sub: Uuid,
    #[allow(dead_code)]
    exp: usize,
}

/// The verified identity attached to authenticated requests
#[derive(Debug, Clone, Copy)]
pub struct AuthAccount {
    pub account_id: AccountId,
}

/// Middleware: require a valid bearer token and attach [`AuthAccount`].
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let account_id = verify_token(token, &state.config.jwt_secret)?;

    request.extensions_mut().insert(AuthAccount { account_id });
    Ok(next.run(request).await)
}

/// Verify a token and extract the account id.
pub fn verify_token(token: &str, secret: &str) -> Result<AccountId, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Token verification failed");
        ApiError::InvalidToken
    })?;

    Ok(AccountId::from(data.claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: Uuid,
        exp: usize,
    }

    const SECRET: &str = "test-jwt-secret-must-be-at-least-32-characters-long";

    fn issue(sub: Uuid, exp: usize, secret: &str) -> String {
        encode(
            &Header::default(),
            &TestClaims { sub, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> usize {
        (time::OffsetDateTime::now_utc() + time::Duration::hours(1)).unix_timestamp() as usize
    }

    #[test]
    fn test_valid_token_yields_account_id() {
        let sub = Uuid::new_v4();
        let token = issue(sub, future_exp(), SECRET);

        let account_id = verify_token(&token, SECRET).expect("token should verify");
        assert_eq!(account_id, AccountId::from(sub));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue(Uuid::new_v4(), future_exp(), SECRET);
        let result = verify_token(&token, "another-secret-also-32-characters-xx");
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let past = (time::OffsetDateTime::now_utc() - time::Duration::hours(2)).unix_timestamp();
        let token = issue(Uuid::new_v4(), past as usize, SECRET);
        let result = verify_token(&token, SECRET);
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }
}
