//! Payment confirmation webhooks
//!
//! Both processors (card and cryptocurrency) deliver the same logical
//! confirmation; only the signature header differs. Signatures are verified
//! against the raw body before anything is parsed, and verification is
//! constant-time. Settlement itself is idempotent, so redeliveries are
//! acknowledged with 200 and change nothing.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use hmac::{Hmac, Mac};
use linkvault_engine::{PaymentMethod, SettlementOutcome, TransactionKind};
use linkvault_shared::PlanId;
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

type HmacSha256 = Hmac<Sha256>;

/// The provider-agnostic confirmation payload. Processor-specific envelope
/// translation happens in the processor integration before delivery here.
#[derive(Debug, Deserialize)]
pub struct PaymentConfirmation {
    pub account_id: Uuid,
    pub kind: TransactionKind,
    pub plan_id: Option<Uuid>,
    pub credits_granted: Option<u32>,
    pub amount_cents: i32,
    pub external_reference: String,
}

/// Verify a hex-encoded HMAC-SHA256 signature over the raw body.
fn verify_signature(secret: &str, body: &[u8], provided_hex: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // verify_slice compares in constant time
    mac.verify_slice(&provided).is_ok()
}

fn require_signature(
    headers: &HeaderMap,
    header_name: &str,
    secret: &str,
    body: &[u8],
) -> Result<(), ApiError> {
    if secret.is_empty() {
        tracing::error!(header = %header_name, "Webhook secret not configured");
        return Err(ApiError::ServiceUnavailable);
    }

    let provided = headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if !verify_signature(secret, body, provided) {
        tracing::warn!(header = %header_name, "Webhook signature verification failed");
        return Err(ApiError::Unauthorized);
    }

    Ok(())
}

/// Card processor confirmation endpoint
pub async fn card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    require_signature(
        &headers,
        "x-signature",
        &state.config.card_webhook_secret,
        &body,
    )?;
    settle(&state, &body, PaymentMethod::Card).await
}

/// Cryptocurrency processor confirmation endpoint
pub async fn crypto_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    require_signature(
        &headers,
        "x-cc-webhook-signature",
        &state.config.crypto_webhook_secret,
        &body,
    )?;
    settle(&state, &body, PaymentMethod::Crypto).await
}

async fn settle(
    state: &AppState,
    body: &[u8],
    method: PaymentMethod,
) -> ApiResult<Json<serde_json::Value>> {
    let confirmation: PaymentConfirmation = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid confirmation payload: {}", e)))?;

    let settlement = state.settlement();
    let account_id = confirmation.account_id.into();

    let outcome = match confirmation.kind {
        TransactionKind::Subscription => {
            let plan_id = confirmation.plan_id.ok_or_else(|| {
                ApiError::BadRequest("Subscription confirmation missing plan_id".to_string())
            })?;
            settlement
                .settle_subscription(
                    account_id,
                    PlanId::from(plan_id),
                    confirmation.amount_cents,
                    method,
                    &confirmation.external_reference,
                )
                .await?
        }
        TransactionKind::TopUp => {
            let credits = confirmation.credits_granted.ok_or_else(|| {
                ApiError::BadRequest("Top-up confirmation missing credits_granted".to_string())
            })?;
            settlement
                .settle_top_up(
                    account_id,
                    credits,
                    confirmation.amount_cents,
                    method,
                    &confirmation.external_reference,
                )
                .await?
        }
    };

    if outcome == SettlementOutcome::AlreadySettled {
        tracing::info!(
            external_reference = %confirmation.external_reference,
            "Acknowledging redelivered confirmation"
        );
    }

    Ok(Json(serde_json::json!({ "received": true })))
}
