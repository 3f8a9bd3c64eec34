//! Settled-payment audit trail
//!
//! Append-only record of every settled payment. The unique constraint on
//! `external_reference` is the idempotency anchor: for a given provider
//! reference at most one completed transaction can ever exist, no matter
//! how many times the confirmation is redelivered.

use linkvault_shared::{AccountId, PlanId};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::EngineResult;

/// What a settled payment bought
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    Subscription,
    TopUp,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Subscription => write!(f, "subscription"),
            TransactionKind::TopUp => write!(f, "top-up"),
        }
    }
}

/// Which processor family delivered the confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Crypto,
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Crypto => write!(f, "crypto"),
        }
    }
}

/// A settled transaction row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub account_id: AccountId,
    pub amount_cents: i32,
    pub kind: String,
    pub payment_method: String,
    pub status: String,
    pub external_reference: String,
    pub plan_id: Option<PlanId>,
    pub credits_granted: Option<i32>,
    pub created_at: OffsetDateTime,
}

/// Fields for a new settled transaction
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub amount_cents: i32,
    pub kind: TransactionKind,
    pub payment_method: PaymentMethod,
    pub external_reference: String,
    pub plan_id: Option<PlanId>,
    pub credits_granted: Option<u32>,
}

/// Append-only transaction store
#[derive(Clone)]
pub struct TransactionStore {
    pool: PgPool,
}

impl TransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a completed transaction unless its external reference was
    /// already settled. Returns the new row id, or `None` on a duplicate.
    ///
    /// Runs against an explicit connection so settlement can pair it with
    /// the ledger mutation in one database transaction.
    pub(crate) async fn insert_once_on(
        conn: &mut PgConnection,
        new: &NewTransaction,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO transactions (account_id, amount_cents, kind, payment_method,
                                      status, external_reference, plan_id, credits_granted)
            VALUES ($1, $2, $3, $4, 'completed', $5, $6, $7)
            ON CONFLICT (external_reference) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(new.account_id)
        .bind(new.amount_cents)
        .bind(new.kind.to_string())
        .bind(new.payment_method.to_string())
        .bind(&new.external_reference)
        .bind(new.plan_id)
        .bind(new.credits_granted.map(|c| c as i32))
        .fetch_optional(conn)
        .await?;

        Ok(inserted.map(|(id,)| id))
    }

    /// Look up a settled transaction by its provider reference.
    pub async fn find_by_reference(
        &self,
        external_reference: &str,
    ) -> EngineResult<Option<TransactionRecord>> {
        let record: Option<TransactionRecord> = sqlx::query_as(
            "SELECT id, account_id, amount_cents, kind, payment_method, status,
                    external_reference, plan_id, credits_granted, created_at
             FROM transactions WHERE external_reference = $1",
        )
        .bind(external_reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Recent transactions for an account, newest first.
    pub async fn list_for_account(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> EngineResult<Vec<TransactionRecord>> {
        let records: Vec<TransactionRecord> = sqlx::query_as(
            "SELECT id, account_id, amount_cents, kind, payment_method, status,
                    external_reference, plan_id, credits_granted, created_at
             FROM transactions
             WHERE account_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Most recent completed subscription payment, if any.
    pub async fn latest_subscription(
        &self,
        account_id: AccountId,
    ) -> EngineResult<Option<TransactionRecord>> {
        let record: Option<TransactionRecord> = sqlx::query_as(
            "SELECT id, account_id, amount_cents, kind, payment_method, status,
                    external_reference, plan_id, credits_granted, created_at
             FROM transactions
             WHERE account_id = $1 AND kind = 'subscription' AND status = 'completed'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_kind_display() {
        assert_eq!(TransactionKind::Subscription.to_string(), "subscription");
        assert_eq!(TransactionKind::TopUp.to_string(), "top-up");
    }

    #[test]
    fn test_payment_method_display() {
        assert_eq!(PaymentMethod::Card.to_string(), "card");
        assert_eq!(PaymentMethod::Crypto.to_string(), "crypto");
    }

    #[test]
    fn test_kind_serde_matches_db_strings() {
        // The serialized form must match what lands in the `kind` column.
        assert_eq!(
            serde_json::to_value(TransactionKind::TopUp).unwrap(),
            serde_json::json!("top-up")
        );
        assert_eq!(
            serde_json::to_value(TransactionKind::Subscription).unwrap(),
            serde_json::json!("subscription")
        );
    }
}
