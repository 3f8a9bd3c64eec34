//! Payment Settlement Handler
//!
//! Converts a confirmed payment event into ledger state, exactly once per
//! provider reference. Providers redeliver confirmations; the idempotency
//! check and the ledger mutation run in one database transaction, so a
//! replay can never double-apply and a failed settlement leaves nothing
//! behind for the provider's retry to trip over. Failing a settlement is
//! always preferred over double-crediting.

use linkvault_shared::{AccountId, PlanId};
use sqlx::PgPool;

use crate::entitlement::EntitlementService;
use crate::error::{EngineError, EngineResult};
use crate::plans::PlanCatalog;
use crate::transactions::{NewTransaction, PaymentMethod, TransactionKind, TransactionStore};

/// What settling a confirmation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// First delivery: ledger mutated, transaction recorded.
    Applied,
    /// Redelivery of an already-settled reference: no-op.
    AlreadySettled,
}

/// Settlement service
#[derive(Clone)]
pub struct SettlementService {
    pool: PgPool,
    plans: PlanCatalog,
}

impl SettlementService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            plans: PlanCatalog::new(pool.clone()),
            pool,
        }
    }

    /// Apply a confirmed subscription payment: activate the plan and record
    /// the transaction, atomically and at most once per `external_reference`.
    pub async fn settle_subscription(
        &self,
        account_id: AccountId,
        plan_id: PlanId,
        amount_cents: i32,
        payment_method: PaymentMethod,
        external_reference: &str,
    ) -> EngineResult<SettlementOutcome> {
        if external_reference.is_empty() {
            return Err(EngineError::InvalidInput(
                "Settlement requires a provider reference".to_string(),
            ));
        }

        // Reject unknown plans before touching the ledger.
        self.plans.get_plan(plan_id).await?;

        let mut tx = self.pool.begin().await?;

        let inserted = TransactionStore::insert_once_on(
            &mut tx,
            &NewTransaction {
                account_id,
                amount_cents,
                kind: TransactionKind::Subscription,
                payment_method,
                external_reference: external_reference.to_string(),
                plan_id: Some(plan_id),
                credits_granted: None,
            },
        )
        .await?;

        if inserted.is_none() {
            tracing::info!(
                account_id = %account_id,
                external_reference = %external_reference,
                "Subscription confirmation redelivered; already settled"
            );
            return Ok(SettlementOutcome::AlreadySettled);
        }

        EntitlementService::apply_plan_selection_on(&mut tx, account_id, plan_id).await?;

        tx.commit().await?;

        tracing::info!(
            account_id = %account_id,
            plan_id = %plan_id,
            amount_cents = amount_cents,
            payment_method = %payment_method,
            external_reference = %external_reference,
            "Subscription payment settled"
        );
        Ok(SettlementOutcome::Applied)
    }

    /// Apply a confirmed credit top-up: grant the credits and record the
    /// transaction, atomically and at most once per `external_reference`.
    pub async fn settle_top_up(
        &self,
        account_id: AccountId,
        credits_granted: u32,
        amount_cents: i32,
        payment_method: PaymentMethod,
        external_reference: &str,
    ) -> EngineResult<SettlementOutcome> {
        if external_reference.is_empty() {
            return Err(EngineError::InvalidInput(
                "Settlement requires a provider reference".to_string(),
            ));
        }
        if credits_granted == 0 {
            return Err(EngineError::InvalidInput(
                "Top-up must grant at least one credit".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let inserted = TransactionStore::insert_once_on(
            &mut tx,
            &NewTransaction {
                account_id,
                amount_cents,
                kind: TransactionKind::TopUp,
                payment_method,
                external_reference: external_reference.to_string(),
                plan_id: None,
                credits_granted: Some(credits_granted),
            },
        )
        .await?;

        if inserted.is_none() {
            tracing::info!(
                account_id = %account_id,
                external_reference = %external_reference,
                "Top-up confirmation redelivered; already settled"
            );
            return Ok(SettlementOutcome::AlreadySettled);
        }

        EntitlementService::add_credits_on(&mut tx, account_id, credits_granted).await?;

        tx.commit().await?;

        tracing::info!(
            account_id = %account_id,
            credits_granted = credits_granted,
            amount_cents = amount_cents,
            payment_method = %payment_method,
            external_reference = %external_reference,
            "Credit top-up settled"
        );
        Ok(SettlementOutcome::Applied)
    }

    /// Select a free plan. No money moves, so no external payment and no
    /// transaction record: just an immediate, synchronous plan selection.
    pub async fn select_free_plan(
        &self,
        account_id: AccountId,
        plan_id: PlanId,
    ) -> EngineResult<()> {
        let plan = self.plans.get_plan(plan_id).await?;

        if !plan.is_free() {
            return Err(EngineError::InvalidInput(format!(
                "Plan {} requires payment",
                plan.name
            )));
        }

        let mut conn = self.pool.acquire().await?;
        EntitlementService::apply_plan_selection_on(&mut conn, account_id, plan_id).await?;

        tracing::info!(account_id = %account_id, plan = %plan.name, "Free plan selected");
        Ok(())
    }
}
