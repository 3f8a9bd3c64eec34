//! Entitlement Ledger
//!
//! Single source of truth for what an account may spend: the active plan,
//! links already created this billing cycle, and the purchased credit
//! balance. Every counter mutation is a single guarded SQL statement so
//! concurrent requests for the same account can never oversell a slot or
//! drive a counter negative.

use linkvault_shared::{AccountId, PlanId};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;

use crate::error::{EngineError, EngineResult};
use crate::plans::{LinksLimit, Plan};

/// Where a link creation is funded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundingSource {
    /// Counted against the plan's per-cycle quota (or free under unlimited).
    Plan,
    /// Paid for with one purchased credit.
    Credit,
}

impl std::fmt::Display for FundingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FundingSource::Plan => write!(f, "plan"),
            FundingSource::Credit => write!(f, "credit"),
        }
    }
}

/// Outcome of the funding decision for one link creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingDecision {
    /// Fund from plan quota. `consumes_slot` is false under unlimited plans.
    Plan { consumes_slot: bool },
    /// Fund by spending one credit.
    Credit,
    /// Quota reached and no credits remain.
    Exhausted,
}

impl FundingDecision {
    pub fn source(self) -> Option<FundingSource> {
        match self {
            FundingDecision::Plan { .. } => Some(FundingSource::Plan),
            FundingDecision::Credit => Some(FundingSource::Credit),
            FundingDecision::Exhausted => None,
        }
    }
}

/// The funding rule, as a pure function.
///
/// Plan quota is consumed before credits; unlimited plans never touch
/// counters. [`EntitlementService::reserve_link_slot`] implements exactly
/// this decision with guarded atomic updates; keeping the rule pure here
/// makes it deterministic and directly testable.
pub fn decide_funding(limit: LinksLimit, links_created: u32, credit_balance: u32) -> FundingDecision {
    match limit {
        LinksLimit::Unlimited => FundingDecision::Plan {
            consumes_slot: false,
        },
        LinksLimit::Limited(_) if limit.allows(links_created) => FundingDecision::Plan {
            consumes_slot: true,
        },
        LinksLimit::Limited(_) if credit_balance > 0 => FundingDecision::Credit,
        LinksLimit::Limited(_) => FundingDecision::Exhausted,
    }
}

/// An account's entitlement row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntitlement {
    pub account_id: AccountId,
    pub plan_id: Option<PlanId>,
    pub links_created_in_cycle: u32,
    pub credit_balance: u32,
    pub billing_cycle_start: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for AccountEntitlement {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let links_created: i32 = row.try_get("links_created_in_cycle")?;
        let credit_balance: i32 = row.try_get("credit_balance")?;
        Ok(Self {
            account_id: row.try_get("account_id")?,
            plan_id: row.try_get("plan_id")?,
            links_created_in_cycle: links_created.max(0) as u32,
            credit_balance: credit_balance.max(0) as u32,
            billing_cycle_start: row.try_get("billing_cycle_start")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Ledger service
#[derive(Clone)]
pub struct EntitlementService {
    pool: PgPool,
}

impl EntitlementService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch an account's entitlement. `NotFound` means the account has
    /// never selected a plan (onboarding incomplete).
    pub async fn get_entitlement(&self, account_id: AccountId) -> EngineResult<AccountEntitlement> {
        let row: Option<AccountEntitlement> = sqlx::query_as(
            "SELECT account_id, plan_id, links_created_in_cycle, credit_balance,
                    billing_cycle_start, updated_at
             FROM account_entitlements WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| EngineError::NotFound(format!("No entitlement for account {}", account_id)))
    }

    /// Fetch the entitlement together with its plan in one round trip.
    /// `NoPlanSelected` when the account has no row or no plan yet.
    pub async fn get_entitlement_with_plan(
        &self,
        account_id: AccountId,
    ) -> EngineResult<(AccountEntitlement, Plan)> {
        let row: Option<EntitlementWithPlanRow> = sqlx::query_as(
            "SELECT e.account_id, e.plan_id, e.links_created_in_cycle, e.credit_balance,
                    e.billing_cycle_start, e.updated_at,
                    p.id AS p_id, p.name AS p_name, p.description AS p_description,
                    p.price_cents AS p_price_cents, p.links_limit AS p_links_limit,
                    p.max_expiration_days AS p_max_expiration_days,
                    p.created_at AS p_created_at, p.updated_at AS p_updated_at
             FROM account_entitlements e
             LEFT JOIN plans p ON p.id = e.plan_id
             WHERE e.account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let plan = r.plan.ok_or(EngineError::NoPlanSelected)?;
                Ok((r.entitlement, plan))
            }
            None => Err(EngineError::NoPlanSelected),
        }
    }

    /// Select a plan for an account.
    ///
    /// Stamps `billing_cycle_start = now()` and never resets
    /// `links_created_in_cycle`: switching plans does not refund quota usage,
    /// and re-selecting the same plan just restamps the cycle start.
    pub async fn apply_plan_selection(
        &self,
        account_id: AccountId,
        plan_id: PlanId,
    ) -> EngineResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::apply_plan_selection_on(&mut conn, account_id, plan_id).await
    }

    /// Plan-selection upsert against an explicit connection, so settlement
    /// can run it inside its idempotency transaction.
    pub(crate) async fn apply_plan_selection_on(
        conn: &mut PgConnection,
        account_id: AccountId,
        plan_id: PlanId,
    ) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO account_entitlements (account_id, plan_id, billing_cycle_start, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (account_id) DO UPDATE
            SET plan_id = EXCLUDED.plan_id,
                billing_cycle_start = NOW(),
                updated_at = NOW()
            "#,
        )
        .bind(account_id)
        .bind(plan_id)
        .execute(conn)
        .await?;

        tracing::info!(account_id = %account_id, plan_id = %plan_id, "Plan selection applied");
        Ok(())
    }

    /// Reserve one link-creation slot for the account.
    ///
    /// The decision ([`decide_funding`]) is enforced with guarded atomic
    /// updates rather than a read-then-write: two simultaneous reservations
    /// can never both consume the last quota slot or the last credit.
    pub async fn reserve_link_slot(&self, account_id: AccountId) -> EngineResult<FundingSource> {
        // One read for plan identity and the exhaustion message; the guarded
        // updates below are what actually arbitrate under concurrency.
        let (_, plan) = self.get_entitlement_with_plan(account_id).await?;

        let limit = match plan.links_limit {
            LinksLimit::Unlimited => return Ok(FundingSource::Plan),
            LinksLimit::Limited(n) => n,
        };

        let quota = sqlx::query(
            r#"
            UPDATE account_entitlements
            SET links_created_in_cycle = links_created_in_cycle + 1, updated_at = NOW()
            WHERE account_id = $1 AND links_created_in_cycle < $2
            "#,
        )
        .bind(account_id)
        .bind(limit as i32)
        .execute(&self.pool)
        .await?;

        if quota.rows_affected() == 1 {
            return Ok(FundingSource::Plan);
        }

        let credit = sqlx::query(
            r#"
            UPDATE account_entitlements
            SET credit_balance = credit_balance - 1, updated_at = NOW()
            WHERE account_id = $1 AND credit_balance > 0
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        if credit.rows_affected() == 1 {
            tracing::info!(account_id = %account_id, "Link slot funded from credit balance");
            return Ok(FundingSource::Credit);
        }

        Err(EngineError::QuotaExhausted {
            plan_name: plan.name,
            links_limit: limit,
        })
    }

    /// Atomically add purchased credits, within a settlement transaction.
    pub(crate) async fn add_credits_on(
        conn: &mut PgConnection,
        account_id: AccountId,
        credits: u32,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE account_entitlements
            SET credit_balance = credit_balance + $2, updated_at = NOW()
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .bind(credits as i32)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            // Top-up for an account that never selected a plan: the provider
            // confirmed money we cannot apply, which must fail the settlement
            // so the webhook is retried after onboarding completes.
            return Err(EngineError::NotFound(format!(
                "No entitlement for account {}",
                account_id
            )));
        }

        Ok(())
    }
}

/// Joined row for `get_entitlement_with_plan`
struct EntitlementWithPlanRow {
    entitlement: AccountEntitlement,
    plan: Option<Plan>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EntitlementWithPlanRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let entitlement = AccountEntitlement::from_row(row)?;

        let plan_id: Option<PlanId> = row.try_get("p_id")?;
        let plan = match plan_id {
            None => None,
            Some(id) => {
                let raw_limit: i32 = row.try_get("p_links_limit")?;
                let max_expiration_days: Option<i32> = row.try_get("p_max_expiration_days")?;
                Some(Plan {
                    id,
                    name: row.try_get("p_name")?,
                    description: row.try_get("p_description")?,
                    price_cents: row.try_get("p_price_cents")?,
                    links_limit: LinksLimit::from_db(raw_limit),
                    max_expiration_days: max_expiration_days.map(|d| d.max(0) as u32),
                    created_at: row.try_get("p_created_at")?,
                    updated_at: row.try_get("p_updated_at")?,
                })
            }
        };

        Ok(Self { entitlement, plan })
    }
}
