//! Plan catalog, selection, and entitlement summary

use axum::{
    extract::{Extension, State},
    Json,
};
use linkvault_engine::{decide_funding, FundingDecision, Plan, TransactionRecord};
use linkvault_shared::PlanId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::AuthAccount, error::ApiResult, state::AppState};

/// A plan as shown on the pricing page
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i32,
    /// `null` means unlimited
    pub links_limit: Option<u32>,
    pub max_expiration_days: Option<u32>,
    pub allows_file_upload: bool,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id.0,
            allows_file_upload: plan.allows_file_upload(),
            links_limit: plan.links_limit.limit(),
            name: plan.name,
            description: plan.description,
            price_cents: plan.price_cents,
            max_expiration_days: plan.max_expiration_days,
        }
    }
}

/// All plans, cheapest first
pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<Vec<PlanResponse>>> {
    let plans = state.plans().list_plans().await?;
    Ok(Json(plans.into_iter().map(PlanResponse::from).collect()))
}

/// Request to select a plan
#[derive(Debug, Deserialize)]
pub struct SelectPlanBody {
    pub plan_id: Uuid,
}

/// Outcome of a plan selection
#[derive(Debug, Serialize)]
pub struct SelectPlanResponse {
    /// False for free plans (applied immediately); true when the caller must
    /// complete a payment checkout before the plan activates.
    pub requires_payment: bool,
    pub plan: PlanResponse,
}

/// Select a plan. Free plans apply immediately with no transaction record;
/// paid plans activate only when the payment confirmation settles.
pub async fn select_plan(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Json(body): Json<SelectPlanBody>,
) -> ApiResult<Json<SelectPlanResponse>> {
    let plan_id = PlanId::from(body.plan_id);
    let plan = state.plans().get_plan(plan_id).await?;

    if plan.is_free() {
        state
            .settlement()
            .select_free_plan(auth.account_id, plan_id)
            .await?;
        return Ok(Json(SelectPlanResponse {
            requires_payment: false,
            plan: plan.into(),
        }));
    }

    // Paid plan: checkout creation belongs to the payment processor
    // integration. The plan activates when its confirmation settles.
    Ok(Json(SelectPlanResponse {
        requires_payment: true,
        plan: plan.into(),
    }))
}

/// The caller's current plan and usage
#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub plan: PlanResponse,
    pub links_created_in_cycle: u32,
    pub credit_balance: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub billing_cycle_start: Option<OffsetDateTime>,
    /// What the next link creation would be funded from:
    /// "plan", "credit", or "exhausted".
    pub next_link_funding: &'static str,
}

pub async fn entitlement(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
) -> ApiResult<Json<EntitlementResponse>> {
    let (entitlement, plan) = state
        .entitlements()
        .get_entitlement_with_plan(auth.account_id)
        .await?;

    let next_link_funding = match decide_funding(
        plan.links_limit,
        entitlement.links_created_in_cycle,
        entitlement.credit_balance,
    ) {
        FundingDecision::Plan { .. } => "plan",
        FundingDecision::Credit => "credit",
        FundingDecision::Exhausted => "exhausted",
    };

    Ok(Json(EntitlementResponse {
        plan: plan.into(),
        links_created_in_cycle: entitlement.links_created_in_cycle,
        credit_balance: entitlement.credit_balance,
        billing_cycle_start: entitlement.billing_cycle_start,
        next_link_funding,
    }))
}

/// Recent settled transactions for the caller
pub async fn transactions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
) -> ApiResult<Json<Vec<TransactionRecord>>> {
    let records = state
        .transactions()
        .list_for_account(auth.account_id, 50)
        .await?;
    Ok(Json(records))
}
