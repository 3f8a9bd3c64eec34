//! Integration tests for the entitlement ledger and link store
//!
//! These tests verify the properties that only hold (or fail) against a real
//! database: atomic view counting, concurrent slot reservation, and
//! idempotent settlement under webhook redelivery.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://localhost/linkvault_test"
//! cargo test -p linkvault-engine -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use linkvault_engine::{
    AccessGate, EngineError, EntitlementService, FundingSource, GateState, LinkStore, NewLink,
    PaymentMethod, SettlementOutcome, SettlementService, TransactionStore,
};
use linkvault_shared::{AccountId, PlanId};
use sqlx::PgPool;
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

async fn setup_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database")
}

/// Insert a plan row and return its id.
async fn create_test_plan(pool: &PgPool, price_cents: i32, links_limit: i32) -> PlanId {
    let name = format!("test-plan-{}", Uuid::new_v4());
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO plans (name, price_cents, links_limit, max_expiration_days)
        VALUES ($1, $2, $3, NULL)
        RETURNING id
        "#,
    )
    .bind(&name)
    .bind(price_cents)
    .bind(links_limit)
    .fetch_one(pool)
    .await
    .expect("Failed to create test plan");

    PlanId::from(id)
}

/// Create an account entitlement on the given plan with the given credits.
async fn create_test_account(pool: &PgPool, plan_id: PlanId, credits: i32) -> AccountId {
    let account_id = AccountId::new();
    sqlx::query(
        r#"
        INSERT INTO account_entitlements (account_id, plan_id, credit_balance, billing_cycle_start)
        VALUES ($1, $2, $3, NOW())
        "#,
    )
    .bind(account_id)
    .bind(plan_id)
    .bind(credits)
    .execute(pool)
    .await
    .expect("Failed to create test account");

    account_id
}

async fn cleanup_account(pool: &PgPool, account_id: AccountId, plan_id: PlanId) {
    sqlx::query("DELETE FROM links WHERE owner_account_id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM transactions WHERE account_id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM account_entitlements WHERE account_id = $1")
        .bind(account_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(plan_id)
        .execute(pool)
        .await
        .ok();
}

// ============================================================================
// View counting
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn concurrent_views_are_never_lost() {
    let pool = setup_pool().await;
    let plan_id = create_test_plan(&pool, 0, 5).await;
    let account_id = create_test_account(&pool, plan_id, 0).await;

    let store = LinkStore::new(pool.clone());
    let link = store
        .create_link(NewLink {
            owner_account_id: account_id,
            title: "Concurrency probe".to_string(),
            target_url: "https://example.com".to_string(),
            is_upload: false,
            password_hash: None,
            expires_at: None,
        })
        .await
        .expect("Failed to create link");

    const VISITORS: usize = 25;
    let mut handles = Vec::with_capacity(VISITORS);
    for _ in 0..VISITORS {
        let store = store.clone();
        let link_id = link.id;
        handles.push(tokio::spawn(
            async move { store.record_view(link_id).await },
        ));
    }
    for handle in handles {
        handle.await.expect("task panicked").expect("record_view failed");
    }

    let after = store
        .get_link(link.id)
        .await
        .expect("get_link failed")
        .expect("link vanished");
    assert_eq!(after.view_count, VISITORS as i64);

    cleanup_account(&pool, account_id, plan_id).await;
}

// ============================================================================
// Slot reservation
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn concurrent_reservations_never_oversell() {
    let pool = setup_pool().await;
    // 5 quota slots + 3 credits = exactly 8 grants, no matter the interleaving.
    let plan_id = create_test_plan(&pool, 0, 5).await;
    let account_id = create_test_account(&pool, plan_id, 3).await;

    let ledger = EntitlementService::new(pool.clone());

    const ATTEMPTS: usize = 20;
    let mut handles = Vec::with_capacity(ATTEMPTS);
    for _ in 0..ATTEMPTS {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.reserve_link_slot(account_id).await
        }));
    }

    let mut granted_plan = 0;
    let mut granted_credit = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(FundingSource::Plan) => granted_plan += 1,
            Ok(FundingSource::Credit) => granted_credit += 1,
            Err(EngineError::QuotaExhausted { .. }) => refused += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(granted_plan, 5);
    assert_eq!(granted_credit, 3);
    assert_eq!(refused, ATTEMPTS - 8);

    let entitlement = ledger
        .get_entitlement(account_id)
        .await
        .expect("entitlement vanished");
    assert_eq!(entitlement.links_created_in_cycle, 5);
    assert_eq!(entitlement.credit_balance, 0);

    cleanup_account(&pool, account_id, plan_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn quota_exhausts_at_exactly_the_limit() {
    let pool = setup_pool().await;
    let plan_id = create_test_plan(&pool, 0, 5).await;
    let account_id = create_test_account(&pool, plan_id, 0).await;

    let ledger = EntitlementService::new(pool.clone());

    for _ in 0..5 {
        let source = ledger
            .reserve_link_slot(account_id)
            .await
            .expect("reservation within quota failed");
        assert_eq!(source, FundingSource::Plan);
    }

    let err = ledger
        .reserve_link_slot(account_id)
        .await
        .expect_err("6th reservation should be refused");
    assert!(matches!(err, EngineError::QuotaExhausted { links_limit: 5, .. }));

    cleanup_account(&pool, account_id, plan_id).await;
}

// ============================================================================
// Settlement idempotency
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn top_up_replay_credits_exactly_once() {
    let pool = setup_pool().await;
    let plan_id = create_test_plan(&pool, 0, 5).await;
    let account_id = create_test_account(&pool, plan_id, 0).await;

    let settlement = SettlementService::new(pool.clone());
    let ledger = EntitlementService::new(pool.clone());
    let reference = format!("charge-{}", Uuid::new_v4());

    let first = settlement
        .settle_top_up(account_id, 10, 500, PaymentMethod::Crypto, &reference)
        .await
        .expect("first settlement failed");
    assert_eq!(first, SettlementOutcome::Applied);

    // Simulated webhook redelivery.
    let second = settlement
        .settle_top_up(account_id, 10, 500, PaymentMethod::Crypto, &reference)
        .await
        .expect("redelivered settlement errored");
    assert_eq!(second, SettlementOutcome::AlreadySettled);

    let entitlement = ledger.get_entitlement(account_id).await.expect("no entitlement");
    assert_eq!(entitlement.credit_balance, 10);

    let transactions = TransactionStore::new(pool.clone());
    let record = transactions
        .find_by_reference(&reference)
        .await
        .expect("lookup failed")
        .expect("transaction missing");
    assert_eq!(record.credits_granted, Some(10));

    cleanup_account(&pool, account_id, plan_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn subscription_replay_applies_plan_once() {
    let pool = setup_pool().await;
    let free_plan = create_test_plan(&pool, 0, 5).await;
    let paid_plan = create_test_plan(&pool, 900, 50).await;
    let account_id = create_test_account(&pool, free_plan, 0).await;

    let settlement = SettlementService::new(pool.clone());
    let ledger = EntitlementService::new(pool.clone());
    let reference = format!("session-{}", Uuid::new_v4());

    let first = settlement
        .settle_subscription(account_id, paid_plan, 900, PaymentMethod::Card, &reference)
        .await
        .expect("first settlement failed");
    assert_eq!(first, SettlementOutcome::Applied);

    let second = settlement
        .settle_subscription(account_id, paid_plan, 900, PaymentMethod::Card, &reference)
        .await
        .expect("redelivered settlement errored");
    assert_eq!(second, SettlementOutcome::AlreadySettled);

    let entitlement = ledger.get_entitlement(account_id).await.expect("no entitlement");
    assert_eq!(entitlement.plan_id, Some(paid_plan));

    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE external_reference = $1")
            .bind(&reference)
            .fetch_one(&pool)
            .await
            .expect("count failed");
    assert_eq!(count.0, 1);

    cleanup_account(&pool, account_id, paid_plan).await;
    sqlx::query("DELETE FROM plans WHERE id = $1")
        .bind(free_plan)
        .execute(&pool)
        .await
        .ok();
}

#[tokio::test]
#[ignore] // Requires database
async fn free_plan_selection_writes_no_transaction() {
    let pool = setup_pool().await;
    let free_plan = create_test_plan(&pool, 0, 5).await;
    let account_id = AccountId::new();

    let settlement = SettlementService::new(pool.clone());
    settlement
        .select_free_plan(account_id, free_plan)
        .await
        .expect("free plan selection failed");

    let ledger = EntitlementService::new(pool.clone());
    let entitlement = ledger.get_entitlement(account_id).await.expect("no entitlement");
    assert_eq!(entitlement.plan_id, Some(free_plan));
    assert!(entitlement.billing_cycle_start.is_some());

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(&pool)
        .await
        .expect("count failed");
    assert_eq!(count.0, 0);

    cleanup_account(&pool, account_id, free_plan).await;
}

// ============================================================================
// Gate against real rows
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn protected_link_unlock_flow() {
    let pool = setup_pool().await;
    let plan_id = create_test_plan(&pool, 900, 50).await;
    let account_id = create_test_account(&pool, plan_id, 0).await;

    let store = LinkStore::new(pool.clone());
    let link = store
        .create_link(NewLink {
            owner_account_id: account_id,
            title: "Board minutes".to_string(),
            target_url: "https://example.com/minutes.pdf".to_string(),
            is_upload: false,
            password_hash: Some(
                linkvault_engine::password::hash_password("secret123").expect("hash failed"),
            ),
            expires_at: None,
        })
        .await
        .expect("Failed to create link");

    let gate = AccessGate::new(store.clone());

    // Opening a protected link waits for a password and records nothing.
    let state = gate.open(link.id).await.expect("gate failed");
    assert!(matches!(state, GateState::PasswordRequired { .. }));

    // A wrong password stays in PasswordRequired and still records nothing.
    let state = gate.unlock(link.id, "wrong").await.expect("gate failed");
    assert!(matches!(state, GateState::PasswordRequired { .. }));
    let after = store.get_link(link.id).await.expect("get failed").expect("gone");
    assert_eq!(after.view_count, 0);

    // The correct password grants access and records exactly one view.
    let state = gate.unlock(link.id, "secret123").await.expect("gate failed");
    assert!(matches!(state, GateState::Granted { .. }));
    let after = store.get_link(link.id).await.expect("get failed").expect("gone");
    assert_eq!(after.view_count, 1);

    cleanup_account(&pool, account_id, plan_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn expired_link_records_no_view() {
    let pool = setup_pool().await;
    let plan_id = create_test_plan(&pool, 0, 5).await;
    let account_id = create_test_account(&pool, plan_id, 0).await;

    let store = LinkStore::new(pool.clone());
    let link = store
        .create_link(NewLink {
            owner_account_id: account_id,
            title: "Stale".to_string(),
            target_url: "https://example.com".to_string(),
            is_upload: false,
            password_hash: None,
            expires_at: Some(time::OffsetDateTime::now_utc() - time::Duration::days(1)),
        })
        .await
        .expect("Failed to create link");

    let gate = AccessGate::new(store.clone());
    let state = gate.open(link.id).await.expect("gate failed");
    assert_eq!(state, GateState::Expired);

    let after = store
        .get_link(link.id)
        .await
        .expect("get_link failed")
        .expect("link vanished");
    assert_eq!(after.view_count, 0);

    cleanup_account(&pool, account_id, plan_id).await;
}
