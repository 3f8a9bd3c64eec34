#!/usr/bin/env rust-script
//! Ledger Consistency Verification Script
//!
//! Detects entitlement-ledger drift for the LinkVault platform.
//!
//! ## Usage
//! ```bash
//! cargo run --bin verify_ledger_consistency > drift_report.csv
//! ```
//!
//! ## Environment Variables
//! - DATABASE_URL: PostgreSQL connection string
//!
//! ## Output
//! CSV report with columns:
//! - account_id, issue_type, detail, recommendation

use std::env;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("LinkVault Ledger Consistency Verification");
    println!("==========================================\n");

    dotenvy::dotenv().ok();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = sqlx::postgres::PgPool::connect(&database_url).await?;

    println!("✓ Connected to database\n");

    let mut issues = 0usize;

    // ========================================================================
    // Check 1: Entitlements pointing at a missing plan
    // ========================================================================
    println!("Check 1: Verifying plan references...");

    let orphaned: Vec<(uuid::Uuid,)> = sqlx::query_as(
        r#"
        SELECT e.account_id
        FROM account_entitlements e
        WHERE e.plan_id IS NOT NULL
          AND NOT EXISTS (SELECT 1 FROM plans p WHERE p.id = e.plan_id)
        "#,
    )
    .fetch_all(&pool)
    .await?;

    for (account_id,) in &orphaned {
        println!("{},orphaned_plan,plan row missing,reassign a plan", account_id);
        issues += 1;
    }
    println!("  {} orphaned plan reference(s)\n", orphaned.len());

    // ========================================================================
    // Check 2: Accounts with a cycle stamp but no plan
    // ========================================================================
    println!("Check 2: Verifying cycle stamps...");

    let stamped: Vec<(uuid::Uuid,)> = sqlx::query_as(
        r#"
        SELECT account_id
        FROM account_entitlements
        WHERE plan_id IS NULL AND billing_cycle_start IS NOT NULL
        "#,
    )
    .fetch_all(&pool)
    .await?;

    for (account_id,) in &stamped {
        println!(
            "{},cycle_without_plan,billing_cycle_start set with no plan,clear stamp or set plan",
            account_id
        );
        issues += 1;
    }
    println!("  {} stray cycle stamp(s)\n", stamped.len());

    // ========================================================================
    // Check 3: Credit balance vs. settled top-ups
    // ========================================================================
    // Spent credits only ever decrement, so the balance can never exceed the
    // sum of settled top-up grants. A higher balance means a double-credit.
    println!("Check 3: Reconciling credit balances against settled top-ups...");

    let over_credited: Vec<(uuid::Uuid, i32, i64)> = sqlx::query_as(
        r#"
        SELECT e.account_id,
               e.credit_balance,
               COALESCE(SUM(t.credits_granted), 0) AS granted
        FROM account_entitlements e
        LEFT JOIN transactions t
               ON t.account_id = e.account_id
              AND t.kind = 'top-up'
              AND t.status = 'completed'
        GROUP BY e.account_id, e.credit_balance
        HAVING e.credit_balance > COALESCE(SUM(t.credits_granted), 0)
        "#,
    )
    .fetch_all(&pool)
    .await?;

    for (account_id, balance, granted) in &over_credited {
        println!(
            "{},over_credited,balance {} exceeds settled grants {},audit settlement history",
            account_id, balance, granted
        );
        issues += 1;
    }
    println!("  {} over-credited account(s)\n", over_credited.len());

    // ========================================================================
    // Check 4: Duplicate external references (should be impossible)
    // ========================================================================
    println!("Check 4: Verifying settlement idempotency...");

    let duplicates: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT external_reference, COUNT(*)
        FROM transactions
        GROUP BY external_reference
        HAVING COUNT(*) > 1
        "#,
    )
    .fetch_all(&pool)
    .await?;

    for (reference, count) in &duplicates {
        println!(
            ",duplicate_reference,{} settled {} times,inspect unique constraint",
            reference, count
        );
        issues += 1;
    }
    println!("  {} duplicate reference(s)\n", duplicates.len());

    if issues == 0 {
        println!("All checks passed. Ledger is consistent.");
    } else {
        println!("{} issue(s) found.", issues);
    }

    Ok(())
}
