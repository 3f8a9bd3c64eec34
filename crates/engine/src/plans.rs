//! Plan catalog
//!
//! Plans are immutable reference data: many accounts point at one plan row.
//! The database stores the link allowance as an integer where any negative
//! value means "unlimited" (legacy sentinel); code decodes that into
//! [`LinksLimit`] in exactly one place so the sentinel never leaks into
//! comparison logic.

use linkvault_shared::PlanId;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::error::{EngineError, EngineResult};

/// Per-cycle link allowance of a plan.
///
/// `Limited(0)` means "no links allowed" and is distinct from `Unlimited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinksLimit {
    Unlimited,
    Limited(u32),
}

impl LinksLimit {
    /// Decode the database sentinel (negative = unlimited).
    pub fn from_db(raw: i32) -> Self {
        if raw < 0 {
            LinksLimit::Unlimited
        } else {
            LinksLimit::Limited(raw as u32)
        }
    }

    /// Encode back to the database representation.
    pub fn as_db(self) -> i32 {
        match self {
            LinksLimit::Unlimited => -1,
            LinksLimit::Limited(n) => n as i32,
        }
    }

    /// Whether an account that has already created `created` links this
    /// cycle may create another from plan quota.
    pub fn allows(self, created: u32) -> bool {
        match self {
            LinksLimit::Unlimited => true,
            LinksLimit::Limited(n) => created < n,
        }
    }

    /// The finite limit, if any.
    pub fn limit(self) -> Option<u32> {
        match self {
            LinksLimit::Unlimited => None,
            LinksLimit::Limited(n) => Some(n),
        }
    }
}

impl std::fmt::Display for LinksLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinksLimit::Unlimited => write!(f, "unlimited"),
            LinksLimit::Limited(n) => write!(f, "{}", n),
        }
    }
}

/// A subscription plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i32,
    pub links_limit: LinksLimit,
    pub max_expiration_days: Option<u32>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Plan {
    /// Free plans have no charge and are selected without a payment flow.
    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }

    /// File uploads are a paid-plan feature.
    pub fn allows_file_upload(&self) -> bool {
        self.price_cents > 0
    }

    /// Check a requested expiration against the plan's cap.
    /// `None` (never expires) is allowed only on plans without a cap.
    pub fn validate_expiration(
        &self,
        expires_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> EngineResult<()> {
        let Some(max_days) = self.max_expiration_days else {
            return Ok(());
        };

        match expires_at {
            None => Err(EngineError::ExpirationTooFar { max_days }),
            Some(at) => {
                if at > now + time::Duration::days(max_days as i64) {
                    Err(EngineError::ExpirationTooFar { max_days })
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for Plan {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let raw_limit: i32 = row.try_get("links_limit")?;
        let max_expiration_days: Option<i32> = row.try_get("max_expiration_days")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price_cents: row.try_get("price_cents")?,
            links_limit: LinksLimit::from_db(raw_limit),
            max_expiration_days: max_expiration_days.map(|d| d.max(0) as u32),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Read-only access to the plan catalog
#[derive(Clone)]
pub struct PlanCatalog {
    pool: PgPool,
}

impl PlanCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a single plan by id
    pub async fn get_plan(&self, plan_id: PlanId) -> EngineResult<Plan> {
        let plan: Option<Plan> = sqlx::query_as(
            "SELECT id, name, description, price_cents, links_limit, max_expiration_days,
                    created_at, updated_at
             FROM plans WHERE id = $1",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        plan.ok_or_else(|| EngineError::NotFound(format!("Plan {} not found", plan_id)))
    }

    /// All plans, cheapest first (pricing page order)
    pub async fn list_plans(&self) -> EngineResult<Vec<Plan>> {
        let plans: Vec<Plan> = sqlx::query_as(
            "SELECT id, name, description, price_cents, links_limit, max_expiration_days,
                    created_at, updated_at
             FROM plans ORDER BY price_cents ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn plan(price_cents: i32, links_limit: i32, max_expiration_days: Option<u32>) -> Plan {
        Plan {
            id: PlanId::from(Uuid::new_v4()),
            name: "Test".to_string(),
            description: None,
            price_cents,
            links_limit: LinksLimit::from_db(links_limit),
            max_expiration_days,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn test_links_limit_sentinel_decoding() {
        assert_eq!(LinksLimit::from_db(-1), LinksLimit::Unlimited);
        assert_eq!(LinksLimit::from_db(-7), LinksLimit::Unlimited);
        assert_eq!(LinksLimit::from_db(0), LinksLimit::Limited(0));
        assert_eq!(LinksLimit::from_db(5), LinksLimit::Limited(5));
        assert_eq!(LinksLimit::Unlimited.as_db(), -1);
        assert_eq!(LinksLimit::Limited(5).as_db(), 5);
    }

    #[test]
    fn test_zero_limit_is_not_unlimited() {
        // A plan with limit 0 allows nothing; unlimited allows everything.
        assert!(!LinksLimit::Limited(0).allows(0));
        assert!(LinksLimit::Unlimited.allows(0));
        assert!(LinksLimit::Unlimited.allows(u32::MAX));
    }

    #[test]
    fn test_links_limit_allows() {
        let limit = LinksLimit::Limited(5);
        assert!(limit.allows(0));
        assert!(limit.allows(4));
        assert!(!limit.allows(5));
        assert!(!limit.allows(6));
    }

    #[test]
    fn test_file_upload_derived_from_price() {
        assert!(!plan(0, 5, Some(7)).allows_file_upload());
        assert!(plan(900, 50, Some(90)).allows_file_upload());
        assert!(plan(0, 5, Some(7)).is_free());
        assert!(!plan(900, 50, Some(90)).is_free());
    }

    #[test]
    fn test_validate_expiration_within_cap() {
        let now = OffsetDateTime::now_utc();
        let p = plan(0, 5, Some(7));
        assert!(p
            .validate_expiration(Some(now + time::Duration::days(3)), now)
            .is_ok());
        assert!(p
            .validate_expiration(Some(now + time::Duration::days(7)), now)
            .is_ok());
    }

    #[test]
    fn test_validate_expiration_beyond_cap() {
        let now = OffsetDateTime::now_utc();
        let p = plan(0, 5, Some(7));
        let err = p
            .validate_expiration(Some(now + time::Duration::days(8)), now)
            .unwrap_err();
        assert!(matches!(err, EngineError::ExpirationTooFar { max_days: 7 }));
    }

    #[test]
    fn test_validate_expiration_never_expires() {
        let now = OffsetDateTime::now_utc();
        // Capped plan: "never expires" is not allowed
        assert!(plan(0, 5, Some(7)).validate_expiration(None, now).is_err());
        // Uncapped plan: anything goes
        let uncapped = plan(2900, -1, None);
        assert!(uncapped.validate_expiration(None, now).is_ok());
        assert!(uncapped
            .validate_expiration(Some(now + time::Duration::days(3650)), now)
            .is_ok());
    }
}
