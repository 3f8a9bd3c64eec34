//! Link Store
//!
//! Durable record of shared links and their protection state. Quota and
//! credit accounting happen in the authorizer before anything lands here;
//! the store never re-checks entitlement.

use linkvault_shared::{AccountId, LinkId};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::{EngineError, EngineResult};

/// A shared link
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: LinkId,
    pub owner_account_id: AccountId,
    pub title: String,
    pub target_url: String,
    /// Whether `target_url` points at bytes we stored (vs. an external URL).
    pub is_upload: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
    pub view_count: i64,
    pub created_at: OffsetDateTime,
}

impl Link {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map(|at| at < now).unwrap_or(false)
    }

    pub fn is_protected(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Fields for a new link. The id is generated at insert time.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub owner_account_id: AccountId,
    pub title: String,
    pub target_url: String,
    pub is_upload: bool,
    pub password_hash: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

/// Aggregate link statistics for an account's dashboard
#[derive(Debug, Clone, Serialize)]
pub struct LinkStats {
    pub total_links: i64,
    pub total_views: i64,
    pub active_links: i64,
    pub expired_links: i64,
}

/// Link persistence service
#[derive(Clone)]
pub struct LinkStore {
    pool: PgPool,
}

impl LinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a new link under a fresh unguessable id.
    pub async fn create_link(&self, new: NewLink) -> EngineResult<Link> {
        let id = LinkId::new();
        let now = OffsetDateTime::now_utc();

        sqlx::query(
            r#"
            INSERT INTO links (id, owner_account_id, title, target_url, is_upload,
                               password_hash, expires_at, view_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8)
            "#,
        )
        .bind(id)
        .bind(new.owner_account_id)
        .bind(&new.title)
        .bind(&new.target_url)
        .bind(new.is_upload)
        .bind(&new.password_hash)
        .bind(new.expires_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::info!(link_id = %id, owner = %new.owner_account_id, "Link created");

        Ok(Link {
            id,
            owner_account_id: new.owner_account_id,
            title: new.title,
            target_url: new.target_url,
            is_upload: new.is_upload,
            password_hash: new.password_hash,
            expires_at: new.expires_at,
            view_count: 0,
            created_at: now,
        })
    }

    /// Look up a link by its public id.
    pub async fn get_link(&self, link_id: LinkId) -> EngineResult<Option<Link>> {
        let link: Option<Link> = sqlx::query_as(
            "SELECT id, owner_account_id, title, target_url, is_upload, password_hash,
                    expires_at, view_count, created_at
             FROM links WHERE id = $1",
        )
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(link)
    }

    /// Record exactly one view.
    ///
    /// Database-level increment: concurrent visitors must never lose an
    /// update, so this is not a read-modify-write from application code.
    pub async fn record_view(&self, link_id: LinkId) -> EngineResult<()> {
        let result = sqlx::query("UPDATE links SET view_count = view_count + 1 WHERE id = $1")
            .bind(link_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            // Link deleted between lookup and increment; nothing to count.
            tracing::debug!(link_id = %link_id, "View not recorded: link no longer exists");
        }

        Ok(())
    }

    /// Delete a link. Only the owner may delete; returns the removed record
    /// so the caller can best-effort clean up backing storage.
    pub async fn delete_link(
        &self,
        link_id: LinkId,
        requesting_account_id: AccountId,
    ) -> EngineResult<Link> {
        let link = self
            .get_link(link_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Link {} not found", link_id)))?;

        if link.owner_account_id != requesting_account_id {
            return Err(EngineError::Forbidden);
        }

        sqlx::query("DELETE FROM links WHERE id = $1 AND owner_account_id = $2")
            .bind(link_id)
            .bind(requesting_account_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(link_id = %link_id, owner = %requesting_account_id, "Link deleted");
        Ok(link)
    }

    /// All links owned by an account, newest first.
    pub async fn list_links(&self, owner: AccountId) -> EngineResult<Vec<Link>> {
        let links: Vec<Link> = sqlx::query_as(
            "SELECT id, owner_account_id, title, target_url, is_upload, password_hash,
                    expires_at, view_count, created_at
             FROM links WHERE owner_account_id = $1
             ORDER BY created_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(links)
    }

    /// Dashboard aggregates for an account.
    pub async fn link_stats(&self, owner: AccountId) -> EngineResult<LinkStats> {
        let row: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(view_count), 0)::BIGINT,
                   COUNT(*) FILTER (WHERE expires_at IS NOT NULL AND expires_at < NOW())
            FROM links WHERE owner_account_id = $1
            "#,
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;

        let (total_links, total_views, expired_links) = row;
        Ok(LinkStats {
            total_links,
            total_views,
            active_links: total_links - expired_links,
            expired_links,
        })
    }
}
