//! Link Creation Authorizer
//!
//! Gatekeeper invoked before anything is written to the link store. The
//! upload-allowance and expiration checks run before any counter is
//! touched; only then is a quota slot or credit consumed. A slot consumed
//! for a creation that subsequently fails is not refunded; the ledger
//! itself stays consistent because the reservation was a single committed
//! statement.

use linkvault_shared::AccountId;
use time::OffsetDateTime;

use crate::entitlement::{EntitlementService, FundingSource};
use crate::error::{EngineError, EngineResult};
use crate::links::{Link, LinkStore, NewLink};
use crate::password;

/// A request to create a link, before authorization.
#[derive(Debug, Clone)]
pub struct CreateLinkRequest {
    pub owner_account_id: AccountId,
    pub title: String,
    /// Either a user-supplied external URL or the storage URL of uploaded
    /// bytes (in which case `is_upload` is set).
    pub target_url: String,
    pub is_upload: bool,
    pub password: Option<String>,
    pub expires_at: Option<OffsetDateTime>,
}

/// A successfully authorized and persisted link.
#[derive(Debug, Clone)]
pub struct AuthorizedLink {
    pub link: Link,
    pub funding_source: FundingSource,
}

/// Authorizes link creation against the entitlement ledger and persists
/// the link on success.
#[derive(Clone)]
pub struct LinkAuthorizer {
    entitlements: EntitlementService,
    store: LinkStore,
}

impl LinkAuthorizer {
    pub fn new(entitlements: EntitlementService, store: LinkStore) -> Self {
        Self {
            entitlements,
            store,
        }
    }

    /// Authorize a creation request, debit the funding source, and persist
    /// the link.
    pub async fn authorize_and_create(
        &self,
        request: CreateLinkRequest,
    ) -> EngineResult<AuthorizedLink> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(EngineError::InvalidInput("Title must not be empty".to_string()));
        }
        if request.target_url.is_empty() {
            return Err(EngineError::InvalidInput(
                "Target URL must not be empty".to_string(),
            ));
        }

        let (_, plan) = self
            .entitlements
            .get_entitlement_with_plan(request.owner_account_id)
            .await?;

        // Refusals that must happen before any counter is touched.
        if request.is_upload && !plan.allows_file_upload() {
            return Err(EngineError::UploadNotAllowed {
                plan_name: plan.name,
            });
        }
        plan.validate_expiration(request.expires_at, OffsetDateTime::now_utc())?;

        let funding_source = self
            .entitlements
            .reserve_link_slot(request.owner_account_id)
            .await?;

        let password_hash = match request.password.as_deref() {
            Some(p) if !p.is_empty() => Some(password::hash_password(p)?),
            _ => None,
        };

        let new = NewLink {
            owner_account_id: request.owner_account_id,
            title: title.to_string(),
            target_url: request.target_url,
            is_upload: request.is_upload,
            password_hash,
            expires_at: request.expires_at,
        };

        match self.store.create_link(new).await {
            Ok(link) => {
                tracing::info!(
                    link_id = %link.id,
                    owner = %request.owner_account_id,
                    funding_source = %funding_source,
                    "Link creation authorized"
                );
                Ok(AuthorizedLink {
                    link,
                    funding_source,
                })
            }
            Err(e) => {
                // No refund of the consumed slot; this log line is how
                // operators find orphaned reservations.
                tracing::warn!(
                    owner = %request.owner_account_id,
                    funding_source = %funding_source,
                    error = %e,
                    "Link persist failed after slot reservation; slot not refunded"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(is_upload: bool) -> CreateLinkRequest {
        CreateLinkRequest {
            owner_account_id: AccountId::from(Uuid::new_v4()),
            title: "Launch deck".to_string(),
            target_url: "https://example.com/deck.pdf".to_string(),
            is_upload,
            password: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_request_shape() {
        let r = request(true);
        assert!(r.is_upload);
        assert!(r.password.is_none());
    }
}
