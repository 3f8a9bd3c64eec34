//! Link Access Gate
//!
//! The state machine a visitor traverses to reach a protected link's target:
//! lookup, expiration check, password check, view recording. Expiration
//! dominates the password check: an expired link is refused even with the
//! correct password. `Expired` and `PasswordRequired` are states, not
//! errors; they are common, expected outcomes.

use linkvault_shared::LinkId;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::EngineResult;
use crate::links::{Link, LinkStore};
use crate::password;

/// Terminal (or waiting) state of a single visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    NotFound,
    Expired,
    PasswordRequired { link_id: LinkId, title: String },
    Granted { target_url: String, title: String },
}

/// Pure evaluation of a fetched link, with no side effects.
/// The caller records the view when this grants access.
fn evaluate(link: &Link, now: OffsetDateTime) -> GateState {
    if link.is_expired(now) {
        return GateState::Expired;
    }

    if link.is_protected() {
        GateState::PasswordRequired {
            link_id: link.id,
            title: link.title.clone(),
        }
    } else {
        GateState::Granted {
            target_url: link.target_url.clone(),
            title: link.title.clone(),
        }
    }
}

/// Gate service: each visit re-enters from the lookup; no authentication
/// from a prior visit is remembered.
#[derive(Clone)]
pub struct AccessGate {
    store: LinkStore,
}

impl AccessGate {
    pub fn new(store: LinkStore) -> Self {
        Self { store }
    }

    /// First transition of a visit: look the link up and evaluate it.
    /// Entering `Granted` records exactly one view.
    pub async fn open(&self, link_id: LinkId) -> EngineResult<GateState> {
        let Some(link) = self.store.get_link(link_id).await? else {
            return Ok(GateState::NotFound);
        };

        let state = evaluate(&link, OffsetDateTime::now_utc());
        if matches!(state, GateState::Granted { .. }) {
            self.store.record_view(link_id).await?;
        }

        Ok(state)
    }

    /// Submit a password for a protected link.
    ///
    /// Expiration is re-checked: a link that expired since `open` stays
    /// refused regardless of the password. A mismatch leaves the visit in
    /// `PasswordRequired` and records no view; a match grants access and
    /// records exactly one view.
    pub async fn unlock(&self, link_id: LinkId, submitted_password: &str) -> EngineResult<GateState> {
        let Some(link) = self.store.get_link(link_id).await? else {
            return Ok(GateState::NotFound);
        };

        let now = OffsetDateTime::now_utc();
        match evaluate(&link, now) {
            GateState::PasswordRequired { .. } => {
                // password_hash is present whenever evaluate says so
                let hash = link.password_hash.as_deref().unwrap_or_default();
                if password::verify_password(submitted_password, hash)? {
                    self.store.record_view(link_id).await?;
                    Ok(GateState::Granted {
                        target_url: link.target_url,
                        title: link.title,
                    })
                } else {
                    tracing::debug!(link_id = %link_id, "Password mismatch on protected link");
                    Ok(GateState::PasswordRequired {
                        link_id: link.id,
                        title: link.title,
                    })
                }
            }
            // Unprotected link: unlock degenerates to open.
            GateState::Granted { target_url, title } => {
                self.store.record_view(link_id).await?;
                Ok(GateState::Granted { target_url, title })
            }
            terminal => Ok(terminal),
        }
    }
}
