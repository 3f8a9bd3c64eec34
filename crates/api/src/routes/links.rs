//! Link creation, management, and the public access gate

use axum::{
    extract::{Extension, Multipart, Path, State},
    Json,
};
use linkvault_engine::{CreateLinkRequest, FundingSource, GateState, Link, LinkStats};
use linkvault_shared::LinkId;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::{
    auth::AuthAccount,
    error::{ApiError, ApiResult},
    state::AppState,
    storage::StorageError,
};

/// Request to create a link protecting an external URL
#[derive(Debug, Deserialize)]
pub struct CreateLinkBody {
    pub title: String,
    pub url: String,
    pub password: Option<String>,
    /// RFC 3339 timestamp; absent means the link never expires
    pub expires_at: Option<String>,
}

/// A created or listed link
#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub id: Uuid,
    pub title: String,
    pub target_url: String,
    /// Path to share: `<public_url><share_path>`
    pub share_path: String,
    pub protected: bool,
    pub is_upload: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub view_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_source: Option<FundingSource>,
}

impl LinkResponse {
    fn from_link(link: Link, funding_source: Option<FundingSource>) -> Self {
        Self {
            id: link.id.0,
            share_path: format!("/l/{}", link.id),
            protected: link.is_protected(),
            title: link.title,
            target_url: link.target_url,
            is_upload: link.is_upload,
            expires_at: link.expires_at,
            view_count: link.view_count,
            created_at: link.created_at,
            funding_source,
        }
    }
}

/// Dashboard listing: links plus aggregates
#[derive(Debug, Serialize)]
pub struct LinkListResponse {
    pub links: Vec<LinkResponse>,
    pub stats: LinkStats,
}

fn parse_expiration(raw: Option<&str>) -> ApiResult<Option<OffsetDateTime>> {
    match raw {
        None => Ok(None),
        Some(s) => OffsetDateTime::parse(s, &Rfc3339)
            .map(Some)
            .map_err(|_| ApiError::Validation("expires_at must be an RFC 3339 timestamp".to_string())),
    }
}

/// Create a link for an external URL
pub async fn create_link(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Json(body): Json<CreateLinkBody>,
) -> ApiResult<Json<LinkResponse>> {
    let expires_at = parse_expiration(body.expires_at.as_deref())?;

    let authorized = state
        .authorizer()
        .authorize_and_create(CreateLinkRequest {
            owner_account_id: auth.account_id,
            title: body.title,
            target_url: body.url,
            is_upload: false,
            password: body.password,
            expires_at,
        })
        .await?;

    Ok(Json(LinkResponse::from_link(
        authorized.link,
        Some(authorized.funding_source),
    )))
}

/// Create a link for an uploaded file (multipart: `file` + metadata fields)
pub async fn upload_link(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    mut multipart: Multipart,
) -> ApiResult<Json<LinkResponse>> {
    let mut title: Option<String> = None;
    let mut password: Option<String> = None;
    let mut expires_at_raw: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "title" => {
                title = Some(field.text().await.map_err(bad_field)?);
            }
            "password" => {
                let text = field.text().await.map_err(bad_field)?;
                if !text.is_empty() {
                    password = Some(text);
                }
            }
            "expires_at" => {
                let text = field.text().await.map_err(bad_field)?;
                if !text.is_empty() {
                    expires_at_raw = Some(text);
                }
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("file").to_string();
                let bytes = field.bytes().await.map_err(bad_field)?;
                file = Some((file_name, bytes.to_vec()));
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let title = title.ok_or_else(|| ApiError::Validation("title is required".to_string()))?;
    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::Validation("file is required".to_string()))?;
    let expires_at = parse_expiration(expires_at_raw.as_deref())?;

    // Check the plan gate before uploading anything; authorize_and_create
    // re-checks it, this pass avoids orphaned uploads on the common refusal.
    let (_, plan) = state
        .entitlements()
        .get_entitlement_with_plan(auth.account_id)
        .await?;
    if !plan.allows_file_upload() {
        return Err(ApiError::UploadNotAllowed(format!(
            "The {} plan does not allow file uploads",
            plan.name
        )));
    }

    let target_url = state.storage.store(&file_name, bytes).await.map_err(|e| match e {
        StorageError::TooLarge { .. } => ApiError::Validation(e.to_string()),
        StorageError::Upload(msg) => {
            tracing::error!(error = %msg, "File upload failed");
            ApiError::ServiceUnavailable
        }
    })?;

    let authorized = state
        .authorizer()
        .authorize_and_create(CreateLinkRequest {
            owner_account_id: auth.account_id,
            title,
            target_url,
            is_upload: true,
            password,
            expires_at,
        })
        .await?;

    Ok(Json(LinkResponse::from_link(
        authorized.link,
        Some(authorized.funding_source),
    )))
}

fn bad_field(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Invalid multipart field: {}", e))
}

/// List the caller's links with dashboard aggregates
pub async fn list_links(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
) -> ApiResult<Json<LinkListResponse>> {
    let store = state.links();
    let links = store.list_links(auth.account_id).await?;
    let stats = store.link_stats(auth.account_id).await?;

    Ok(Json(LinkListResponse {
        links: links
            .into_iter()
            .map(|l| LinkResponse::from_link(l, None))
            .collect(),
        stats,
    }))
}

/// Delete an owned link; stored files are removed best-effort.
pub async fn delete_link(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthAccount>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let link = state
        .links()
        .delete_link(LinkId::from(id), auth.account_id)
        .await?;

    if link.is_upload {
        state.storage.delete(&link.target_url).await;
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

// ============================================================================
// Public gate (no authentication; visitors only hold the link id)
// ============================================================================

/// Enter the gate for a link
pub async fn open_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GateState>> {
    let state_out = state.gate().open(LinkId::from(id)).await?;

    match state_out {
        GateState::NotFound => Err(ApiError::NotFound),
        other => Ok(Json(other)),
    }
}

/// Password submission for a protected link
#[derive(Debug, Deserialize)]
pub struct UnlockBody {
    pub password: String,
}

pub async fn unlock_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UnlockBody>,
) -> ApiResult<Json<GateState>> {
    let state_out = state
        .gate()
        .unlock(LinkId::from(id), &body.password)
        .await?;

    match state_out {
        GateState::NotFound => Err(ApiError::NotFound),
        other => Ok(Json(other)),
    }
}
