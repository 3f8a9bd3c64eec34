//! Route definitions

pub mod links;
pub mod plans;
pub mod webhooks;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};

use crate::{auth, state::AppState};

/// Build the application router
pub fn router(state: AppState) -> Router {
    // Public surface: pricing, the visit gate, and provider webhooks.
    // Webhooks authenticate via signature, gate visitors via the link id.
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/plans", get(plans::list_plans))
        .route("/api/l/:id", get(links::open_link))
        .route("/api/l/:id/unlock", post(links::unlock_link))
        .route("/api/webhooks/card", post(webhooks::card_webhook))
        .route("/api/webhooks/crypto", post(webhooks::crypto_webhook));

    let max_upload = state.config.max_upload_bytes;
    let authenticated = Router::new()
        .route("/api/links", post(links::create_link).get(links::list_links))
        .route(
            "/api/links/upload",
            post(links::upload_link).layer(DefaultBodyLimit::max(max_upload + 64 * 1024)),
        )
        .route("/api/links/:id", delete(links::delete_link))
        .route("/api/plans/select", post(plans::select_plan))
        .route("/api/entitlement", get(plans::entitlement))
        .route("/api/transactions", get(plans::transactions))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    public.merge(authenticated).with_state(state)
}

/// Liveness probe
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
