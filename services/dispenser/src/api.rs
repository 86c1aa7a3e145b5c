//! Public HTTP surface
//!
//! Thin adapters between HTTP and the core managers: parse the request,
//! call one manager operation, render the result. All refusals come back
//! as JSON bodies with a stable `error` code so callers can branch without
//! scraping messages.
//!
//! Delivery contract: a checkout response that never reaches the requester
//! is the caller's problem to detect; the caller must POST the account to
//! `/restore` exactly once so it re-enters the pool at the front.

use account_pool::Error as PoolError;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub requester_id: u64,
}

#[derive(Deserialize)]
pub struct RestoreRequest {
    pub account: String,
}

/// POST /checkout — pop the front account for this requester.
pub async fn checkout(
    State(state): State<AppState>,
    Json(body): Json<CheckoutRequest>,
) -> impl IntoResponse {
    let request_id = Uuid::new_v4().to_string();

    match state.accounts.checkout(body.requester_id).await {
        Ok(out) => {
            state
                .analytics
                .record(&body.requester_id.to_string(), "checkout")
                .await;
            info!(request_id, requester = body.requester_id, stock = out.stock, "checkout delivered");
            (
                StatusCode::OK,
                Json(json!({
                    "request_id": request_id,
                    "account": out.account,
                    "stock": out.stock,
                })),
            )
        }
        Err(PoolError::CooldownActive { remaining }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "request_id": request_id,
                "error": "cooldown_active",
                "retry_after_secs": remaining.as_secs_f64().ceil() as u64,
            })),
        ),
        Err(PoolError::PoolExhausted) => (
            StatusCode::CONFLICT,
            Json(json!({
                "request_id": request_id,
                "error": "out_of_stock",
                "message": "no accounts in stock",
            })),
        ),
        Err(e) => {
            warn!(request_id, requester = body.requester_id, error = %e, "checkout failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "request_id": request_id,
                    "error": "storage",
                    "message": e.to_string(),
                })),
            )
        }
    }
}

/// POST /restore — compensate a failed delivery.
pub async fn restore(
    State(state): State<AppState>,
    Json(body): Json<RestoreRequest>,
) -> impl IntoResponse {
    if body.account.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "invalid_account", "message": "empty account string"})),
        );
    }

    match state.accounts.restore(body.account).await {
        Ok(()) => {
            let stock = state.accounts.stock().await;
            (StatusCode::OK, Json(json!({"stock": stock})))
        }
        Err(e) => {
            warn!(error = %e, "restore failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "storage", "message": e.to_string()})),
            )
        }
    }
}

/// GET /stock
pub async fn stock(State(state): State<AppState>) -> impl IntoResponse {
    let stock = state.accounts.stock().await;
    Json(json!({"stock": stock}))
}

/// GET /version — cached read, refetching only when empty or stale.
pub async fn version(State(state): State<AppState>) -> impl IntoResponse {
    match state.version.get().await {
        Ok(info) => (
            StatusCode::OK,
            Json(json!({"version": info.version, "date": info.date})),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "version_unavailable", "message": e.to_string()})),
        ),
    }
}

/// GET /status — the line a presence display is currently showing.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": state.rotation.current().await}))
}

/// GET /health — stock plus version cache state.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stock = state.accounts.stock().await;
    let cache_state = state.version.state().await;
    let status = if stock > 0 { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "stock": stock,
        "version_cache": cache_state.label(),
    }))
}

/// GET /metrics — Prometheus text exposition.
pub async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    state.prometheus.render()
}
