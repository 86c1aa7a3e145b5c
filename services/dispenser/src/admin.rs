//! Admin API: account intake and version cache control
//!
//! Every handler checks the `x-admin-token` header against the configured
//! token. The core never sees authorization — it only ever runs on behalf
//! of a caller the service has already judged privileged. With no token
//! configured, the admin surface refuses everything.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use account_pool::Error as PoolError;
use roblox_version::RefreshOutcome;

use crate::AppState;

#[derive(Deserialize)]
pub struct AddAccountRequest {
    pub account: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub requester_id: u64,
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(token) = &state.admin_token else {
        return false;
    };
    headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| provided == token.expose().as_str())
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized"})),
    )
}

/// POST /admin/accounts — validate and append one account.
pub async fn add_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AddAccountRequest>,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    match state.accounts.add(&body.account).await {
        Ok(stock) => {
            state.analytics.record("admin", "add_account").await;
            info!(stock, "admin added account");
            (StatusCode::OK, Json(json!({"stock": stock})))
        }
        Err(e @ PoolError::InvalidAccount(_)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "invalid_account", "message": e.to_string()})),
        ),
        Err(PoolError::Duplicate) => (
            StatusCode::CONFLICT,
            Json(json!({"error": "duplicate_account", "message": "account is already in stock"})),
        ),
        Err(e) => {
            warn!(error = %e, "admin add failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "storage", "message": e.to_string()})),
            )
        }
    }
}

/// POST /admin/version/refresh — force refresh, bypassing the TTL.
///
/// The per-requester refresh cooldown is consumed by the attempt itself,
/// so a failed fetch still blocks the next attempt for the full window.
pub async fn refresh_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    match state.version.force_refresh(body.requester_id).await {
        RefreshOutcome::Refreshed(info) => {
            state
                .analytics
                .record(&body.requester_id.to_string(), "refresh_version")
                .await;
            (
                StatusCode::OK,
                Json(json!({
                    "refreshed": true,
                    "version": info.version,
                    "date": info.date,
                })),
            )
        }
        RefreshOutcome::CoolingDown { remaining, cached } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "cooldown_active",
                "retry_after_secs": remaining.as_secs_f64().ceil() as u64,
                "version": cached.map(|v| v.version),
            })),
        ),
        RefreshOutcome::FetchFailed(cached) => {
            state
                .analytics
                .record(&body.requester_id.to_string(), "refresh_version")
                .await;
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "fetch_failed",
                    "version": cached.map(|v| v.version),
                })),
            )
        }
    }
}

/// GET /admin/analytics — full usage map.
pub async fn analytics_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(state.analytics.snapshot().await))
}

/// GET /admin/leaderboard/{command} — top users of one command.
pub async fn leaderboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(command): Path<String>,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    let rows = state.analytics.leaderboard(&command).await;
    if rows.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no_data", "command": command})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"command": command, "leaders": rows})),
    )
}
