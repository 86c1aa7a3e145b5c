//! Account Dispenser
//!
//! Single-binary HTTP service that:
//! 1. Hands out single-use accounts from a durable FIFO pool
//! 2. Enforces a per-requester checkout cooldown
//! 3. Serves a TTL-cached view of the current Roblox client version
//! 4. Rotates a one-line status display and records usage analytics

mod admin;
mod analytics;
mod api;
mod config;
mod metrics;
mod status;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use account_pool::AccountManager;
use common::Secret;
use roblox_version::{ClientSettingsFetcher, VersionCache};

use crate::analytics::Analytics;
use crate::config::Config;
use crate::status::{StatusRotation, spawn_rotation_task};

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountManager>,
    pub version: Arc<VersionCache>,
    pub analytics: Arc<Analytics>,
    pub rotation: Arc<StatusRotation>,
    pub admin_token: Option<Arc<Secret<String>>>,
    pub prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// The concurrency limit layer caps in-flight requests at
/// `max_connections`; the metrics middleware labels every handled request
/// by matched path and status.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/checkout", post(api::checkout))
        .route("/restore", post(api::restore))
        .route("/stock", get(api::stock))
        .route("/version", get(api::version))
        .route("/status", get(api::status))
        .route("/health", get(api::health))
        .route("/metrics", get(api::metrics_text))
        .route("/admin/accounts", post(admin::add_account))
        .route("/admin/version/refresh", post(admin::refresh_version))
        .route("/admin/analytics", get(admin::analytics_snapshot))
        .route("/admin/leaderboard/{command}", get(admin::leaderboard))
        .layer(axum::middleware::from_fn(track_request))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Record every handled request with its matched route and status.
async fn track_request(request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |p| p.as_str().to_string());
    let start = std::time::Instant::now();
    let response = next.run(request).await;
    metrics::record_request(&path, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting account-dispenser");

    // Install the Prometheus recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        accounts_file = %config.pool.accounts_file.display(),
        checkout_cooldown_secs = config.pool.checkout_cooldown_secs,
        version_ttl_secs = config.version.ttl_secs,
        admin_enabled = config.admin.token.is_some(),
        "configuration loaded"
    );

    let accounts = Arc::new(
        AccountManager::load(
            config.pool.accounts_file.clone(),
            Duration::from_secs(config.pool.checkout_cooldown_secs),
        )
        .await
        .context("failed to load account pool")?,
    );

    let fetcher = ClientSettingsFetcher::new(
        reqwest::Client::new(),
        config.version.endpoint.clone(),
        Duration::from_secs(config.version.fetch_timeout_secs),
    );
    let version = Arc::new(VersionCache::new(
        Arc::new(fetcher),
        Duration::from_secs(config.version.ttl_secs),
        Duration::from_secs(config.version.refresh_cooldown_secs),
    ));

    let analytics = Arc::new(Analytics::load(config.analytics.file.clone()).await);

    let rotation = Arc::new(StatusRotation::standard(accounts.clone(), version.clone()));
    spawn_rotation_task(
        rotation.clone(),
        Duration::from_secs(config.status.rotation_secs),
    );

    let app_state = AppState {
        accounts,
        version,
        analytics,
        rotation,
        admin_token: config.admin.token.map(Arc::new),
        prometheus,
    };

    let router = build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("account-dispenser stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
