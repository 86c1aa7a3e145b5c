//! Rotating one-line status display
//!
//! A fixed, ordered list of providers, each rendering one line from live
//! manager state. The line shown is a pure function of a monotonically
//! increasing tick counter (index = tick mod providers), so the rotation
//! has no hidden state and any tick can be re-rendered deterministically.
//! A background task advances the tick on a fixed interval and logs the
//! current line.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use account_pool::AccountManager;
use roblox_version::VersionCache;
use tracing::info;

/// One status line backed by live state.
///
/// `Pin<Box<dyn Future>>` return type for dyn-compatibility, since the
/// rotation holds `Box<dyn StatusText>` providers.
pub trait StatusText: Send + Sync {
    fn render_text(&self) -> Pin<Box<dyn Future<Output = String> + Send + '_>>;
}

/// Current stock summary.
pub struct StockStatus(pub Arc<AccountManager>);

impl StatusText for StockStatus {
    fn render_text(&self) -> Pin<Box<dyn Future<Output = String> + Send + '_>> {
        Box::pin(async move { self.0.status_text().await })
    }
}

/// Current cached Roblox version.
pub struct VersionStatus(pub Arc<VersionCache>);

impl StatusText for VersionStatus {
    fn render_text(&self) -> Pin<Box<dyn Future<Output = String> + Send + '_>> {
        Box::pin(async move { self.0.status_text().await })
    }
}

/// Fixed usage-hint line.
pub struct StaticStatus(pub &'static str);

impl StatusText for StaticStatus {
    fn render_text(&self) -> Pin<Box<dyn Future<Output = String> + Send + '_>> {
        Box::pin(std::future::ready(self.0.to_string()))
    }
}

/// Ordered provider list plus the tick counter.
pub struct StatusRotation {
    providers: Vec<Box<dyn StatusText>>,
    tick: AtomicU64,
}

impl StatusRotation {
    pub fn new(providers: Vec<Box<dyn StatusText>>) -> Self {
        Self {
            providers,
            tick: AtomicU64::new(0),
        }
    }

    /// The standard four-line rotation: stock, two usage hints, version.
    pub fn standard(accounts: Arc<AccountManager>, version: Arc<VersionCache>) -> Self {
        Self::new(vec![
            Box::new(StockStatus(accounts)),
            Box::new(StaticStatus("POST /checkout for a free account")),
            Box::new(StaticStatus("GET /stock to check the balance")),
            Box::new(VersionStatus(version)),
        ])
    }

    /// Render the line for an arbitrary tick. Pure in the tick: the same
    /// tick always selects the same provider.
    pub async fn render(&self, tick: u64) -> String {
        let index = (tick as usize) % self.providers.len();
        self.providers[index].render_text().await
    }

    /// Claim the next tick for display.
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Re-render the most recently displayed line.
    pub async fn current(&self) -> String {
        let displayed = self.tick.load(Ordering::Relaxed).saturating_sub(1);
        self.render(displayed).await
    }
}

/// Spawn the rotation task: every `interval` it advances the tick and logs
/// the line that a presence display would show.
pub fn spawn_rotation_task(
    rotation: Arc<StatusRotation>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let tick = rotation.advance();
            let line = rotation.render(tick).await;
            info!(tick, status = %line, "status rotation");
        }
    })
}
