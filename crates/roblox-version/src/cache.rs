//! TTL cache and force-refresh cooldown over the version fetcher
//!
//! State machine over the snapshot:
//! - Empty: nothing fetched yet; a read must hit the network
//! - Fresh: snapshot younger than the TTL; reads are served from memory
//! - Stale: snapshot outlived the TTL; a read refetches, and on failure
//!   keeps serving the old snapshot (last known good)
//!
//! The snapshot check, fetch and update all run under one tokio `Mutex`,
//! so at most one fetch is in flight per cache; concurrent callers that
//! arrive during a fetch wait on the lock and then read the fresh result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fetcher::{VersionFetcher, VersionInfo};

/// Refresh marks older than this multiple of the window are evicted on the
/// next permitted force-refresh.
const REFRESH_RETENTION_FACTOR: u32 = 4;

/// Observable cache state, for health reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
}

impl CacheState {
    pub fn label(&self) -> &'static str {
        match self {
            CacheState::Empty => "empty",
            CacheState::Fresh => "fresh",
            CacheState::Stale => "stale",
        }
    }
}

/// Outcome of a force-refresh attempt.
///
/// Force-refresh never fails as a Rust error: a blocked or failed attempt
/// still has a meaningful answer (the cached snapshot, if any) and the
/// caller decides how to render it.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The network call succeeded and the snapshot was replaced.
    Refreshed(VersionInfo),
    /// The attempt ran but the fetch failed; the cooldown was consumed and
    /// the snapshot is unchanged.
    FetchFailed(Option<VersionInfo>),
    /// The requester is still inside the refresh window; no network call
    /// was made.
    CoolingDown {
        remaining: Duration,
        cached: Option<VersionInfo>,
    },
}

struct Snapshot {
    info: VersionInfo,
    fetched_at: Instant,
}

struct CacheInner {
    snapshot: Option<Snapshot>,
    refresh_marks: HashMap<u64, Instant>,
}

/// Cached view of the remote version with TTL and per-requester
/// force-refresh cooldown. The refresh cooldown is a separate namespace
/// from the account checkout cooldown.
pub struct VersionCache {
    fetcher: Arc<dyn VersionFetcher>,
    ttl: Duration,
    refresh_cooldown: Duration,
    inner: Mutex<CacheInner>,
}

impl VersionCache {
    pub fn new(fetcher: Arc<dyn VersionFetcher>, ttl: Duration, refresh_cooldown: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            refresh_cooldown,
            inner: Mutex::new(CacheInner {
                snapshot: None,
                refresh_marks: HashMap::new(),
            }),
        }
    }

    /// Read the current version, fetching only when Empty or Stale.
    ///
    /// A Fresh snapshot is returned without any network call. On a failed
    /// fetch the old snapshot is returned untouched; `Unavailable` is only
    /// possible before the first successful fetch.
    pub async fn get(&self) -> Result<VersionInfo> {
        let mut inner = self.inner.lock().await;

        if let Some(snapshot) = &inner.snapshot {
            if snapshot.fetched_at.elapsed() < self.ttl {
                debug!(version = %snapshot.info.version, "serving fresh version snapshot");
                return Ok(snapshot.info.clone());
            }
        }

        match self.fetcher.fetch_latest().await {
            Ok(fetched) => {
                metrics::counter!("version_fetches_total", "result" => "ok").increment(1);
                info!(version = %fetched.version, "version snapshot refreshed");
                inner.snapshot = Some(Snapshot {
                    info: fetched.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(fetched)
            }
            Err(e) => {
                metrics::counter!("version_fetches_total", "result" => "error").increment(1);
                match &inner.snapshot {
                    Some(snapshot) => {
                        warn!(error = %e, "version fetch failed, serving last known good");
                        Ok(snapshot.info.clone())
                    }
                    None => {
                        warn!(error = %e, "version fetch failed with no snapshot to fall back on");
                        Err(Error::Unavailable)
                    }
                }
            }
        }
    }

    /// Fetch unconditionally, bypassing the TTL, rate-limited per requester.
    ///
    /// The requester's refresh mark is stamped on the attempt, before the
    /// fetch runs, so a failed fetch still consumes the window. The
    /// snapshot is only replaced on success.
    pub async fn force_refresh(&self, requester: u64) -> RefreshOutcome {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        if let Some(mark) = inner.refresh_marks.get(&requester) {
            let elapsed = now.duration_since(*mark);
            if elapsed < self.refresh_cooldown {
                let remaining = self.refresh_cooldown - elapsed;
                debug!(requester, remaining_secs = remaining.as_secs(), "force refresh refused, cooldown active");
                metrics::counter!("version_force_refreshes_total", "outcome" => "cooldown")
                    .increment(1);
                return RefreshOutcome::CoolingDown {
                    remaining,
                    cached: inner.snapshot.as_ref().map(|s| s.info.clone()),
                };
            }
        }

        let retention = self.refresh_cooldown * REFRESH_RETENTION_FACTOR;
        inner.refresh_marks.retain(|_, mark| now.duration_since(*mark) < retention);
        inner.refresh_marks.insert(requester, now);

        match self.fetcher.fetch_latest().await {
            Ok(fetched) => {
                metrics::counter!("version_force_refreshes_total", "outcome" => "ok").increment(1);
                info!(requester, version = %fetched.version, "version snapshot force refreshed");
                inner.snapshot = Some(Snapshot {
                    info: fetched.clone(),
                    fetched_at: Instant::now(),
                });
                RefreshOutcome::Refreshed(fetched)
            }
            Err(e) => {
                metrics::counter!("version_force_refreshes_total", "outcome" => "error")
                    .increment(1);
                warn!(requester, error = %e, "force refresh fetch failed, snapshot unchanged");
                RefreshOutcome::FetchFailed(inner.snapshot.as_ref().map(|s| s.info.clone()))
            }
        }
    }

    /// Last fetched snapshot without triggering any network call.
    pub async fn cached(&self) -> Option<VersionInfo> {
        let inner = self.inner.lock().await;
        inner.snapshot.as_ref().map(|s| s.info.clone())
    }

    /// Current state of the snapshot relative to the TTL.
    pub async fn state(&self) -> CacheState {
        let inner = self.inner.lock().await;
        match &inner.snapshot {
            None => CacheState::Empty,
            Some(snapshot) if snapshot.fetched_at.elapsed() < self.ttl => CacheState::Fresh,
            Some(_) => CacheState::Stale,
        }
    }

    /// One-line version summary for status rotation.
    pub async fn status_text(&self) -> String {
        match self.cached().await {
            Some(info) => format!("Roblox version: {}", info.version),
            None => "Roblox version: unknown".to_string(),
        }
    }
}
