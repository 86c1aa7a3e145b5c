//! Command usage analytics
//!
//! Per-requester, per-command counters with the unix time of last use,
//! persisted to a JSON file with the same atomic-write discipline as the
//! account store. Recording is best-effort: a failed write is logged and
//! the in-memory counters keep going, since analytics must never fail a
//! user-facing command.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Usage counters for one command by one requester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStats {
    pub count: u64,
    pub last_used_unix: u64,
}

/// One row of a leaderboard for a single command.
#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub user: String,
    pub count: u64,
    pub last_used_unix: u64,
}

type UsageMap = HashMap<String, HashMap<String, CommandStats>>;

/// File-backed usage analytics keyed by requester, then command.
pub struct Analytics {
    path: PathBuf,
    state: Mutex<UsageMap>,
}

impl Analytics {
    /// Load analytics from disk. Missing or unparseable data starts fresh —
    /// usage history is not worth refusing to boot over.
    pub async fn load(path: PathBuf) -> Self {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<UsageMap>(&contents) {
                Ok(data) => {
                    info!(path = %path.display(), users = data.len(), "loaded analytics");
                    data
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "analytics file corrupt, starting fresh");
                    UsageMap::new()
                }
            },
            Err(_) => UsageMap::new(),
        };
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Count one use of `command` by `user` and persist.
    pub async fn record(&self, user: &str, command: &str) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut state = self.state.lock().await;
        let stats = state
            .entry(user.to_string())
            .or_default()
            .entry(command.to_string())
            .or_insert(CommandStats {
                count: 0,
                last_used_unix: 0,
            });
        stats.count += 1;
        stats.last_used_unix = now;

        if let Err(e) = write_atomic(&self.path, &state).await {
            warn!(error = %e, "failed to persist analytics");
        }
        debug!(user, command, "recorded command use");
    }

    /// Full usage map as JSON for the admin endpoint.
    pub async fn snapshot(&self) -> serde_json::Value {
        let state = self.state.lock().await;
        serde_json::to_value(&*state).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Top users of one command, sorted by count descending, at most ten.
    pub async fn leaderboard(&self, command: &str) -> Vec<LeaderboardEntry> {
        let state = self.state.lock().await;
        let mut rows: Vec<LeaderboardEntry> = state
            .iter()
            .filter_map(|(user, commands)| {
                commands.get(command).map(|stats| LeaderboardEntry {
                    user: user.clone(),
                    count: stats.count,
                    last_used_unix: stats.last_used_unix,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.user.cmp(&b.user)));
        rows.truncate(10);
        rows
    }
}

async fn write_atomic(path: &Path, data: &UsageMap) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let tmp_path = dir.join(format!(".analytics.tmp.{}", std::process::id()));
    tokio::fs::write(&tmp_path, json.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_counts_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.json");

        let analytics = Analytics::load(path.clone()).await;
        analytics.record("1001", "checkout").await;
        analytics.record("1001", "checkout").await;
        analytics.record("1002", "checkout").await;

        // Reload from disk into a fresh instance
        let reloaded = Analytics::load(path).await;
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot["1001"]["checkout"]["count"], 2);
        assert_eq!(snapshot["1002"]["checkout"]["count"], 1);
    }

    #[tokio::test]
    async fn corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.json");
        tokio::fs::write(&path, "{broken").await.unwrap();

        let analytics = Analytics::load(path).await;
        assert_eq!(analytics.snapshot().await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn leaderboard_sorts_by_count_descending() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = Analytics::load(dir.path().join("analytics.json")).await;

        for _ in 0..3 {
            analytics.record("alice", "checkout").await;
        }
        analytics.record("bob", "checkout").await;
        analytics.record("bob", "refresh").await;

        let rows = analytics.leaderboard("checkout").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user, "alice");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[1].user, "bob");
        assert_eq!(rows[1].count, 1);

        assert!(analytics.leaderboard("stock").await.is_empty());
    }

    #[tokio::test]
    async fn leaderboard_is_capped_at_ten() {
        let dir = tempfile::tempdir().unwrap();
        let analytics = Analytics::load(dir.path().join("analytics.json")).await;

        for i in 0..15 {
            analytics.record(&format!("user{i}"), "checkout").await;
        }
        assert_eq!(analytics.leaderboard("checkout").await.len(), 10);
    }
}
