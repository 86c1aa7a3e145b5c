//! Checkout, add and restore operations over the durable pool
//!
//! One tokio `Mutex` guards the in-memory pool, the cooldown map and the
//! persist step together. Holding the lock across the durable write is what
//! upholds at-most-once delivery: a second checkout cannot observe the pool
//! until the first one has either persisted or rolled back.
//!
//! A mutation is committed only once the file write succeeds. If the write
//! fails, the in-memory pool is restored to its pre-mutation state and the
//! caller gets [`Error::Store`], so memory and disk never diverge.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::PoolStore;

/// Stable requester identity supplied by the caller. Not validated here.
pub type RequesterId = u64;

/// Cooldown entries older than this multiple of the window are evicted on
/// the next successful checkout, bounding the map without ever evicting an
/// entry that could still refuse a checkout.
const COOLDOWN_RETENTION_FACTOR: u32 = 4;

/// A successful checkout: the popped account and the stock left behind.
#[derive(Debug)]
pub struct CheckedOut {
    pub account: String,
    pub stock: usize,
}

struct PoolState {
    accounts: Vec<String>,
    cooldowns: HashMap<RequesterId, Instant>,
}

/// Account pool manager.
///
/// `accounts` is FIFO: adds append to the back, checkouts pop the front,
/// restores re-insert at the front so a failed delivery is retried before
/// the rest of the queue.
pub struct AccountManager {
    store: PoolStore,
    cooldown: Duration,
    state: Mutex<PoolState>,
}

impl AccountManager {
    /// Load the pool from the given file, creating it on cold start.
    pub async fn load(path: PathBuf, cooldown: Duration) -> Result<Self> {
        let store = PoolStore::new(path);
        let accounts = store.load().await?;
        metrics::gauge!("pool_stock").set(accounts.len() as f64);
        info!(stock = accounts.len(), cooldown_secs = cooldown.as_secs(), "account manager ready");
        Ok(Self {
            store,
            cooldown,
            state: Mutex::new(PoolState {
                accounts,
                cooldowns: HashMap::new(),
            }),
        })
    }

    /// Validate and append an account, persisting the grown pool.
    ///
    /// Returns the resulting stock count. Malformed or duplicate input is
    /// rejected without touching the store.
    pub async fn add(&self, raw: &str) -> Result<usize> {
        let account = validate_account(raw)?;

        let mut state = self.state.lock().await;
        if state.accounts.contains(&account) {
            metrics::counter!("pool_adds_total", "outcome" => "duplicate").increment(1);
            return Err(Error::Duplicate);
        }

        state.accounts.push(account);
        if let Err(e) = self.store.save(&state.accounts).await {
            state.accounts.pop();
            warn!(error = %e, "persist failed, add rolled back");
            metrics::counter!("pool_adds_total", "outcome" => "store_error").increment(1);
            return Err(e);
        }

        let stock = state.accounts.len();
        metrics::counter!("pool_adds_total", "outcome" => "ok").increment(1);
        metrics::gauge!("pool_stock").set(stock as f64);
        info!(stock, "account added to pool");
        Ok(stock)
    }

    /// Pop the front account for the given requester.
    ///
    /// Refusal order: cooldown first (the requester is told how long to
    /// wait even when the pool is empty), then stock. The cooldown is
    /// stamped only after the shortened pool has been persisted — a failed
    /// persist neither consumes the account nor the requester's window.
    pub async fn checkout(&self, requester: RequesterId) -> Result<CheckedOut> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if let Some(last) = state.cooldowns.get(&requester) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                debug!(requester, remaining_secs = remaining.as_secs(), "checkout refused, cooldown active");
                metrics::counter!("pool_checkouts_total", "outcome" => "cooldown").increment(1);
                return Err(Error::CooldownActive { remaining });
            }
        }

        if state.accounts.is_empty() {
            metrics::counter!("pool_checkouts_total", "outcome" => "out_of_stock").increment(1);
            return Err(Error::PoolExhausted);
        }

        let account = state.accounts.remove(0);
        if let Err(e) = self.store.save(&state.accounts).await {
            state.accounts.insert(0, account);
            warn!(requester, error = %e, "persist failed, checkout rolled back");
            metrics::counter!("pool_checkouts_total", "outcome" => "store_error").increment(1);
            return Err(e);
        }

        let retention = self.cooldown * COOLDOWN_RETENTION_FACTOR;
        state.cooldowns.retain(|_, last| now.duration_since(*last) < retention);
        state.cooldowns.insert(requester, now);

        let stock = state.accounts.len();
        metrics::counter!("pool_checkouts_total", "outcome" => "ok").increment(1);
        metrics::gauge!("pool_stock").set(stock as f64);
        info!(requester, stock, "account checked out");
        Ok(CheckedOut { account, stock })
    }

    /// Put an account back at the front of the queue after a failed
    /// delivery. The requester's cooldown is deliberately left in place.
    pub async fn restore(&self, account: String) -> Result<()> {
        let mut state = self.state.lock().await;
        state.accounts.insert(0, account);
        if let Err(e) = self.store.save(&state.accounts).await {
            state.accounts.remove(0);
            warn!(error = %e, "persist failed, restore rolled back");
            metrics::counter!("pool_restores_total", "outcome" => "store_error").increment(1);
            return Err(e);
        }

        let stock = state.accounts.len();
        metrics::counter!("pool_restores_total", "outcome" => "ok").increment(1);
        metrics::gauge!("pool_stock").set(stock as f64);
        info!(stock, "account restored to front of pool");
        Ok(())
    }

    /// Current pool length. Always equals the persisted length, since every
    /// mutation either persisted or rolled back before releasing the lock.
    pub async fn stock(&self) -> usize {
        self.state.lock().await.accounts.len()
    }

    /// One-line stock summary for status rotation.
    pub async fn status_text(&self) -> String {
        match self.stock().await {
            1 => "1 account in stock.".to_string(),
            n => format!("{n} accounts in stock."),
        }
    }
}

/// Deterministic account validation: trimmed, no interior whitespace, and
/// a `user:pass` shape with both sides non-empty. The password may itself
/// contain `:`.
fn validate_account(raw: &str) -> Result<String> {
    let account = raw.trim();
    if account.is_empty() {
        return Err(Error::InvalidAccount("empty account string".into()));
    }
    if account.chars().any(char::is_whitespace) {
        return Err(Error::InvalidAccount(
            "account string must not contain whitespace".into(),
        ));
    }
    match account.split_once(':') {
        Some((user, pass)) if !user.is_empty() && !pass.is_empty() => Ok(account.to_string()),
        _ => Err(Error::InvalidAccount(
            "expected user:pass with both parts non-empty".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn manager_with(
        dir: &tempfile::TempDir,
        accounts: &[&str],
        cooldown: Duration,
    ) -> AccountManager {
        let path = dir.path().join("accounts.json");
        let initial: Vec<String> = accounts.iter().map(|s| (*s).to_string()).collect();
        PoolStore::new(path.clone()).save(&initial).await.unwrap();
        AccountManager::load(path, cooldown).await.unwrap()
    }

    async fn persisted(dir: &tempfile::TempDir) -> Vec<String> {
        let contents = tokio::fs::read_to_string(dir.path().join("accounts.json"))
            .await
            .unwrap();
        serde_json::from_str(&contents).unwrap()
    }

    #[tokio::test]
    async fn add_appends_to_the_back_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &[], Duration::from_secs(300)).await;

        assert_eq!(manager.add("amy:pass123").await.unwrap(), 1);
        assert_eq!(manager.add("zoe:hunter2").await.unwrap(), 2);

        assert_eq!(manager.stock().await, 2);
        assert_eq!(persisted(&dir).await, vec!["amy:pass123", "zoe:hunter2"]);
    }

    #[tokio::test]
    async fn add_rejects_malformed_input_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &[], Duration::from_secs(300)).await;

        for raw in ["", "   ", "nopass", "user:", ":pass", "us er:pass", "user: pass"] {
            let err = manager.add(raw).await.unwrap_err();
            assert!(matches!(err, Error::InvalidAccount(_)), "{raw:?} gave {err:?}");
        }

        assert_eq!(manager.stock().await, 0);
        assert!(persisted(&dir).await.is_empty());
    }

    #[tokio::test]
    async fn add_trims_surrounding_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &[], Duration::from_secs(300)).await;

        manager.add("  amy:pass123\n").await.unwrap();
        assert_eq!(persisted(&dir).await, vec!["amy:pass123"]);
    }

    #[tokio::test]
    async fn add_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &["amy:pass123"], Duration::from_secs(300)).await;

        let err = manager.add("amy:pass123").await.unwrap_err();
        assert!(matches!(err, Error::Duplicate));
        assert_eq!(manager.stock().await, 1);
    }

    #[tokio::test]
    async fn checkout_serves_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &["a1:p", "a2:p", "a3:p"], Duration::from_secs(300)).await;

        assert_eq!(manager.checkout(1).await.unwrap().account, "a1:p");
        assert_eq!(manager.checkout(2).await.unwrap().account, "a2:p");
        assert_eq!(manager.checkout(3).await.unwrap().account, "a3:p");
    }

    #[tokio::test]
    async fn checkout_on_empty_pool_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &[], Duration::from_secs(300)).await;

        let err = manager.checkout(1).await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted));
        assert_eq!(manager.stock().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_checkout_within_window_is_refused_with_remaining() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &["a1:p", "a2:p"], Duration::from_secs(300)).await;

        manager.checkout(7).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        let err = manager.checkout(7).await.unwrap_err();
        match err {
            Error::CooldownActive { remaining } => {
                assert!(remaining <= Duration::from_secs(290), "remaining: {remaining:?}");
                assert!(remaining > Duration::from_secs(289), "remaining: {remaining:?}");
            }
            other => panic!("expected CooldownActive, got {other:?}"),
        }
        // Refusal does not mutate the pool
        assert_eq!(manager.stock().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn checkout_succeeds_after_window_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &["a1:p", "a2:p"], Duration::from_secs(300)).await;

        manager.checkout(7).await.unwrap();
        tokio::time::advance(Duration::from_secs(300)).await;
        let out = manager.checkout(7).await.unwrap();
        assert_eq!(out.account, "a2:p");
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_refuses_even_when_pool_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &["a1:p"], Duration::from_secs(300)).await;

        manager.checkout(7).await.unwrap();
        let err = manager.checkout(7).await.unwrap_err();
        assert!(matches!(err, Error::CooldownActive { .. }), "got: {err:?}");
    }

    /// The full restore scenario: a failed delivery puts the account back
    /// at the front without refunding the cooldown, and the next requester
    /// gets the restored account before the rest of the queue.
    #[tokio::test(start_paused = true)]
    async fn restore_gives_front_priority_and_keeps_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &["A1:p", "A2:p"], Duration::from_secs(300)).await;

        let out = manager.checkout(1).await.unwrap();
        assert_eq!(out.account, "A1:p");
        assert_eq!(persisted(&dir).await, vec!["A2:p"]);

        // Delivery failed; the account goes back but U1 stays on cooldown
        manager.restore("A1:p".to_string()).await.unwrap();
        assert_eq!(persisted(&dir).await, vec!["A1:p", "A2:p"]);

        let err = manager.checkout(1).await.unwrap_err();
        assert!(matches!(err, Error::CooldownActive { .. }));

        let out = manager.checkout(2).await.unwrap();
        assert_eq!(out.account, "A1:p", "restored account must be served first");
        assert_eq!(persisted(&dir).await, vec!["A2:p"]);
    }

    #[tokio::test]
    async fn stock_always_matches_persisted_length() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &[], Duration::from_secs(0)).await;

        manager.add("a1:p").await.unwrap();
        assert_eq!(manager.stock().await, persisted(&dir).await.len());

        manager.add("a2:p").await.unwrap();
        assert_eq!(manager.stock().await, persisted(&dir).await.len());

        manager.checkout(1).await.unwrap();
        assert_eq!(manager.stock().await, persisted(&dir).await.len());

        manager.restore("a1:p".to_string()).await.unwrap();
        assert_eq!(manager.stock().await, persisted(&dir).await.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_never_share_an_account() {
        let dir = tempfile::tempdir().unwrap();
        let accounts: Vec<String> = (0..8).map(|i| format!("acct{i}:p")).collect();
        let refs: Vec<&str> = accounts.iter().map(String::as_str).collect();
        let manager = Arc::new(manager_with(&dir, &refs, Duration::from_secs(300)).await);

        let mut handles = Vec::new();
        for requester in 0..12u64 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.checkout(requester).await }));
        }

        let mut delivered = Vec::new();
        let mut exhausted = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(out) => delivered.push(out.account),
                Err(Error::PoolExhausted) => exhausted += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(delivered.len(), 8);
        assert_eq!(exhausted, 4);
        let unique: std::collections::HashSet<_> = delivered.iter().collect();
        assert_eq!(unique.len(), delivered.len(), "an account was delivered twice");
        assert_eq!(manager.stock().await, 0);
    }

    #[tokio::test]
    async fn persist_failure_rolls_back_add() {
        let dir = tempfile::tempdir().unwrap();
        let pool_dir = dir.path().join("pool");
        tokio::fs::create_dir(&pool_dir).await.unwrap();
        let manager =
            AccountManager::load(pool_dir.join("accounts.json"), Duration::from_secs(300))
                .await
                .unwrap();

        tokio::fs::remove_dir_all(&pool_dir).await.unwrap();
        let err = manager.add("amy:pass123").await.unwrap_err();
        assert!(matches!(err, Error::Store(_)), "got: {err:?}");
        assert_eq!(manager.stock().await, 0, "failed add must not grow the pool");
    }

    #[tokio::test]
    async fn persist_failure_rolls_back_checkout_and_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let pool_dir = dir.path().join("pool");
        tokio::fs::create_dir(&pool_dir).await.unwrap();
        let path = pool_dir.join("accounts.json");
        PoolStore::new(path.clone())
            .save(&["a1:p".into(), "a2:p".into()])
            .await
            .unwrap();
        let manager = AccountManager::load(path, Duration::from_secs(300)).await.unwrap();

        tokio::fs::remove_dir_all(&pool_dir).await.unwrap();
        let err = manager.checkout(7).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)), "got: {err:?}");
        assert_eq!(manager.stock().await, 2, "failed checkout must not shrink the pool");

        // Store comes back: the same requester retries immediately (no
        // cooldown was stamped) and gets the same front account.
        tokio::fs::create_dir(&pool_dir).await.unwrap();
        let out = manager.checkout(7).await.unwrap();
        assert_eq!(out.account, "a1:p");
    }

    #[tokio::test]
    async fn status_text_counts_stock() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(&dir, &["a1:p"], Duration::from_secs(300)).await;
        assert_eq!(manager.status_text().await, "1 account in stock.");

        manager.add("a2:p").await.unwrap();
        assert_eq!(manager.status_text().await, "2 accounts in stock.");
    }

    #[test]
    fn validate_accepts_password_containing_colon() {
        assert_eq!(
            validate_account("amy:pa:ss").unwrap(),
            "amy:pa:ss",
            "only the first colon splits user from pass"
        );
    }
}
