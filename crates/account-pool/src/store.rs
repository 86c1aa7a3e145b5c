//! Durable storage for the account pool
//!
//! Persists the ordered account list as a JSON array of strings. The whole
//! file is rewritten on every mutation via atomic temp-file + rename, so a
//! crash mid-write can never leave a half-written pool behind. Order is
//! preserved exactly across a save/load round trip; the front of the array
//! is the next account to be served.
//!
//! This module is storage only. Cooldown checks, validation and FIFO
//! semantics live in [`crate::manager`], which serializes access.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// File-backed store for the ordered account list.
pub struct PoolStore {
    path: PathBuf,
}

impl PoolStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the persisted pool.
    ///
    /// A missing file is a cold start: the store creates it as `[]` so
    /// later loads take the normal path. A file that exists but does not
    /// parse is an error — silently dropping stock would hand out nothing
    /// while admins believe accounts are loaded.
    pub async fn load(&self) -> Result<Vec<String>> {
        if self.path.exists() {
            let contents = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| Error::Store(format!("reading account file: {e}")))?;
            let accounts: Vec<String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Parse(format!("parsing account file: {e}")))?;
            info!(path = %self.path.display(), stock = accounts.len(), "loaded account pool");
            Ok(accounts)
        } else {
            info!(path = %self.path.display(), "account file not found, starting with empty pool");
            let accounts = Vec::new();
            self.save(&accounts).await?;
            Ok(accounts)
        }
    }

    /// Overwrite the persisted pool with the given ordered list.
    ///
    /// Writes to a temp file in the same directory, then renames it over
    /// the target. Permissions are 0600 since the file holds credentials.
    pub async fn save(&self, accounts: &[String]) -> Result<()> {
        let json = serde_json::to_string_pretty(accounts)
            .map_err(|e| Error::Parse(format!("serializing account pool: {e}")))?;

        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Store("account file path has no parent directory".into()))?;
        let tmp_path = dir.join(format!(".accounts.tmp.{}", std::process::id()));

        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|e| Error::Store(format!("writing temp account file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp_path, perms)
                .await
                .map_err(|e| Error::Store(format!("setting account file permissions: {e}")))?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| Error::Store(format!("renaming temp account file: {e}")))?;

        debug!(path = %self.path.display(), stock = accounts.len(), "persisted account pool");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_load_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = PoolStore::new(dir.path().join("accounts.json"));

        let accounts = vec![
            "zoe:hunter2".to_string(),
            "amy:pass123".to_string(),
            "mia:qwerty".to_string(),
        ];
        store.save(&accounts).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, accounts, "order must survive the round trip");
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let store = PoolStore::new(path.clone());

        assert!(!path.exists());
        let accounts = store.load().await.unwrap();
        assert!(accounts.is_empty());
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<String> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_not_an_empty_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = PoolStore::new(path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone").join("accounts.json");
        let store = PoolStore::new(path);

        let err = store.save(&["a:b".into()]).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)), "got: {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let store = PoolStore::new(path.clone());
        store.save(&["amy:pass123".into()]).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "account file must be 0600, got {mode:o}");
    }
}
