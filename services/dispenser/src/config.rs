//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The admin token is loaded from the DISPENSER_ADMIN_TOKEN env var or
//! admin.token_file, never from the TOML directly, to avoid leaking
//! secrets through checked-in config files.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub version: VersionConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Account pool settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub accounts_file: PathBuf,
    /// Minimum seconds between two checkouts by the same requester
    pub checkout_cooldown_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            accounts_file: PathBuf::from("accounts.json"),
            checkout_cooldown_secs: 300,
        }
    }
}

/// Version cache settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VersionConfig {
    pub endpoint: String,
    /// Snapshot age after which a read refetches
    pub ttl_secs: u64,
    /// Minimum seconds between two force refreshes by the same requester
    pub refresh_cooldown_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            endpoint: roblox_version::WINDOWS_CLIENT_VERSION_ENDPOINT.to_string(),
            ttl_secs: 300,
            refresh_cooldown_secs: 60,
            fetch_timeout_secs: 10,
        }
    }
}

/// Admin endpoint settings
#[derive(Debug, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(skip)]
    pub token: Option<Secret<String>>,
    /// Path to a file containing the admin token (alternative to the
    /// DISPENSER_ADMIN_TOKEN env var). With neither set, the admin
    /// endpoints refuse every request.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

/// Status rotation settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub rotation_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { rotation_secs: 30 }
    }
}

/// Usage analytics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub file: PathBuf,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("analytics.json"),
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Admin token resolution order:
    /// 1. DISPENSER_ADMIN_TOKEN env var
    /// 2. admin.token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.version.endpoint.starts_with("http://")
            && !config.version.endpoint.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "version.endpoint must start with http:// or https://, got: {}",
                config.version.endpoint
            )));
        }

        if config.pool.checkout_cooldown_secs == 0 {
            return Err(common::Error::Config(
                "pool.checkout_cooldown_secs must be greater than 0".into(),
            ));
        }

        if config.version.fetch_timeout_secs == 0 {
            return Err(common::Error::Config(
                "version.fetch_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server.max_connections must be greater than 0".into(),
            ));
        }

        if config.status.rotation_secs == 0 {
            return Err(common::Error::Config(
                "status.rotation_secs must be greater than 0".into(),
            ));
        }

        // Resolve admin token: env var takes precedence over file
        if let Ok(token) = std::env::var("DISPENSER_ADMIN_TOKEN") {
            config.admin.token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.admin.token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read admin token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.admin.token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("account-dispenser.toml")
    }
}
