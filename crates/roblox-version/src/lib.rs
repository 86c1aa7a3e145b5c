//! Cached view of the current Roblox client version
//!
//! The remote client-settings endpoint is slow and occasionally flaky, so
//! callers never talk to it directly. [`cache::VersionCache`] owns the last
//! fetched snapshot and refreshes it only when the snapshot has outlived
//! its TTL or a privileged caller forces a refresh. A failed refresh keeps
//! the last known good snapshot; "no data" is only surfaced before the
//! first successful fetch.
//!
//! The network call itself lives behind the [`fetcher::VersionFetcher`]
//! trait so the cache can be driven by a scripted fetcher in tests.

pub mod cache;
pub mod error;
pub mod fetcher;

pub use cache::{CacheState, RefreshOutcome, VersionCache};
pub use error::{Error, Result};
pub use fetcher::{ClientSettingsFetcher, VersionFetcher, VersionInfo, WINDOWS_CLIENT_VERSION_ENDPOINT};
