//! Error types for version fetching and caching

/// Errors from version operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("version fetch failed: {0}")]
    Fetch(String),

    /// No snapshot has ever been fetched and the attempt just failed.
    /// Once any snapshot exists, fetch failures are absorbed and the old
    /// snapshot is served instead of this error.
    #[error("Roblox version unavailable")]
    Unavailable,
}

/// Result alias for version operations.
pub type Result<T> = std::result::Result<T, Error>;
