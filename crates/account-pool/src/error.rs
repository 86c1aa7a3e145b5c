//! Error types for pool operations

use std::time::Duration;

/// Errors from pool operations.
///
/// Every variant is reported to the caller as a result value; none of them
/// terminate the process. `Store` means the durable write failed and the
/// in-memory pool was rolled back to the pre-mutation state.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid account string: {0}")]
    InvalidAccount(String),

    #[error("account is already in stock")]
    Duplicate,

    #[error("checkout cooldown active: {}s remaining", .remaining.as_secs_f64().ceil())]
    CooldownActive { remaining: Duration },

    #[error("no accounts in stock")]
    PoolExhausted,

    #[error("account store error: {0}")]
    Store(String),

    #[error("account store corrupt: {0}")]
    Parse(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
