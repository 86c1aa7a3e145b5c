//! Single-use account pool with per-requester checkout cooldown
//!
//! Owns the stock of account strings handed out to requesters. The pool is
//! an ordered FIFO list backed by a JSON file; the file is the durable
//! source of truth and is rewritten on every mutation. A single mutex
//! covers the whole read-check-mutate-persist sequence, so two concurrent
//! checkouts can never receive the same account.
//!
//! Account lifecycle:
//! 1. Admin adds a `user:pass` string → validated, appended to the back
//! 2. Requester checks out → front of the queue popped, cooldown stamped
//! 3. Delivery fails → caller restores the account to the **front** so the
//!    next checkout retries it first
//! 4. Restore does not refund the requester's cooldown

pub mod error;
pub mod manager;
pub mod store;

pub use error::{Error, Result};
pub use manager::{AccountManager, CheckedOut, RequesterId};
pub use store::PoolStore;
