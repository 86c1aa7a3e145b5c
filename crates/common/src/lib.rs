//! Shared types for the account dispenser workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
