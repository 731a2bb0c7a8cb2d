//! User account storage.
//!
//! # Data Flow
//! ```text
//! admin init handler
//!     → users.rs (create account, hash password)
//!     → DashMap (in-memory, shared)
//!     → JSON file (on save, optional)
//!
//! Startup watchdog:
//!     → UserStore::has_administrator() at its deadline
//! ```
//!
//! # Design Decisions
//! - The watchdog only sees the narrow `UserStore` trait
//! - Queries are synchronous and cheap; callers that must bound them do so themselves

pub mod users;

use thiserror::Error;

pub use users::{Role, User, UserRepository};

/// Errors raised by the user store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the data file failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The data file could not be encoded or decoded.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An account with this username already exists.
    #[error("username '{0}' is already taken")]
    DuplicateUsername(String),

    /// The password could not be hashed.
    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// The store cannot answer right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The single query the startup watchdog needs.
pub trait UserStore: Send + Sync {
    /// Does at least one administrator account exist?
    fn has_administrator(&self) -> Result<bool, StoreError>;
}
