//! Identity primitives for Parley.
//!
//! - [`TokenValidator`] turns bearer tokens into an [`Identity`] and back.
//! - [`PasswordHasher`] wraps Argon2 behind an opaque hash/verify pair.
//! - [`SystemCapability`] gates privileged operations behind a configured key.

mod capability;
mod password;
mod token;

pub use capability::{SystemCapability, SystemGrant};
pub use password::PasswordHasher;
pub use token::{strip_bearer, Claims, Identity, TokenValidator};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to issue token: {0}")]
    TokenIssue(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("system capability is not configured")]
    CapabilityDisabled,
    #[error("invalid system key")]
    InvalidSystemKey,
}
