//! Capability for privileged operations, injected at startup.

use crate::AuthError;
use tracing::warn;

/// Configured system key, if any.
#[derive(Clone, Default)]
pub struct SystemCapability {
    key: Option<Vec<u8>>,
}

/// Proof that the caller presented the system key. Only [`SystemCapability::verify`] makes one.
#[derive(Debug)]
pub struct SystemGrant {
    _private: (),
}

impl SystemCapability {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(String::into_bytes),
        }
    }

    pub fn disabled() -> Self {
        Self { key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn verify(&self, presented: &str) -> Result<SystemGrant, AuthError> {
        let Some(expected) = &self.key else {
            return Err(AuthError::CapabilityDisabled);
        };
        if constant_time_eq(expected, presented.as_bytes()) {
            Ok(SystemGrant { _private: () })
        } else {
            warn!("rejected system key");
            Err(AuthError::InvalidSystemKey)
        }
    }
}

impl std::fmt::Debug for SystemCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemCapability")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
