//! Bearer token issuing and validation.

use crate::AuthError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parley_config::AuthConfig;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const LEEWAY_SECONDS: u64 = 5;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub exp: u64,
    pub iat: u64,
    pub nbf: u64,
    pub iss: String,
    pub aud: String,
    pub jti: String,
}

/// The caller a valid token speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Clone)]
pub struct TokenValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl TokenValidator {
    pub fn new(secret: &str, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, &config.jwt_issuer, &config.jwt_audience)
            .with_ttl(Duration::from_secs(config.token_ttl_seconds))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self, user_id: &str, display_name: &str) -> Result<String, AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| AuthError::TokenIssue("system clock before unix epoch".to_string()))?
            .as_secs();

        let claims = Claims {
            sub: user_id.to_string(),
            name: display_name.to_string(),
            exp: now.saturating_add(self.ttl.as_secs()),
            iat: now,
            nbf: now,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::TokenIssue(err.to_string()))
    }

    /// Resolve a token to the identity it names. Any defect yields `None`.
    pub fn validate(&self, token: &str) -> Option<Identity> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_nbf = true;
        validation.leeway = LEEWAY_SECONDS;

        match decode::<Claims>(strip_bearer(token), &self.decoding_key, &validation) {
            Ok(data) => Some(Identity {
                user_id: data.claims.sub,
                display_name: data.claims.name,
            }),
            Err(err) => {
                debug!(error = %err, "rejected bearer token");
                None
            }
        }
    }
}

/// Accept both `Bearer <jwt>` and a bare token.
pub fn strip_bearer(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TokenValidator {
        TokenValidator::new("test-secret", "parley", "parley-clients")
    }

    #[test]
    fn issued_token_validates_to_identity() {
        let validator = validator();
        let token = validator.issue("user-1", "Alice").unwrap();

        let identity = validator.validate(&token).unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.display_name, "Alice");

        let with_scheme = format!("Bearer {token}");
        assert!(validator.validate(&with_scheme).is_some());
    }

    #[test]
    fn garbage_and_foreign_tokens_are_rejected() {
        let validator = validator();
        assert!(validator.validate("not-a-jwt").is_none());
        assert!(validator.validate("").is_none());

        let foreign = TokenValidator::new("other-secret", "parley", "parley-clients")
            .issue("user-1", "Alice")
            .unwrap();
        assert!(validator.validate(&foreign).is_none());

        let wrong_audience = TokenValidator::new("test-secret", "parley", "someone-else")
            .issue("user-1", "Alice")
            .unwrap();
        assert!(validator.validate(&wrong_audience).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let validator = validator();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let claims = Claims {
            sub: "user-1".into(),
            name: "Alice".into(),
            exp: now - 3_600,
            iat: now - 7_200,
            nbf: now - 7_200,
            iss: "parley".into(),
            aud: "parley-clients".into(),
            jti: "jti".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(validator.validate(&token).is_none());
    }

    #[test]
    fn strip_bearer_handles_both_forms() {
        assert_eq!(strip_bearer("Bearer abc"), "abc");
        assert_eq!(strip_bearer("  abc "), "abc");
    }
}
