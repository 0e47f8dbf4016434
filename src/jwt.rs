use jwt_simple::prelude::*;

use crate::error::{AppError, Result};

const ISSUER: &str = "signal-billing";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub email: String,
}

/// HS256 key material for first-party access tokens.
#[derive(Clone)]
pub struct TokenKeys {
    key: HS256Key,
    ttl: Duration,
}

impl TokenKeys {
    pub fn from_secret(secret: &[u8], ttl: std::time::Duration) -> Self {
        Self {
            key: HS256Key::from_bytes(secret),
            ttl: Duration::from_secs(ttl.as_secs()),
        }
    }

    /// Random per-process key. Tokens do not survive a restart.
    pub fn generate(ttl: std::time::Duration) -> Self {
        Self {
            key: HS256Key::generate(),
            ttl: Duration::from_secs(ttl.as_secs()),
        }
    }

    pub fn issue(&self, user_id: i64, email: &str) -> Result<String> {
        let claims = Claims::with_custom_claims(
            AccessClaims {
                email: email.to_string(),
            },
            self.ttl,
        )
        .with_issuer(ISSUER)
        .with_subject(user_id.to_string());

        self.key
            .authenticate(claims)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify a token and return the user id it was issued for.
    pub fn verify(&self, token: &str) -> Result<i64> {
        let options = VerificationOptions {
            allowed_issuers: Some(HashSet::from_strings(&[ISSUER])),
            ..Default::default()
        };

        let claims = self
            .key
            .verify_token::<AccessClaims>(token, Some(options))
            .map_err(|_| AppError::Unauthorized)?;

        claims
            .subject
            .as_deref()
            .and_then(|sub| sub.parse().ok())
            .ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_subject() {
        let keys = TokenKeys::from_secret(b"test-secret", std::time::Duration::from_secs(600));
        let token = keys.issue(42, "a@example.com").unwrap();
        assert_eq!(keys.verify(&token).unwrap(), 42);
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let ttl = std::time::Duration::from_secs(600);
        let issuer = TokenKeys::from_secret(b"one", ttl);
        let other = TokenKeys::from_secret(b"two", ttl);
        let token = issuer.issue(1, "a@example.com").unwrap();
        assert!(matches!(other.verify(&token), Err(AppError::Unauthorized)));
        assert!(matches!(other.verify("garbage"), Err(AppError::Unauthorized)));
    }
}
