//! HS256 bearer-token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed or unsigned token: {0}")]
    Malformed(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// Shared-secret HS256 validator.
///
/// Claim timestamps are RFC 3339 strings rather than numeric `exp`, so the
/// registered-claim checks of `jsonwebtoken` are disabled and the window is
/// checked by [`validate_claims`] instead.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "jwt decode failed");
                TokenError::Malformed(e.to_string())
            })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header};
    use payrun_core::UserId;

    fn mint(secret: &str, issued_at: DateTime<Utc>, ttl: Duration) -> (JwtClaims, String) {
        let claims = JwtClaims {
            sub: UserId::new(),
            email: "admin@company.com".to_string(),
            role: Role::admin(),
            issued_at,
            expires_at: issued_at + ttl,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (claims, token)
    }

    #[test]
    fn accepts_valid_token() {
        let now = Utc::now();
        let (claims, token) = mint("secret", now, Duration::minutes(10));
        let validator = Hs256JwtValidator::new("secret");

        assert_eq!(validator.validate(&token, now).unwrap(), claims);
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = Utc::now();
        let (_, token) = mint("secret", now, Duration::minutes(10));
        let validator = Hs256JwtValidator::new("other");

        assert!(matches!(validator.validate(&token, now), Err(TokenError::Malformed(_))));
        assert!(matches!(validator.validate("not-a-jwt", now), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn rejects_expired_token() {
        let now = Utc::now();
        let (_, token) = mint("secret", now - Duration::hours(2), Duration::hours(1));
        let validator = Hs256JwtValidator::new("secret");

        assert_eq!(
            validator.validate(&token, now),
            Err(TokenError::Claims(TokenValidationError::Expired))
        );
    }
}
