//! Signed login tokens (HS256).

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Magic links are short lived.
pub const MAGIC_LINK_TTL: Duration = Duration::minutes(15);

/// Sessions last a week.
pub const SESSION_TTL: Duration = Duration::days(7);

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies magic-link and session tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &SecretString) -> Result<Self, AuthError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }

    pub fn magic_link_token(&self, email: &str, name: &str) -> Result<String, AuthError> {
        self.sign(email, name, MAGIC_LINK_TTL)
    }

    pub fn session_token(&self, email: &str, name: &str) -> Result<String, AuthError> {
        self.sign(email, name, SESSION_TTL)
    }

    fn sign(&self, email: &str, name: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            email: email.to_string(),
            name: name.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Decode and check a token. Any failure (bad signature, expiry,
    /// malformed input) yields `None`.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!("Token rejected: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(secret: &str) -> TokenIssuer {
        TokenIssuer::new(&SecretString::from(secret.to_string())).unwrap()
    }

    #[test]
    fn empty_secret_rejected() {
        let err = TokenIssuer::new(&SecretString::from(String::new())).unwrap_err();
        assert!(matches!(err, AuthError::MissingSecret));
    }

    #[test]
    fn magic_link_round_trip() {
        let issuer = issuer("test-secret");
        let token = issuer.magic_link_token("jane@example.com", "Jane").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.email, "jane@example.com");
        assert_eq!(claims.name, "Jane");
        assert_eq!(claims.exp - claims.iat, MAGIC_LINK_TTL.num_seconds());
    }

    #[test]
    fn session_lasts_seven_days() {
        let issuer = issuer("test-secret");
        let token = issuer.session_token("jane@example.com", "Jane").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn wrong_secret_fails() {
        let token = issuer("one").session_token("a@b.com", "A").unwrap();
        assert!(issuer("two").verify(&token).is_none());
    }

    #[test]
    fn expired_token_fails() {
        let issuer = issuer("test-secret");
        let token = issuer
            .sign("a@b.com", "A", Duration::minutes(-30))
            .unwrap();
        assert!(issuer.verify(&token).is_none());
    }

    #[test]
    fn garbage_fails() {
        assert!(issuer("s").verify("not-a-token").is_none());
        assert!(issuer("s").verify("").is_none());
    }
}
