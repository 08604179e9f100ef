//! Handshake credential validation.
//!
//! The auth service issues HS256 bearer tokens carrying the user identity;
//! this module only verifies them. Browser WebSocket clients cannot set
//! headers, so the live channel accepts the token as a `?token=` query
//! parameter as well as the usual `Authorization: Bearer` header.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User identity.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Validate a bearer token and return the user identity it is bound to.
///
/// Signature and expiry are both checked; any failure is an
/// [`AppError::Authentication`] and the connection attempt is refused.
pub fn verify_token(secret: &str, token: &str) -> AppResult<String> {
    if token.is_empty() {
        return Err(AppError::Authentication("missing token".to_string()));
    }
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::Authentication(e.to_string()))?;
    Ok(data.claims.sub)
}

/// Extract the token from an `Authorization: Bearer` header value, falling
/// back to a raw query-parameter token.
pub fn token_from(header: Option<&str>, query_token: Option<&str>) -> Option<String> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| query_token.map(str::to_string))
}

/// Issue a token the way the auth service does. Used by operational tooling
/// and tests; the messaging core itself never calls this on behalf of a
/// client.
pub fn issue_token(secret: &str, user_id: &str, ttl: Duration) -> AppResult<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn verify_roundtrips_issued_token() {
        let token = issue_token(SECRET, "u1", Duration::hours(1)).unwrap();
        assert_eq!(verify_token(SECRET, &token).unwrap(), "u1");
    }

    #[test]
    fn missing_token_is_refused() {
        assert!(matches!(
            verify_token(SECRET, ""),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn garbage_token_is_refused() {
        assert!(matches!(
            verify_token(SECRET, "not.a.jwt"),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn wrong_secret_is_refused() {
        let token = issue_token("other-secret", "u1", Duration::hours(1)).unwrap();
        assert!(matches!(
            verify_token(SECRET, &token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn expired_token_is_refused() {
        let token = issue_token(SECRET, "u1", Duration::hours(-1)).unwrap();
        assert!(matches!(
            verify_token(SECRET, &token),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn header_takes_precedence_over_query() {
        assert_eq!(
            token_from(Some("Bearer abc"), Some("xyz")),
            Some("abc".to_string())
        );
        assert_eq!(token_from(None, Some("xyz")), Some("xyz".to_string()));
        assert_eq!(token_from(None, None), None);
    }
}
