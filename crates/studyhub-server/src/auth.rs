//! Identity extraction for hub connections.
//!
//! Browsers cannot set headers on a WebSocket upgrade, so the access token
//! may arrive as the `access_token` query parameter as well as a bearer
//! `Authorization` header. A missing or invalid token is not an error: the
//! connection is accepted as anonymous.

use anyhow::Result;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use studyhub_core::Identity;
use tracing::debug;

/// Access token claims issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry, seconds since the Unix epoch.
    pub exp: usize,
}

/// Bearer token from the `Authorization` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the identity of a connection from its access token.
pub fn identity_from_token(token: Option<&str>, secret: &str) -> Identity {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Identity::Anonymous;
    };

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Identity::from_verified(Some(data.claims.sub)),
        Err(e) => {
            debug!(error = %e, "Rejected access token, connecting as anonymous");
            Identity::Anonymous
        }
    }
}

/// Sign an access token for `user_id`, valid for `ttl_secs`.
///
/// The hub only verifies tokens; this is used by tooling and tests.
pub fn issue_token(user_id: &str, secret: &str, ttl_secs: i64) -> Result<String> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: usize::try_from(exp).unwrap_or(0),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use studyhub_core::UserId;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_valid_token_identifies() {
        let token = issue_token("alice", SECRET, 3600).unwrap();
        assert_eq!(
            identity_from_token(Some(&token), SECRET),
            Identity::Identified(UserId::new("alice"))
        );
    }

    #[test]
    fn test_bad_tokens_are_anonymous() {
        let forged = issue_token("alice", "other-secret", 3600).unwrap();
        let expired = issue_token("alice", SECRET, -3600).unwrap();

        assert_eq!(identity_from_token(None, SECRET), Identity::Anonymous);
        assert_eq!(identity_from_token(Some(""), SECRET), Identity::Anonymous);
        assert_eq!(identity_from_token(Some("garbage"), SECRET), Identity::Anonymous);
        assert_eq!(identity_from_token(Some(&forged), SECRET), Identity::Anonymous);
        assert_eq!(identity_from_token(Some(&expired), SECRET), Identity::Anonymous);
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }
}
