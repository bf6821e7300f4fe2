//! `Bearer` JWT verification (HS256 shared secret).

use std::collections::BTreeMap;

use async_trait::async_trait;
use http::HeaderValue;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tentia_core::Identity;
use tracing::debug;

use super::verifier::{build_challenge, credentials_for, AuthError, CredentialVerifier, MalformedReason};

const SCHEME: &str = "Bearer";

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

/// Verifies `Authorization: Bearer <jwt>`.
///
/// The `sub` claim becomes the principal. Other scalar claims (strings,
/// numbers, booleans) are copied into the identity's claim set.
pub struct BearerJwtVerifier {
    key: DecodingKey,
    validation: Validation,
    challenge: HeaderValue,
}

impl BearerJwtVerifier {
    /// Creates a verifier for tokens signed with `secret`. `exp` and `sub`
    /// are required.
    #[must_use]
    pub fn new(secret: &[u8], realm: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
            challenge: build_challenge(SCHEME, realm),
        }
    }

    /// Additionally requires the `iss` claim to equal `issuer`.
    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }
}

impl std::fmt::Debug for BearerJwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerJwtVerifier")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

fn scalar(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[async_trait]
impl CredentialVerifier for BearerJwtVerifier {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn challenge(&self) -> HeaderValue {
        self.challenge.clone()
    }

    async fn verify(&self, authorization: Option<&HeaderValue>) -> Result<Identity, AuthError> {
        let token = credentials_for(authorization, SCHEME)?;

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|err| {
            match err.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => AuthError::Malformed(MalformedReason::BadToken),
                kind => {
                    debug!(?kind, "bearer token rejected");
                    AuthError::Unauthorized
                }
            }
        })?;

        let Claims { sub, rest } = data.claims;
        let principal = sub.ok_or(AuthError::Unauthorized)?;
        let mut identity = Identity::new(principal, SCHEME);
        for (name, value) in rest {
            if let Some(value) = scalar(value) {
                identity.claims.insert(name, value);
            }
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
    use serde_json::json;

    use super::*;

    const SECRET: &[u8] = b"test-signing-secret";

    fn token(claims: &serde_json::Value, secret: &[u8]) -> HeaderValue {
        let jwt = encode(&Header::default(), claims, &EncodingKey::from_secret(secret)).unwrap();
        HeaderValue::from_str(&format!("Bearer {jwt}")).unwrap()
    }

    fn in_an_hour() -> u64 {
        get_current_timestamp() + 3600
    }

    #[tokio::test]
    async fn accepts_signed_token() {
        let header = token(
            &json!({"sub": "alice", "exp": in_an_hour(), "org": "acme", "admin": true, "nested": {"x": 1}}),
            SECRET,
        );
        let identity = BearerJwtVerifier::new(SECRET, "tentia")
            .verify(Some(&header))
            .await
            .unwrap();
        assert_eq!(identity.principal, "alice");
        assert_eq!(identity.scheme, "Bearer");
        assert_eq!(identity.claims.get("org").map(String::as_str), Some("acme"));
        assert_eq!(identity.claims.get("admin").map(String::as_str), Some("true"));
        assert!(!identity.claims.contains_key("nested"));
        assert!(!identity.claims.contains_key("sub"));
    }

    #[tokio::test]
    async fn wrong_signature_is_unauthorized() {
        let header = token(&json!({"sub": "alice", "exp": in_an_hour()}), b"other-secret");
        let err = BearerJwtVerifier::new(SECRET, "tentia")
            .verify(Some(&header))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let expired = get_current_timestamp() - 3600;
        let header = token(&json!({"sub": "alice", "exp": expired}), SECRET);
        let err = BearerJwtVerifier::new(SECRET, "tentia")
            .verify(Some(&header))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn issuer_is_enforced_when_configured() {
        let header = token(
            &json!({"sub": "alice", "exp": in_an_hour(), "iss": "someone-else"}),
            SECRET,
        );
        let err = BearerJwtVerifier::new(SECRET, "tentia")
            .with_issuer("tentia")
            .verify(Some(&header))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn garbage_token_is_malformed() {
        let header = HeaderValue::from_static("Bearer not-a-jwt");
        let err = BearerJwtVerifier::new(SECRET, "tentia")
            .verify(Some(&header))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Malformed(MalformedReason::BadToken)));
    }

    #[tokio::test]
    async fn basic_credentials_are_malformed_for_bearer() {
        let header = HeaderValue::from_static("Basic YWxpY2U6cHc=");
        let err = BearerJwtVerifier::new(SECRET, "tentia")
            .verify(Some(&header))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Malformed(MalformedReason::WrongScheme)));
    }
}
