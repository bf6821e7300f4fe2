//! `Basic` credential verification against an [`IdentityStore`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::HeaderValue;
use tentia_core::Identity;
use tracing::debug;

use super::store::{IdentityStore, StoredSecret};
use super::verifier::{build_challenge, credentials_for, AuthError, CredentialVerifier, MalformedReason};

const SCHEME: &str = "Basic";

/// Verifies `Authorization: Basic <base64(name:secret)>`.
pub struct BasicVerifier {
    store: Arc<dyn IdentityStore>,
    challenge: HeaderValue,
}

impl BasicVerifier {
    /// Creates a verifier backed by `store`, challenging with `realm`.
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, realm: &str) -> Self {
        Self {
            store,
            challenge: build_challenge(SCHEME, realm),
        }
    }
}

impl std::fmt::Debug for BasicVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicVerifier")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

fn decode_pair(encoded: &str) -> Result<(String, String), MalformedReason> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| MalformedReason::BadEncoding)?;
    let decoded = String::from_utf8(bytes).map_err(|_| MalformedReason::BadEncoding)?;
    let (name, secret) = decoded
        .split_once(':')
        .ok_or(MalformedReason::MissingSeparator)?;
    Ok((name.to_string(), secret.to_string()))
}

#[async_trait]
impl CredentialVerifier for BasicVerifier {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn challenge(&self) -> HeaderValue {
        self.challenge.clone()
    }

    async fn verify(&self, authorization: Option<&HeaderValue>) -> Result<Identity, AuthError> {
        let encoded = credentials_for(authorization, SCHEME)?;
        let (name, secret) = decode_pair(encoded)?;

        let stored = self.store.lookup(&name).await.map_err(AuthError::Store)?;
        let accepted = match stored {
            Some(stored) => stored.matches(&secret),
            None => {
                // Keep the unknown-principal path as expensive as a mismatch.
                let _ = StoredSecret::decoy().matches(&secret);
                false
            }
        };

        if accepted {
            Ok(Identity::new(name, SCHEME))
        } else {
            debug!(principal = %name, "basic credentials rejected");
            Err(AuthError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::auth::MemoryIdentityStore;

    fn verifier() -> BasicVerifier {
        let store = MemoryIdentityStore::new()
            .with_identity("alice", "correct horse")
            .with_identity("svc", "a:b:c");
        BasicVerifier::new(Arc::new(store), "tentia")
    }

    fn basic(raw: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(raw))).unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_credentials() {
        let identity = verifier()
            .verify(Some(&basic("alice:correct horse")))
            .await
            .unwrap();
        assert_eq!(identity.principal, "alice");
        assert_eq!(identity.scheme, "Basic");
        assert!(identity.claims.is_empty());
    }

    #[tokio::test]
    async fn splits_on_first_colon() {
        let identity = verifier().verify(Some(&basic("svc:a:b:c"))).await.unwrap();
        assert_eq!(identity.principal, "svc");
    }

    #[tokio::test]
    async fn wrong_secret_and_unknown_principal_look_the_same() {
        let wrong = verifier().verify(Some(&basic("alice:nope"))).await.unwrap_err();
        let unknown = verifier().verify(Some(&basic("mallory:nope"))).await.unwrap_err();
        assert!(matches!(wrong, AuthError::Unauthorized));
        assert!(matches!(unknown, AuthError::Unauthorized));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn absent_header_is_malformed() {
        let err = verifier().verify(None).await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed(MalformedReason::Missing)));
    }

    #[tokio::test]
    async fn undecodable_payload_is_malformed() {
        let header = HeaderValue::from_static("Basic !!!not-base64!!!");
        let err = verifier().verify(Some(&header)).await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed(MalformedReason::BadEncoding)));
    }

    #[tokio::test]
    async fn non_utf8_payload_is_malformed() {
        let header =
            HeaderValue::from_str(&format!("Basic {}", STANDARD.encode([0xff, b':', 0xfe]))).unwrap();
        let err = verifier().verify(Some(&header)).await.unwrap_err();
        assert!(matches!(err, AuthError::Malformed(MalformedReason::BadEncoding)));
    }

    #[tokio::test]
    async fn payload_without_separator_is_malformed() {
        let err = verifier().verify(Some(&basic("alice"))).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Malformed(MalformedReason::MissingSeparator)
        ));
    }

    #[tokio::test]
    async fn store_faults_surface_as_store_errors() {
        struct Broken;

        #[async_trait]
        impl IdentityStore for Broken {
            async fn lookup(&self, _name: &str) -> anyhow::Result<Option<StoredSecret>> {
                anyhow::bail!("connection reset")
            }
        }

        let verifier = BasicVerifier::new(Arc::new(Broken), "tentia");
        let err = verifier.verify(Some(&basic("alice:pw"))).await.unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));
    }

    #[test]
    fn challenge_is_basic() {
        let challenge = verifier().challenge();
        assert!(challenge.to_str().unwrap().starts_with("Basic realm=\"tentia\""));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_single_char_mutation_is_rejected(index in 0usize..13, replacement in "[ -~]") {
            let secret = "correct horse";
            let mut mutated: Vec<char> = secret.chars().collect();
            let replacement = replacement.chars().next().unwrap();
            prop_assume!(mutated[index] != replacement);
            mutated[index] = replacement;
            let mutated: String = mutated.into_iter().collect();

            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let result = rt.block_on(verifier().verify(Some(&basic(&format!("alice:{mutated}")))));
            prop_assert!(matches!(result, Err(AuthError::Unauthorized)));
        }
    }
}
