//! Identity store capability and the in-memory store.

use std::fmt;

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A stored secret, kept only as its SHA-256 digest.
///
/// Comparisons hash the supplied secret and compare digests with
/// [`ConstantTimeEq`], so neither the content nor the length of the stored
/// secret influences timing.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredSecret {
    digest: [u8; 32],
}

impl StoredSecret {
    /// Stores a plaintext secret (hashed immediately).
    #[must_use]
    pub fn from_plain(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Stores a precomputed SHA-256 digest given as 64 hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`hex::FromHexError`] when the input is not exactly 32 hex-encoded bytes.
    pub fn from_sha256_hex(hex_digest: &str) -> Result<Self, hex::FromHexError> {
        let mut digest = [0u8; 32];
        hex::decode_to_slice(hex_digest.trim(), &mut digest)?;
        Ok(Self { digest })
    }

    /// Constant-time check of a supplied secret against this one.
    #[must_use]
    pub fn matches(&self, supplied: &str) -> bool {
        let supplied: [u8; 32] = Sha256::digest(supplied.as_bytes()).into();
        bool::from(self.digest.ct_eq(&supplied))
    }

    /// Digest compared against when the principal does not exist, so unknown
    /// principals cost the same as wrong secrets.
    pub(crate) const fn decoy() -> Self {
        Self { digest: [0u8; 32] }
    }
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoredSecret(<redacted>)")
    }
}

/// External identity lookup used by the `Basic` verifier.
///
/// Implementations: [`MemoryIdentityStore`], `PgIdentityStore` (feature `postgres`).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Returns the stored secret for `name`, or `None` for an unknown principal.
    async fn lookup(&self, name: &str) -> anyhow::Result<Option<StoredSecret>>;
}

/// In-memory identity store for development and tests.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    secrets: DashMap<String, StoredSecret>,
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a principal.
    pub fn insert(&self, name: impl Into<String>, secret: StoredSecret) {
        self.secrets.insert(name.into(), secret);
    }

    /// Builder-style registration with a plaintext secret.
    #[must_use]
    pub fn with_identity(self, name: impl Into<String>, secret: &str) -> Self {
        self.insert(name, StoredSecret::from_plain(secret));
        self
    }

    /// Number of registered principals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Whether no principal is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn lookup(&self, name: &str) -> anyhow::Result<Option<StoredSecret>> {
        Ok(self.secrets.get(name).map(|entry| entry.value().clone()))
    }
}

/// Errors from [`parse_identity_spec`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentitySpecError {
    #[error("identity spec must look like name:secret or name:sha256:<hex>")]
    MissingSeparator,
    #[error("identity spec has an empty principal name")]
    EmptyName,
    #[error("invalid sha256 digest: {0}")]
    BadDigest(#[from] hex::FromHexError),
}

/// Parses `name:secret` or `name:sha256:<64 hex chars>` as used on the command line.
///
/// # Errors
///
/// Returns [`IdentitySpecError`] for specs without a separator, with an empty
/// name, or with an undecodable digest.
pub fn parse_identity_spec(spec: &str) -> Result<(String, StoredSecret), IdentitySpecError> {
    let (name, secret) = spec
        .split_once(':')
        .ok_or(IdentitySpecError::MissingSeparator)?;
    if name.is_empty() {
        return Err(IdentitySpecError::EmptyName);
    }
    let stored = match secret.strip_prefix("sha256:") {
        Some(digest) => StoredSecret::from_sha256_hex(digest)?,
        None => StoredSecret::from_plain(secret),
    };
    Ok((name.to_string(), stored))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_secret_matches_itself_only() {
        let stored = StoredSecret::from_plain("hunter2");
        assert!(stored.matches("hunter2"));
        assert!(!stored.matches("hunter3"));
        assert!(!stored.matches(""));
        assert!(!stored.matches("hunter22"));
    }

    #[test]
    fn hex_digest_matches_plaintext() {
        let hex_digest = hex::encode(Sha256::digest(b"hunter2"));
        let stored = StoredSecret::from_sha256_hex(&hex_digest).unwrap();
        assert_eq!(stored, StoredSecret::from_plain("hunter2"));
        assert!(stored.matches("hunter2"));
    }

    #[test]
    fn hex_digest_must_be_32_bytes() {
        assert!(StoredSecret::from_sha256_hex("abcd").is_err());
        assert!(StoredSecret::from_sha256_hex("zz").is_err());
    }

    #[test]
    fn decoy_matches_nothing_common() {
        assert!(!StoredSecret::decoy().matches(""));
        assert!(!StoredSecret::decoy().matches("password"));
    }

    #[test]
    fn debug_is_redacted() {
        assert_eq!(
            format!("{:?}", StoredSecret::from_plain("hunter2")),
            "StoredSecret(<redacted>)"
        );
    }

    #[tokio::test]
    async fn memory_store_lookup() {
        let store = MemoryIdentityStore::new().with_identity("alice", "pw");
        assert_eq!(store.len(), 1);
        assert!(store.lookup("alice").await.unwrap().unwrap().matches("pw"));
        assert!(store.lookup("bob").await.unwrap().is_none());
    }

    #[test]
    fn identity_spec_plain_and_digest() {
        let (name, secret) = parse_identity_spec("alice:pa:ss").unwrap();
        assert_eq!(name, "alice");
        assert!(secret.matches("pa:ss"));

        let digest = hex::encode(Sha256::digest(b"pw"));
        let (name, secret) = parse_identity_spec(&format!("svc:sha256:{digest}")).unwrap();
        assert_eq!(name, "svc");
        assert!(secret.matches("pw"));
    }

    #[test]
    fn identity_spec_errors() {
        assert_eq!(
            parse_identity_spec("alice").unwrap_err(),
            IdentitySpecError::MissingSeparator
        );
        assert_eq!(
            parse_identity_spec(":pw").unwrap_err(),
            IdentitySpecError::EmptyName
        );
        assert!(matches!(
            parse_identity_spec("a:sha256:nothex").unwrap_err(),
            IdentitySpecError::BadDigest(_)
        ));
    }
}
