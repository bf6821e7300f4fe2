//! Tenant identifiers.
//!
//! A [`TenantKey`] is substituted verbatim into a backend connection string,
//! so the accepted alphabet is deliberately narrow: anything that could
//! re-target a connection (`;`, `/`, `@`, `?`, `=`, whitespace, quotes) is
//! rejected at parse time rather than escaped later.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum accepted length of a tenant key, in bytes.
pub const MAX_TENANT_KEY_LEN: usize = 64;

/// Reasons a string cannot become a [`TenantKey`] or [`TenantPrefix`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TenantKeyError {
    #[error("tenant key is empty")]
    Empty,
    #[error("tenant key is {len} bytes long, maximum is {max}")]
    TooLong { len: usize, max: usize },
    #[error("tenant key contains forbidden character {ch:?} at byte {index}")]
    ForbiddenChar { ch: char, index: usize },
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn check_segment(raw: &str) -> Result<(), TenantKeyError> {
    if raw.len() > MAX_TENANT_KEY_LEN {
        return Err(TenantKeyError::TooLong {
            len: raw.len(),
            max: MAX_TENANT_KEY_LEN,
        });
    }
    if let Some((index, ch)) = raw.char_indices().find(|(_, c)| !is_segment_char(*c)) {
        return Err(TenantKeyError::ForbiddenChar { ch, index });
    }
    Ok(())
}

/// Opaque, non-empty identifier selecting one tenant's data store.
///
/// Immutable once constructed. The only way to obtain one is [`TenantKey::parse`],
/// so every `TenantKey` in the process satisfies the alphabet and length rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantKey(String);

impl TenantKey {
    /// Validates `raw` and wraps it. The value is kept byte-for-byte.
    ///
    /// # Errors
    ///
    /// Returns [`TenantKeyError`] when `raw` is empty, longer than
    /// [`MAX_TENANT_KEY_LEN`], or contains a character outside `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, TenantKeyError> {
        if raw.is_empty() {
            return Err(TenantKeyError::Empty);
        }
        check_segment(raw)?;
        Ok(Self(raw.to_string()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for TenantKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Static namespace prepended to every tenant key (for example `tc_`).
///
/// Unlike a [`TenantKey`] the prefix may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantPrefix(String);

impl TenantPrefix {
    /// Validates a prefix against the tenant key alphabet.
    ///
    /// # Errors
    ///
    /// Returns [`TenantKeyError`] for over-long prefixes or forbidden characters.
    pub fn parse(raw: &str) -> Result<Self, TenantKeyError> {
        check_segment(raw)?;
        Ok(Self(raw.to_string()))
    }

    /// Returns the prefix as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
