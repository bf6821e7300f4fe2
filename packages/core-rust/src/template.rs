//! Connection string synthesis.
//!
//! A process-wide [`ConnectionTemplate`] carries exactly one [`PLACEHOLDER`].
//! [`synthesize`] replaces it with `prefix + tenant` to produce the
//! [`ResolvedConnectionTarget`] a tenant's requests connect to.
//!
//! Templates and resolved targets usually embed credentials, so neither type
//! prints its contents through `Debug` or `Display`.

use std::fmt;

use crate::tenant::{TenantKey, TenantPrefix};

/// The substitution token a template must contain exactly once.
pub const PLACEHOLDER: &str = "{dbName}";

/// Errors from parsing a connection template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("connection template has no {{dbName}} placeholder")]
    MissingPlaceholder,
    #[error("connection template has {count} {{dbName}} placeholders, expected exactly one")]
    MultiplePlaceholders { count: usize },
}

/// Errors from synthesizing a connection target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    #[error("no tenant key was supplied")]
    MissingTenant,
}

/// Connection string with a single tenant placeholder, fixed at start-up.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTemplate {
    raw: String,
}

impl ConnectionTemplate {
    /// Parses a template, requiring exactly one [`PLACEHOLDER`].
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when the placeholder is absent or repeated.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TemplateError> {
        let raw = raw.into();
        match raw.matches(PLACEHOLDER).count() {
            0 => Err(TemplateError::MissingPlaceholder),
            1 => Ok(Self { raw }),
            count => Err(TemplateError::MultiplePlaceholders { count }),
        }
    }
}

impl fmt::Debug for ConnectionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConnectionTemplate(<redacted>)")
    }
}

/// A fully resolved backend target for one tenant.
///
/// Equality and hashing cover the full target string, which is what
/// connectors key their pools by.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResolvedConnectionTarget {
    target: String,
    segment: String,
}

impl ResolvedConnectionTarget {
    /// The substituted `prefix + tenant` segment. Safe to log at debug level.
    #[must_use]
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// The full connection string, for handing to a driver. Never log this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.target
    }
}

impl fmt::Debug for ResolvedConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConnectionTarget")
            .field("segment", &self.segment)
            .finish_non_exhaustive()
    }
}

/// Substitutes `prefix + tenant` into the template's placeholder.
///
/// Pure and deterministic: the same inputs always produce the same target,
/// and distinct tenant keys always produce distinct targets.
///
/// # Errors
///
/// Returns [`SynthesisError::MissingTenant`] when `tenant` is `None`; no
/// default tenant is ever substituted.
pub fn synthesize(
    template: &ConnectionTemplate,
    prefix: &TenantPrefix,
    tenant: Option<&TenantKey>,
) -> Result<ResolvedConnectionTarget, SynthesisError> {
    let tenant = tenant.ok_or(SynthesisError::MissingTenant)?;
    let segment = format!("{}{}", prefix.as_str(), tenant.as_str());
    let target = template.raw.replacen(PLACEHOLDER, &segment, 1);
    Ok(ResolvedConnectionTarget { target, segment })
}
