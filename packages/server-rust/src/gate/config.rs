use std::time::Duration;

use tentia_core::{ConnectionTemplate, TenantPrefix};

use crate::tenant::TenantExtractor;

/// Immutable gate configuration, built once at start-up and shared as
/// `Arc<GateConfig>`.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Connection template with exactly one `{dbName}` placeholder.
    pub template: ConnectionTemplate,
    /// Namespace prepended to every tenant key.
    pub prefix: TenantPrefix,
    /// Which header carries the tenant key and how duplicates are handled.
    pub tenant: TenantExtractor,
    /// Upper bound on credential verification, including identity store lookups.
    pub identity_lookup_timeout: Duration,
    /// Upper bound on opening a tenant session.
    pub connect_timeout: Duration,
}

impl GateConfig {
    /// Creates a config with an empty prefix and default header, policy and timeouts.
    #[must_use]
    pub fn new(template: ConnectionTemplate) -> Self {
        Self {
            template,
            prefix: TenantPrefix::default(),
            tenant: TenantExtractor::default(),
            identity_lookup_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: TenantPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    #[must_use]
    pub fn with_tenant_extractor(mut self, extractor: TenantExtractor) -> Self {
        self.tenant = extractor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::{DuplicateTenantPolicy, DEFAULT_TENANT_HEADER};

    #[test]
    fn defaults() {
        let config = GateConfig::new(ConnectionTemplate::parse("mem://{dbName}").unwrap());
        assert_eq!(config.prefix.as_str(), "");
        assert_eq!(config.tenant.header().as_str(), DEFAULT_TENANT_HEADER);
        assert_eq!(config.tenant.duplicates(), DuplicateTenantPolicy::Reject);
        assert_eq!(config.identity_lookup_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }
}
