//! `Tentia` Core: tenant keys, caller identities, and connection template synthesis.

pub mod context;
pub mod identity;
pub mod template;
pub mod tenant;

pub use context::RequestContext;
pub use identity::Identity;
pub use template::{
    synthesize, ConnectionTemplate, ResolvedConnectionTarget, SynthesisError, TemplateError,
    PLACEHOLDER,
};
pub use tenant::{TenantKey, TenantKeyError, TenantPrefix, MAX_TENANT_KEY_LEN};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
