use crate::identity::Identity;
use crate::tenant::TenantKey;

/// Per-request context carrying identity, tenancy, and tracing information.
/// Exists only for requests that passed authentication and tenant resolution.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request identifier, taken from `x-request-id` when present.
    pub request_id: String,
    /// Verified caller.
    pub identity: Identity,
    /// Tenant the request is bound to for its whole lifetime.
    pub tenant: TenantKey,
}
