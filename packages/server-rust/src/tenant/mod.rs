//! Tenant identifier extraction from request headers.

pub mod extract;

pub use extract::{DuplicateTenantPolicy, TenantExtractor, TenantRejection, DEFAULT_TENANT_HEADER};
