//! Per-request data context provisioning.
//!
//! A [`Provisioner`] turns a resolved connection target into a
//! [`DataContext`]: one live backend session owned by exactly one request.
//! Backends plug in through [`TenantConnector`]; [`ContextTracker`] counts
//! open contexts so shutdown can wait for them.

pub mod connector;
pub mod context;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use connector::{ConnectError, TenantConnector, TenantSession};
pub use context::{ContextLease, ContextTracker, DataContext, Provisioner};
pub use memory::{MemorySession, MemoryTenantConnector, TenantDatabase};
#[cfg(feature = "postgres")]
pub use postgres::{PgConnectorOptions, PgSession, PgTenantConnector};
