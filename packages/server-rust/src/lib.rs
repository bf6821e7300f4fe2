//! `Tentia` Server: authentication, tenant resolution and per-request data
//! contexts in front of axum routes.

pub mod auth;
pub mod gate;
pub mod network;
pub mod provision;
pub mod tenant;

pub use auth::{BasicVerifier, BearerJwtVerifier, CredentialVerifier, MemoryIdentityStore};
pub use gate::{GateConfig, GateError, GateErrorKind, GateStage, TenantGate, TenantGateLayer, TenantScope};
pub use network::{AppState, NetworkConfig, NetworkModule};
pub use provision::{ContextTracker, DataContext, MemoryTenantConnector, TenantConnector};
pub use tenant::{DuplicateTenantPolicy, TenantExtractor};
