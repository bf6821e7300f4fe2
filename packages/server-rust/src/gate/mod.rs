//! The request gate: authenticate, resolve the tenant, provision a data
//! context, then hand the request to the route handlers.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod layer;
pub mod scope;
pub mod stage;

pub use config::GateConfig;
pub use error::{GateError, GateErrorKind};
pub use layer::{TenantGateLayer, TenantGateService, REQUEST_ID_HEADER};
pub use pipeline::TenantGate;
pub use scope::TenantScope;
pub use stage::{GateStage, StageTracker};
