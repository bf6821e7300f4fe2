//! HTTP handlers and the shared application state.

pub mod health;
pub mod whoami;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use whoami::whoami_handler;

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::provision::ContextTracker;

/// Shared state passed to handlers via `State` extraction. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Health state and shutdown coordination.
    pub shutdown: Arc<ShutdownController>,
    /// Open data context counter.
    pub contexts: ContextTracker,
    /// Name of the tenant backend, e.g. `"memory"`.
    pub backend: &'static str,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
