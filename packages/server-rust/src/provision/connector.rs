use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use tentia_core::ResolvedConnectionTarget;

/// A live backend session held by a [`DataContext`](super::DataContext).
///
/// Handlers reach the concrete type through
/// [`DataContext::session`](super::DataContext::session), which downcasts via
/// the `Any` accessors.
pub trait TenantSession: Any + Send {
    /// Short backend name, e.g. `"memory"` or `"postgres"`.
    fn backend(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Failures while establishing a tenant session.
///
/// Messages never contain the resolved target, which may embed credentials.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("tenant data store unreachable: {0}")]
    Unreachable(String),
    #[error("tenant data store refused the session: {0}")]
    Rejected(String),
    #[error("resolved target is not a usable connection string")]
    InvalidTarget,
    #[error("connection attempt exceeded {0:?}")]
    TimedOut(Duration),
}

/// Opens sessions against resolved targets.
///
/// Implementations must never hand a session opened for one target to a
/// request for a different target.
#[async_trait]
pub trait TenantConnector: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Opens a session bound to `target`.
    async fn connect(
        &self,
        target: &ResolvedConnectionTarget,
    ) -> Result<Box<dyn TenantSession>, ConnectError>;

    /// Releases pooled resources at shutdown.
    async fn close(&self) {}
}
