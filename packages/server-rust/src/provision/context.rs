use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{gauge, histogram};
use tentia_core::{ResolvedConnectionTarget, TenantKey};
use tracing::debug;

use super::connector::{ConnectError, TenantConnector, TenantSession};

/// Process-wide count of open data contexts.
///
/// Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct ContextTracker {
    open: Arc<AtomicUsize>,
}

impl ContextTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of data contexts currently alive.
    #[must_use]
    pub fn open(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    /// Counts one more open context until the returned lease is dropped.
    #[must_use]
    pub fn lease(&self) -> ContextLease {
        self.open.fetch_add(1, Ordering::AcqRel);
        gauge!("tentia_data_contexts_open").increment(1.0);
        ContextLease {
            open: Arc::clone(&self.open),
            acquired: Instant::now(),
        }
    }
}

/// RAII token for one open data context.
///
/// Dropping it decrements the open count and records how long the context
/// was held, including when the owning request is aborted.
#[derive(Debug)]
pub struct ContextLease {
    open: Arc<AtomicUsize>,
    acquired: Instant,
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
        gauge!("tentia_data_contexts_open").decrement(1.0);
        let held = self.acquired.elapsed();
        histogram!("tentia_data_context_held_seconds").record(held.as_secs_f64());
        debug!(held_secs = held.as_secs_f64(), "data context released");
    }
}

/// A live session bound to one tenant's resolved target, owned by one request.
pub struct DataContext {
    tenant: TenantKey,
    target: ResolvedConnectionTarget,
    session: Box<dyn TenantSession>,
    // Declared last so the session is returned before the count drops.
    lease: ContextLease,
}

impl DataContext {
    #[must_use]
    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    #[must_use]
    pub fn target(&self) -> &ResolvedConnectionTarget {
        &self.target
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.session.backend()
    }

    /// Borrows the session as its concrete type, or `None` on a type mismatch.
    #[must_use]
    pub fn session<T: TenantSession>(&self) -> Option<&T> {
        self.session.as_any().downcast_ref::<T>()
    }

    /// Mutable variant of [`session`](Self::session).
    pub fn session_mut<T: TenantSession>(&mut self) -> Option<&mut T> {
        self.session.as_any_mut().downcast_mut::<T>()
    }
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContext")
            .field("tenant", &self.tenant)
            .field("target", &self.target)
            .field("backend", &self.session.backend())
            .finish_non_exhaustive()
    }
}

/// Opens data contexts through a [`TenantConnector`] with a bounded wait.
#[derive(Clone)]
pub struct Provisioner {
    connector: Arc<dyn TenantConnector>,
    tracker: ContextTracker,
    connect_timeout: Duration,
}

impl Provisioner {
    #[must_use]
    pub fn new(
        connector: Arc<dyn TenantConnector>,
        tracker: ContextTracker,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            tracker,
            connect_timeout,
        }
    }

    #[must_use]
    pub fn connector(&self) -> &Arc<dyn TenantConnector> {
        &self.connector
    }

    #[must_use]
    pub fn tracker(&self) -> &ContextTracker {
        &self.tracker
    }

    /// Opens a session for `tenant` at `target`.
    ///
    /// # Errors
    ///
    /// Returns the connector's [`ConnectError`], or [`ConnectError::TimedOut`]
    /// when the connector does not answer within the connect timeout. No
    /// context is counted as open on failure.
    pub async fn provision(
        &self,
        tenant: TenantKey,
        target: ResolvedConnectionTarget,
    ) -> Result<DataContext, ConnectError> {
        let started = Instant::now();
        let session = tokio::time::timeout(self.connect_timeout, self.connector.connect(&target))
            .await
            .map_err(|_| ConnectError::TimedOut(self.connect_timeout))??;
        histogram!("tentia_connect_seconds").record(started.elapsed().as_secs_f64());

        debug!(tenant = %tenant, segment = target.segment(), backend = session.backend(), "data context opened");
        Ok(DataContext {
            tenant,
            target,
            session,
            lease: self.tracker.lease(),
        })
    }
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("backend", &self.connector.backend())
            .field("open", &self.tracker.open())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
