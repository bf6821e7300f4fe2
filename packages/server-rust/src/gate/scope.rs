use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tentia_core::{Identity, RequestContext, TenantKey};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::error::GateError;
use crate::provision::DataContext;

struct ScopeInner {
    context: RequestContext,
    data: Mutex<Option<DataContext>>,
}

/// What the gate hands to handlers of an admitted request: the verified
/// identity, the tenant, and the request's data context slot.
///
/// Inserted into request extensions by [`TenantGateLayer`](super::TenantGateLayer)
/// and extracted as a handler argument. Clones share the same slot; the gate
/// empties it when the request completes.
#[derive(Clone)]
pub struct TenantScope {
    inner: Arc<ScopeInner>,
}

impl TenantScope {
    pub(crate) fn new(context: RequestContext, data: DataContext) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                context,
                data: Mutex::new(Some(data)),
            }),
        }
    }

    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.inner.context
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.inner.context.identity
    }

    #[must_use]
    pub fn tenant(&self) -> &TenantKey {
        &self.inner.context.tenant
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.inner.context.request_id
    }

    /// Locks the request's data context.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InternalFailure`] once the context has been released.
    pub async fn data_context(&self) -> Result<MappedMutexGuard<'_, DataContext>, GateError> {
        let guard = self.inner.data.lock().await;
        MutexGuard::try_map(guard, Option::as_mut).map_err(|_| {
            GateError::InternalFailure("data context used after release".to_string())
        })
    }

    /// Releases the data context. Returns `false` if it was already released.
    pub async fn release(&self) -> bool {
        self.inner.data.lock().await.take().is_some()
    }

    /// Non-blocking release used from `Drop`. Returns `false` when the slot
    /// is empty or currently locked.
    pub(crate) fn try_release(&self) -> bool {
        self.inner
            .data
            .try_lock()
            .map(|mut slot| slot.take().is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for TenantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantScope")
            .field("context", &self.inner.context)
            .finish_non_exhaustive()
    }
}

impl<S> FromRequestParts<S> for TenantScope
where
    S: Send + Sync,
{
    type Rejection = GateError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<TenantScope>().cloned().ok_or_else(|| {
            GateError::InternalFailure("handler is not mounted behind the tenant gate".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::Request;
    use tentia_core::{synthesize, ConnectionTemplate, TenantPrefix};

    use super::*;
    use crate::provision::{ContextTracker, MemorySession, MemoryTenantConnector, Provisioner};

    async fn scope(tracker: &ContextTracker) -> TenantScope {
        let acme = TenantKey::parse("acme").unwrap();
        let template = ConnectionTemplate::parse("mem://{dbName}").unwrap();
        let target = synthesize(&template, &TenantPrefix::default(), Some(&acme)).unwrap();
        let connector = Arc::new(MemoryTenantConnector::new());
        connector.register(&target);
        let data = Provisioner::new(connector, tracker.clone(), Duration::from_secs(1))
            .provision(acme.clone(), target)
            .await
            .unwrap();
        let context = RequestContext {
            request_id: "req-1".to_string(),
            identity: Identity::new("alice", "Basic"),
            tenant: acme,
        };
        TenantScope::new(context, data)
    }

    #[tokio::test]
    async fn data_context_until_released() {
        let tracker = ContextTracker::new();
        let scope = scope(&tracker).await;
        {
            let mut data = scope.data_context().await.unwrap();
            assert!(data.session_mut::<MemorySession>().is_some());
        }
        assert_eq!(tracker.open(), 1);
        assert!(scope.release().await);
        assert_eq!(tracker.open(), 0);
        assert!(!scope.release().await);
        assert!(scope.data_context().await.is_err());
    }

    #[tokio::test]
    async fn try_release_skips_a_held_lock() {
        let tracker = ContextTracker::new();
        let scope = scope(&tracker).await;
        let held = scope.data_context().await.unwrap();
        assert!(!scope.try_release());
        drop(held);
        assert!(scope.try_release());
        assert_eq!(tracker.open(), 0);
    }

    #[tokio::test]
    async fn dropping_last_clone_releases() {
        let tracker = ContextTracker::new();
        let scope = scope(&tracker).await;
        let clone = scope.clone();
        drop(scope);
        assert_eq!(tracker.open(), 1);
        drop(clone);
        assert_eq!(tracker.open(), 0);
    }

    #[tokio::test]
    async fn extractor_requires_the_gate() {
        let (mut parts, ()) = Request::new(()).into_parts();
        let err = TenantScope::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, GateError::InternalFailure(_)));

        let tracker = ContextTracker::new();
        parts.extensions.insert(scope(&tracker).await);
        let extracted = TenantScope::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted.tenant().as_str(), "acme");
        assert_eq!(extracted.identity().principal, "alice");
        assert_eq!(extracted.request_id(), "req-1");
    }
}
