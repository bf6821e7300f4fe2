//! Tower layer that puts the tenant gate in front of the API routes.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, WWW_AUTHENTICATE};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tower::{Layer, Service};
use tracing::{debug, info_span, warn, Instrument};

use super::error::{GateError, GateErrorKind};
use super::pipeline::TenantGate;
use super::scope::TenantScope;
use super::stage::{GateStage, StageTracker};

/// Request id header, set by the HTTP layer stack when the client omits it.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

// ---------------------------------------------------------------------------
// TenantGateLayer
// ---------------------------------------------------------------------------

/// Wraps routes so that each request is authenticated, bound to a tenant and
/// given a data context before the handler runs.
#[derive(Debug, Clone)]
pub struct TenantGateLayer {
    gate: Arc<TenantGate>,
}

impl TenantGateLayer {
    #[must_use]
    pub fn new(gate: Arc<TenantGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for TenantGateLayer {
    type Service = TenantGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantGateService {
            inner,
            gate: Arc::clone(&self.gate),
        }
    }
}

// ---------------------------------------------------------------------------
// TenantGateService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TenantGateService<S> {
    inner: S,
    gate: Arc<TenantGate>,
}

/// Releases the scope's data context if the gate future is dropped before
/// the handler finished.
struct ReleaseOnDrop(Option<TenantScope>);

impl ReleaseOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if let Some(scope) = self.0.take() {
            if scope.try_release() {
                debug!(request_id = scope.request_id(), "data context released after abort");
            }
        }
    }
}

/// Reads the request id. A missing or unreadable id is replaced by a fresh
/// UUID, written back to the request, and returned as the header value the
/// response must echo.
fn request_id(req: &mut Request<Body>) -> (String, Option<HeaderValue>) {
    if let Some(id) = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        return (id.to_owned(), None);
    }
    let id = uuid::Uuid::new_v4().to_string();
    let value = HeaderValue::from_str(&id).ok();
    if let Some(value) = &value {
        req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
    }
    (id, value)
}

fn rejection_response(gate: &TenantGate, err: GateError, stage: GateStage) -> Response {
    let kind = err.kind();
    match kind {
        GateErrorKind::ConnectionUnavailable | GateErrorKind::InternalFailure => {
            warn!(kind = kind.as_str(), error = %err, "request rejected");
        }
        _ => debug!(kind = kind.as_str(), error = %err, "request rejected"),
    }
    counter!("tentia_gate_requests_total", "outcome" => kind.as_str()).increment(1);

    let mut response = err.into_response();
    if kind.is_auth_failure() {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, gate.verifier().challenge());
    }
    response.extensions_mut().insert(stage);
    response
}

impl<S> Service<Request<Body>> for TenantGateService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // The readied service goes into the future; keep a fresh clone here.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = Arc::clone(&self.gate);
        let (request_id, assigned_id) = request_id(&mut req);

        let span = info_span!(
            "tenant_gate",
            request_id = %request_id,
            principal = tracing::field::Empty,
            tenant = tracing::field::Empty,
            stage = tracing::field::Empty,
        );

        let gated = async move {
            let mut stages = StageTracker::new();
            let scope = match gate.admit(req.headers(), request_id, &mut stages).await {
                Ok(scope) => scope,
                Err(err) => return Ok(rejection_response(&gate, err, stages.current())),
            };
            let guard = ReleaseOnDrop(Some(scope.clone()));

            if let Err(err) = stages.advance(GateStage::Handling) {
                return Ok(err.into_response());
            }
            req.extensions_mut().insert(scope.clone());
            let mut response = inner.call(req).await?;

            scope.release().await;
            guard.disarm();
            if let Err(err) = stages.advance(GateStage::Completed) {
                return Ok(err.into_response());
            }

            counter!("tentia_gate_requests_total", "outcome" => "admitted").increment(1);
            response.extensions_mut().insert(stages.current());
            Ok::<_, Infallible>(response)
        }
        .instrument(span);

        Box::pin(async move {
            let mut response = gated.await?;
            if let Some(id) = assigned_id {
                response.headers_mut().insert(REQUEST_ID_HEADER, id);
            }
            Ok(response)
        })
    }
}
