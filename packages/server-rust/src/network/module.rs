//! Network module with deferred startup lifecycle.
//!
//! `new()` assembles shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until shutdown, then drains open data
//! contexts before returning.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, readiness_handler, whoami_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::gate::{TenantGate, TenantGateLayer};

/// Owns the HTTP server lifecycle around a [`TenantGate`].
///
/// Routes:
/// - `GET /health`, `GET /health/live`, `GET /health/ready` (not gated)
/// - `GET /api/whoami` plus any routes added with
///   [`with_api_routes`](Self::with_api_routes), all behind the gate
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    gate: Arc<TenantGate>,
    shutdown: Arc<ShutdownController>,
    api_routes: Router<AppState>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, gate: Arc<TenantGate>) -> Self {
        let contexts = gate.provisioner().tracker().clone();
        Self {
            config,
            listener: None,
            gate,
            shutdown: Arc::new(ShutdownController::new(contexts)),
            api_routes: Router::new(),
        }
    }

    /// Adds application routes under `/api`. They run only for admitted
    /// requests and extract [`TenantScope`](crate::gate::TenantScope).
    #[must_use]
    pub fn with_api_routes(mut self, routes: Router<AppState>) -> Self {
        self.api_routes = self.api_routes.merge(routes);
        self
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn gate(&self) -> Arc<TenantGate> {
        Arc::clone(&self.gate)
    }

    /// Assembles the router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            shutdown: Arc::clone(&self.shutdown),
            contexts: self.gate.provisioner().tracker().clone(),
            backend: self.gate.provisioner().connector().backend(),
            start_time: Instant::now(),
        };

        let api = Router::new()
            .route("/whoami", get(whoami_handler))
            .merge(self.api_routes.clone())
            .route_layer(TenantGateLayer::new(Arc::clone(&self.gate)));

        let layers = build_http_layers(&self.config, self.gate.config().tenant.header());

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .nest("/api", api)
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener and returns the bound port (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves or the controller is triggered, then
    /// drains.
    ///
    /// When the signal fires the health state moves to Draining and the
    /// listener stops accepting. Once in-flight connections finish, waits up
    /// to the drain timeout for open data contexts, closes the connector and
    /// moves to Stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let shutdown_ctrl = Arc::clone(&self.shutdown);

        let signal_ctrl = Arc::clone(&shutdown_ctrl);
        let mut triggered = shutdown_ctrl.shutdown_receiver();
        let signal = async move {
            tokio::select! {
                () = shutdown => {
                    info!("shutdown signal received");
                    signal_ctrl.trigger_shutdown();
                }
                _ = triggered.wait_for(|stop| *stop) => info!("shutdown triggered"),
            }
        };

        shutdown_ctrl.set_ready();
        info!("serving HTTP");

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        // Covers a server that stopped without the signal firing.
        if shutdown_ctrl.health_state() == super::HealthState::Ready {
            shutdown_ctrl.trigger_shutdown();
        }

        if shutdown_ctrl.wait_for_drain(self.config.drain_timeout).await {
            info!("all data contexts released");
        } else {
            warn!(
                open = shutdown_ctrl.contexts().open(),
                "drain timeout expired with data contexts still open"
            );
        }
        self.gate.provisioner().connector().close().await;
        Ok(())
    }
}
