//! HTTP edge middleware for the gate server.
//!
//! The first layer listed is the outermost: it sees the request first and
//! the response last. The tenant gate itself is not part of this stack; it
//! is applied as a route layer on `/api` only.

use axum::http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{Method, StatusCode};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use crate::gate::REQUEST_ID_HEADER;

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            CorsLayer,
            tower::layer::util::Stack<
                CompressionLayer,
                tower::layer::util::Stack<
                    TraceLayer<
                        tower_http::classify::SharedClassifier<
                            tower_http::classify::ServerErrorsAsFailures,
                        >,
                    >,
                    tower::layer::util::Stack<
                        SetRequestIdLayer<MakeRequestUuid>,
                        tower::layer::util::Identity,
                    >,
                >,
            >,
        >,
    >,
>;

/// Builds the edge middleware stack.
///
/// Outermost to innermost:
/// 1. `SetRequestId` assigns a UUID `x-request-id` when the client sent none,
///    so the gate's tracing span always has one
/// 2. `Trace` logs request/response
/// 3. `Compression` (gzip)
/// 4. `CORS`, allowing the credential and tenant headers
/// 5. `Timeout`; an expiry drops the gated future, which releases its data context
/// 6. `PropagateRequestId` copies `x-request-id` onto the response
#[must_use]
pub fn build_http_layers(config: &NetworkConfig, tenant_header: &HeaderName) -> HttpLayers {
    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.cors_origins, tenant_header))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .into_inner()
}

fn build_cors_layer(origins: &[String], tenant_header: &HeaderName) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            REQUEST_ID_HEADER,
            tenant_header.clone(),
        ])
        .expose_headers([WWW_AUTHENTICATE, REQUEST_ID_HEADER])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tenant::DEFAULT_TENANT_HEADER;

    #[test]
    fn build_http_layers_with_defaults() {
        let _layers = build_http_layers(
            &NetworkConfig::default(),
            &HeaderName::from_static(DEFAULT_TENANT_HEADER),
        );
    }

    #[test]
    fn build_http_layers_with_origins_and_timeout() {
        let config = NetworkConfig {
            cors_origins: vec!["https://app.example.com".to_string(), "bad origin\n".to_string()],
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let _layers = build_http_layers(&config, &HeaderName::from_static("x-tenant"));
    }
}
