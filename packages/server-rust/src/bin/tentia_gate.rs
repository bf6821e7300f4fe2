//! `tentia-gate` server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::http::HeaderName;
use clap::{Parser, ValueEnum};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tentia_core::{synthesize, ConnectionTemplate, TenantKey, TenantPrefix};
use tentia_server::auth::{
    parse_identity_spec, BasicVerifier, BearerJwtVerifier, CredentialVerifier, IdentityStore,
    MemoryIdentityStore, StoredSecret,
};
use tentia_server::gate::{GateConfig, TenantGate};
use tentia_server::network::{NetworkConfig, NetworkModule};
use tentia_server::provision::{ContextTracker, MemoryTenantConnector, TenantConnector};
use tentia_server::tenant::{DuplicateTenantPolicy, TenantExtractor, DEFAULT_TENANT_HEADER};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AuthScheme {
    Basic,
    Bearer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tentia-gate", version, about = "Authenticating, tenant-routing HTTP gate")]
struct Args {
    /// Bind address.
    #[arg(long, env = "TENTIA_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "TENTIA_PORT", default_value_t = 8080)]
    port: u16,

    /// Backend connection string containing exactly one `{dbName}`.
    #[arg(long, env = "TENTIA_CONNECTION_TEMPLATE")]
    connection_template: String,

    /// Prepended to every tenant key, e.g. `tc_`.
    #[arg(long, env = "TENTIA_TENANT_PREFIX", default_value = "")]
    tenant_prefix: String,

    #[arg(long, env = "TENTIA_TENANT_HEADER", default_value = DEFAULT_TENANT_HEADER)]
    tenant_header: String,

    /// What to do with repeated tenant headers: `reject` or `first`.
    #[arg(long, env = "TENTIA_DUPLICATE_TENANT", default_value = "reject")]
    duplicate_tenant: DuplicateTenantPolicy,

    #[arg(long, env = "TENTIA_AUTH_SCHEME", value_enum, default_value_t = AuthScheme::Basic)]
    auth_scheme: AuthScheme,

    /// Realm announced in `WWW-Authenticate`.
    #[arg(long, env = "TENTIA_AUTH_REALM", default_value = "tentia")]
    realm: String,

    /// Static identities, `name:secret` or `name:sha256:<hex>`.
    #[arg(
        long = "identity",
        env = "TENTIA_IDENTITIES",
        value_delimiter = ',',
        value_parser = parse_identity_spec
    )]
    identities: Vec<(String, StoredSecret)>,

    /// PostgreSQL URL of the `api_credentials` store (feature `postgres`).
    #[arg(long, env = "TENTIA_IDENTITY_STORE_URL", hide_env_values = true)]
    identity_store_url: Option<String>,

    /// HS256 secret for bearer tokens.
    #[arg(long, env = "TENTIA_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    #[arg(long, env = "TENTIA_JWT_ISSUER")]
    jwt_issuer: Option<String>,

    #[arg(long, env = "TENTIA_BACKEND", value_enum, default_value_t = Backend::Memory)]
    backend: Backend,

    /// Tenant keys to create in-memory databases for (memory backend).
    #[arg(long = "memory-tenant", env = "TENTIA_MEMORY_TENANTS", value_delimiter = ',')]
    memory_tenants: Vec<String>,

    /// Maximum pooled connections per tenant target (postgres backend).
    #[arg(long, env = "TENTIA_POOL_SIZE", default_value_t = 5)]
    pool_size: u32,

    #[arg(long, env = "TENTIA_LOOKUP_TIMEOUT_SECS", default_value_t = 5)]
    lookup_timeout_secs: u64,

    #[arg(long, env = "TENTIA_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    connect_timeout_secs: u64,

    #[arg(long, env = "TENTIA_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    #[arg(long, env = "TENTIA_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,

    #[arg(long = "cors-origin", env = "TENTIA_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "TENTIA_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    #[arg(long, env = "TENTIA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

fn install_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    describe_counter!("tentia_gate_requests_total", "Gated requests by outcome");
    describe_gauge!("tentia_data_contexts_open", "Data contexts currently open");
    describe_histogram!(
        "tentia_data_context_held_seconds",
        Unit::Seconds,
        "How long requests held their data context"
    );
    describe_histogram!(
        "tentia_connect_seconds",
        Unit::Seconds,
        "Time to open a tenant session"
    );
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn postgres_identity_store(url: &str) -> anyhow::Result<Arc<dyn IdentityStore>> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to the identity store")?;
    Ok(Arc::new(tentia_server::auth::PgIdentityStore::new(pool)))
}

#[cfg(not(feature = "postgres"))]
async fn postgres_identity_store(_url: &str) -> anyhow::Result<Arc<dyn IdentityStore>> {
    anyhow::bail!("--identity-store-url requires building with the `postgres` feature")
}

async fn identity_store(args: &Args) -> anyhow::Result<Arc<dyn IdentityStore>> {
    if let Some(url) = &args.identity_store_url {
        return postgres_identity_store(url).await;
    }

    let store = MemoryIdentityStore::new();
    for (name, secret) in &args.identities {
        store.insert(name.clone(), secret.clone());
    }
    if store.is_empty() {
        warn!("no identities configured; every Basic request will be rejected");
    }
    Ok(Arc::new(store))
}

async fn build_verifier(args: &Args) -> anyhow::Result<Arc<dyn CredentialVerifier>> {
    match args.auth_scheme {
        AuthScheme::Basic => {
            let store = identity_store(args).await?;
            Ok(Arc::new(BasicVerifier::new(store, &args.realm)))
        }
        AuthScheme::Bearer => {
            let secret = args
                .jwt_secret
                .as_deref()
                .context("--jwt-secret is required for bearer auth")?;
            let mut verifier = BearerJwtVerifier::new(secret.as_bytes(), &args.realm);
            if let Some(issuer) = &args.jwt_issuer {
                verifier = verifier.with_issuer(issuer);
            }
            Ok(Arc::new(verifier))
        }
    }
}

#[cfg(feature = "postgres")]
fn postgres_connector(args: &Args) -> anyhow::Result<Arc<dyn TenantConnector>> {
    use tentia_server::provision::{PgConnectorOptions, PgTenantConnector};

    Ok(Arc::new(PgTenantConnector::new(PgConnectorOptions {
        max_connections_per_tenant: args.pool_size,
        acquire_timeout: Duration::from_secs(args.connect_timeout_secs),
        ..PgConnectorOptions::default()
    })))
}

#[cfg(not(feature = "postgres"))]
fn postgres_connector(_args: &Args) -> anyhow::Result<Arc<dyn TenantConnector>> {
    anyhow::bail!("the postgres backend requires building with the `postgres` feature")
}

fn build_connector(args: &Args, config: &GateConfig) -> anyhow::Result<Arc<dyn TenantConnector>> {
    match args.backend {
        Backend::Memory => {
            let connector = MemoryTenantConnector::new();
            for raw in &args.memory_tenants {
                let key = TenantKey::parse(raw)
                    .with_context(|| format!("invalid --memory-tenant {raw:?}"))?;
                connector.register(&synthesize(&config.template, &config.prefix, Some(&key))?);
            }
            info!(tenants = args.memory_tenants.len(), "memory backend ready");
            Ok(Arc::new(connector))
        }
        Backend::Postgres => postgres_connector(args),
    }
}

fn gate_config(args: &Args) -> anyhow::Result<GateConfig> {
    let template = ConnectionTemplate::parse(args.connection_template.clone())
        .context("invalid --connection-template")?;
    let prefix = TenantPrefix::parse(&args.tenant_prefix).context("invalid --tenant-prefix")?;
    let header = HeaderName::try_from(args.tenant_header.as_str())
        .context("invalid --tenant-header")?;

    Ok(GateConfig {
        template,
        prefix,
        tenant: TenantExtractor::new(header, args.duplicate_tenant),
        identity_lookup_timeout: Duration::from_secs(args.lookup_timeout_secs),
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for ctrl-c; shut down by terminating the process");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    if let Some(addr) = args.metrics_addr {
        install_metrics(addr)?;
    }

    let config = Arc::new(gate_config(&args)?);
    let verifier = build_verifier(&args).await?;
    let connector = build_connector(&args, &config)?;
    let gate = Arc::new(TenantGate::new(config, verifier, connector, ContextTracker::new()));

    let network = NetworkConfig {
        host: args.host.clone(),
        port: args.port,
        cors_origins: args.cors_origins.clone(),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        drain_timeout: Duration::from_secs(args.drain_timeout_secs),
    };

    let mut module = NetworkModule::new(network, gate);
    let port = module.start().await?;
    info!(
        port,
        scheme = ?args.auth_scheme,
        backend = ?args.backend,
        "tentia gate started"
    );
    module.serve(shutdown_signal()).await
}
