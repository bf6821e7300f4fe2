//! PostgreSQL tenant connector: one lazily created pool per resolved target.

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres};
use tentia_core::ResolvedConnectionTarget;
use tracing::debug;

use super::connector::{ConnectError, TenantConnector, TenantSession};

/// Pool settings applied to every per-tenant pool.
#[derive(Debug, Clone)]
pub struct PgConnectorOptions {
    pub max_connections_per_tenant: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PgConnectorOptions {
    fn default() -> Self {
        Self {
            max_connections_per_tenant: 5,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Session holding one pooled connection. Dropping it returns the
/// connection to the pool of the target it was opened for.
#[derive(Debug)]
pub struct PgSession {
    conn: PoolConnection<Postgres>,
}

impl PgSession {
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

impl TenantSession for PgSession {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Keeps a separate pool per resolved target, so a pooled connection is
/// never handed to a request for a different tenant.
#[derive(Debug, Default)]
pub struct PgTenantConnector {
    options: PgConnectorOptions,
    pools: DashMap<String, PgPool>,
}

impl PgTenantConnector {
    #[must_use]
    pub fn new(options: PgConnectorOptions) -> Self {
        Self {
            options,
            pools: DashMap::new(),
        }
    }

    /// Number of per-target pools currently held.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    fn pool_for(&self, target: &ResolvedConnectionTarget) -> Result<PgPool, ConnectError> {
        if let Some(pool) = self.pools.get(target.expose()) {
            return Ok(pool.clone());
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.options.max_connections_per_tenant)
            .acquire_timeout(self.options.acquire_timeout)
            .idle_timeout(self.options.idle_timeout)
            .connect_lazy(target.expose())
            .map_err(|_| ConnectError::InvalidTarget)?;

        debug!(segment = target.segment(), "created tenant pool");
        Ok(self
            .pools
            .entry(target.expose().to_string())
            .or_insert(pool)
            .clone())
    }

    /// Drops the pool for a target whose connect failed, unless it still holds
    /// connections. Keeps tenant ids that never connect from accumulating pools.
    async fn evict_unused(&self, target: &ResolvedConnectionTarget) {
        let evicted = self
            .pools
            .remove_if(target.expose(), |_, pool| pool.size() == 0);
        if let Some((_, pool)) = evicted {
            pool.close().await;
            debug!(segment = target.segment(), "evicted tenant pool after failed connect");
        }
    }
}

fn classify(err: sqlx::Error) -> ConnectError {
    match err {
        sqlx::Error::Configuration(_) => ConnectError::InvalidTarget,
        sqlx::Error::Database(db) => ConnectError::Rejected(db.message().to_string()),
        sqlx::Error::PoolTimedOut => ConnectError::Unreachable("pool acquire timed out".to_string()),
        sqlx::Error::Io(io) => ConnectError::Unreachable(io.to_string()),
        sqlx::Error::Tls(_) => ConnectError::Unreachable("tls handshake failed".to_string()),
        other => ConnectError::Unreachable(other.to_string()),
    }
}

#[async_trait]
impl TenantConnector for PgTenantConnector {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn connect(
        &self,
        target: &ResolvedConnectionTarget,
    ) -> Result<Box<dyn TenantSession>, ConnectError> {
        let pool = self.pool_for(target)?;
        match pool.acquire().await {
            Ok(conn) => Ok(Box::new(PgSession { conn })),
            Err(err) => {
                self.evict_unused(target).await;
                Err(classify(err))
            }
        }
    }

    async fn close(&self) {
        let pools: Vec<PgPool> = self.pools.iter().map(|entry| entry.value().clone()).collect();
        for pool in pools {
            pool.close().await;
        }
        self.pools.clear();
    }
}
