//! PostgreSQL-backed identity store.

use anyhow::Context as _;
use async_trait::async_trait;
use sqlx::PgPool;

use super::store::{IdentityStore, StoredSecret};

const LOOKUP_SQL: &str = "SELECT secret_sha256 FROM api_credentials WHERE name = $1";

/// Looks principals up in an `api_credentials(name TEXT PRIMARY KEY, secret_sha256 TEXT)`
/// table. Digests are stored hex-encoded.
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn lookup(&self, name: &str) -> anyhow::Result<Option<StoredSecret>> {
        let digest = sqlx::query_scalar::<_, String>(LOOKUP_SQL)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("api_credentials lookup failed")?;

        digest
            .map(|hex_digest| {
                StoredSecret::from_sha256_hex(&hex_digest)
                    .with_context(|| format!("stored digest for {name:?} is not valid hex sha256"))
            })
            .transpose()
    }
}
