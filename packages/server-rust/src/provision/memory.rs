//! In-memory tenant databases, for development and tests.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tentia_core::ResolvedConnectionTarget;

use super::connector::{ConnectError, TenantConnector, TenantSession};

/// One tenant's key/value records.
#[derive(Debug)]
pub struct TenantDatabase {
    name: String,
    records: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl TenantDatabase {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// The target segment this database was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.records.read().get(key).cloned()
    }

    /// Stores `value`, returning the previous value under `key`.
    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) -> Option<serde_json::Value> {
        self.records.write().insert(key.into(), value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

/// Session onto a [`TenantDatabase`].
#[derive(Debug)]
pub struct MemorySession {
    database: Arc<TenantDatabase>,
    active: Arc<AtomicUsize>,
}

impl MemorySession {
    #[must_use]
    pub fn database(&self) -> &TenantDatabase {
        &self.database
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl TenantSession for MemorySession {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Connector over registered in-memory databases keyed by full resolved target.
///
/// Targets that were never registered are unreachable, the same way a
/// database server refuses a database that does not exist.
#[derive(Debug, Default)]
pub struct MemoryTenantConnector {
    databases: DashMap<String, Arc<TenantDatabase>>,
    attempts: AtomicU64,
    active: Arc<AtomicUsize>,
    connect_delay: Option<Duration>,
}

impl MemoryTenantConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every connect attempt wait `delay` first.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Registers a database for `target`. Registering the same target twice
    /// returns the existing database.
    pub fn register(&self, target: &ResolvedConnectionTarget) -> Arc<TenantDatabase> {
        let entry = self
            .databases
            .entry(target.expose().to_string())
            .or_insert_with(|| Arc::new(TenantDatabase::new(target.segment())));
        Arc::clone(entry.value())
    }

    /// Looks up the database registered for `target`.
    #[must_use]
    pub fn database(&self, target: &ResolvedConnectionTarget) -> Option<Arc<TenantDatabase>> {
        self.databases
            .get(target.expose())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Total connect attempts, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Sessions handed out and not yet dropped.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

#[async_trait]
impl TenantConnector for MemoryTenantConnector {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn connect(
        &self,
        target: &ResolvedConnectionTarget,
    ) -> Result<Box<dyn TenantSession>, ConnectError> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        let database = self
            .database(target)
            .ok_or_else(|| ConnectError::Unreachable(format!("no database named {}", target.segment())))?;

        self.active.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MemorySession {
            database,
            active: Arc::clone(&self.active),
        }))
    }
}
