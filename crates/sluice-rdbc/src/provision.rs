//! Scoped connection acquisition
//!
//! A [`Provisioner`] opens one connection per [`ConnectionLease`]. The lease
//! closes its connection exactly once: on [`ConnectionLease::release`], or
//! on drop when the holder goes away early (stream dropped, task cancelled,
//! error propagated with `?`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory};
use crate::error::{Error, ErrorCategory, Result};
use crate::query::Query;
use crate::types::Row;

/// Provisioner statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionStats {
    /// Connections successfully opened
    pub acquisitions: u64,
    /// Connections closed
    pub releases: u64,
    /// Failed connection attempts
    pub acquisition_failures: u64,
    /// Statements executed
    pub statements: u64,
}

impl ProvisionStats {
    /// Leases currently holding an open connection
    pub fn open_leases(&self) -> u64 {
        self.acquisitions.saturating_sub(self.releases)
    }
}

/// Atomic provisioner stats for concurrent updates
#[derive(Debug, Default)]
#[allow(missing_docs)]
pub struct AtomicProvisionStats {
    pub acquisitions: AtomicU64,
    pub releases: AtomicU64,
    pub acquisition_failures: AtomicU64,
    pub statements: AtomicU64,
}

impl AtomicProvisionStats {
    /// Record an acquisition
    pub fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a release
    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed acquisition
    pub fn record_failure(&self) {
        self.acquisition_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an executed statement
    pub fn record_statement(&self) {
        self.statements.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current stats
    pub fn snapshot(&self) -> ProvisionStats {
        ProvisionStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            acquisition_failures: self.acquisition_failures.load(Ordering::Relaxed),
            statements: self.statements.load(Ordering::Relaxed),
        }
    }
}

/// Opens connections as scoped leases.
///
/// Cloning is cheap; clones share the factory and the statistics.
#[derive(Clone)]
pub struct Provisioner {
    factory: Arc<dyn ConnectionFactory>,
    config: Arc<ConnectionConfig>,
    stats: Arc<AtomicProvisionStats>,
    next_lease_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("database_type", &self.factory.database_type())
            .field("config", &self.config)
            .finish()
    }
}

impl Provisioner {
    /// Create a provisioner for a factory and configuration
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: ConnectionConfig) -> Self {
        Self {
            factory,
            config: Arc::new(config),
            stats: Arc::new(AtomicProvisionStats::default()),
            next_lease_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Create a provisioner using the compiled-in backend for the URL scheme
    pub fn from_config(config: ConnectionConfig) -> Result<Self> {
        let factory = crate::connection::factory_for(&config)?;
        Ok(Self::new(factory, config))
    }

    /// Connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connection factory
    pub fn factory(&self) -> &Arc<dyn ConnectionFactory> {
        &self.factory
    }

    /// Statistics snapshot
    pub fn stats(&self) -> ProvisionStats {
        self.stats.snapshot()
    }

    /// Open a connection.
    ///
    /// Failures are reported as [`Error::Connection`], except a malformed
    /// configuration which stays [`Error::Configuration`].
    pub async fn acquire(&self) -> Result<ConnectionLease> {
        let lease_id = self.next_lease_id.fetch_add(1, Ordering::Relaxed);

        match self.factory.connect(&self.config).await {
            Ok(conn) => {
                self.stats.record_acquisition();
                debug!(
                    lease_id,
                    database = %self.factory.database_type(),
                    "Connection acquired"
                );
                Ok(ConnectionLease {
                    id: lease_id,
                    conn: Some(conn),
                    stats: Arc::clone(&self.stats),
                })
            }
            Err(e) => {
                self.stats.record_failure();
                warn!(lease_id, url = %self.config.redacted_url(), error = %e, "Connection failed");
                match e.category() {
                    ErrorCategory::Connection | ErrorCategory::Configuration => Err(e),
                    _ => Err(Error::connection_with_source(
                        "failed to acquire connection",
                        e,
                    )),
                }
            }
        }
    }
}

/// An open connection and its cursor, closed exactly once
pub struct ConnectionLease {
    id: u64,
    conn: Option<Box<dyn Connection>>,
    stats: Arc<AtomicProvisionStats>,
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

impl ConnectionLease {
    /// Lease id, unique per provisioner
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the connection has been closed
    #[inline]
    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    fn connection_mut(&mut self) -> Result<&mut Box<dyn Connection>> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::connection("connection already released"))
    }

    /// Execute a query, opening its cursor
    pub async fn execute(&mut self, query: &Query) -> Result<()> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| Error::connection("connection already released"))?;
        debug!(
            lease_id = self.id,
            sql = query.sql(),
            params = query.params().len(),
            "Executing query"
        );
        self.stats.record_statement();
        conn.execute(query.sql(), query.params()).await
    }

    /// Fetch the next row from the cursor
    pub async fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.connection_mut()?.fetch_one().await
    }

    /// Fetch up to `size` rows from the cursor
    pub async fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>> {
        self.connection_mut()?.fetch_many(size).await
    }

    /// Check the connection is still alive
    pub async fn is_valid(&mut self) -> bool {
        match self.conn.as_mut() {
            Some(conn) => conn.is_valid().await,
            None => false,
        }
    }

    /// Close the connection now
    pub fn release(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
            self.stats.record_release();
            debug!(lease_id = self.id, "Connection released");
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        self.close();
    }
}
