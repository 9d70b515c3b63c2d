//! # sluice-rdbc
//!
//! Pull rows out of a relational table without materializing it in memory.
//!
//! Three access patterns, each an explicit stream object that owns its
//! connection and releases it on every exit path (exhaustion, error, early
//! close or drop):
//!
//! - **Row streaming**: [`stream::RecordStream`] yields one record per pull
//! - **Batch streaming**: [`batch::BatchStream`] yields fixed-size groups,
//!   optionally filtered per record
//! - **Lazy pagination**: [`paginate::Paginator`] issues one
//!   `LIMIT … OFFSET …` query per page, each on its own connection
//!
//! plus [`aggregate::average`], a running mean over a row stream.
//!
//! Binary identifier columns (`user_id` by default) always reach the caller
//! as lowercase hex strings.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice_rdbc::prelude::*;
//!
//! let provisioner = Provisioner::from_config(
//!     ConnectionConfig::new("mysql://root@localhost/ALX_prodev"),
//! )?;
//!
//! let mut users = stream_rows(&provisioner, "SELECT * FROM user_data");
//! while let Some(user) = users.next().await? {
//!     println!("{}", user.to_json());
//! }
//!
//! let mut over_25 = stream_batches(&provisioner, "SELECT * FROM user_data", 10)?
//!     .filter_batches(|r| r.get_f64("age").ok().flatten() > Some(25.0));
//! while let Some(batch) = over_25.next().await? {
//!     println!("batch {}: {} users", batch.index(), batch.len());
//! }
//!
//! let mut pages = lazy_paginate(&provisioner, "SELECT * FROM user_data ORDER BY user_id", 5)?;
//! while let Some(page) = pages.next().await? {
//!     println!("offset {}: {} users", page.offset(), page.len());
//! }
//!
//! let mean_age = average(&provisioner, "SELECT age FROM user_data", "age").await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `mysql` (default) - MySQL/MariaDB support via mysql_async
//! - `postgres` - PostgreSQL support via tokio-postgres
//! - `full` - All backends

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod paginate;
pub mod provision;
pub mod query;
pub mod record;
pub mod stream;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and record types
    pub use crate::record::{Batch, Page, Record, RecordDecoder};
    pub use crate::types::{Row, Value};

    // Connections
    pub use crate::connection::{
        factory_for, Connection, ConnectionConfig, ConnectionFactory, DatabaseType,
    };
    pub use crate::provision::{ConnectionLease, ProvisionStats, Provisioner};

    // Queries and dialects
    pub use crate::dialect::{dialect_for, MySqlDialect, PostgresDialect, SqlDialect};
    pub use crate::query::Query;

    // Streams
    pub use crate::aggregate::{average, RunningMean};
    pub use crate::batch::{stream_batches, BatchStream, FilteredBatches};
    pub use crate::paginate::{lazy_paginate, Paginator};
    pub use crate::stream::{stream_rows, RecordStream, StreamState, StreamStats};

    // Configuration
    pub use crate::config::{ConnectionSettings, SensitiveString, SluiceConfig};
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use record::Record;
pub use types::Value;
