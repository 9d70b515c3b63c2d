//! File-based configuration
//!
//! ```yaml
//! connection:
//!   driver: mysql
//!   host: localhost
//!   user: root
//!   password: ""
//!   database: ALX_prodev
//! table: user_data
//! order_by: user_id
//! batch_size: 10
//! page_size: 5
//! ```
//!
//! `connection.url` may be given instead of the individual parts.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use validator::Validate;

use crate::connection::{ConnectionConfig, DatabaseType};
use crate::dialect::dialect_for_database;
use crate::error::{Error, Result};
use crate::query::Query;

/// A string that never shows up in `Debug`, `Display` or serialized output
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value.
    ///
    /// Only for building the connection itself.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Database driver named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// MySQL / MariaDB
    #[default]
    Mysql,
    /// PostgreSQL
    Postgres,
}

impl From<Driver> for DatabaseType {
    fn from(driver: Driver) -> Self {
        match driver {
            Driver::Mysql => DatabaseType::MySQL,
            Driver::Postgres => DatabaseType::PostgreSQL,
        }
    }
}

/// Where and how to connect
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConnectionSettings {
    /// Full connection URL; overrides the individual parts when set
    #[serde(default)]
    pub url: Option<SensitiveString>,

    /// Driver used when building the URL from parts
    #[serde(default)]
    pub driver: Driver,

    /// Server host
    #[serde(default = "default_host")]
    #[validate(length(min = 1))]
    pub host: String,

    /// Server port (driver default when unset)
    #[serde(default)]
    pub port: Option<u16>,

    /// User name
    #[serde(default = "default_user")]
    pub user: String,

    /// Password
    #[serde(default)]
    pub password: Option<SensitiveString>,

    /// Database name
    #[serde(default = "default_database")]
    #[validate(length(min = 1))]
    pub database: String,

    /// Application name reported to the server
    #[serde(default)]
    pub application_name: Option<String>,

    /// Extra driver properties, passed as URL query parameters
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: None,
            driver: Driver::default(),
            host: default_host(),
            port: None,
            user: default_user(),
            password: None,
            database: default_database(),
            application_name: None,
            properties: HashMap::new(),
        }
    }
}

impl ConnectionSettings {
    /// Build the [`ConnectionConfig`] these settings describe
    pub fn to_connection_config(&self) -> Result<ConnectionConfig> {
        let mut config = match &self.url {
            Some(url) => ConnectionConfig::new(url.expose_secret()),
            None => ConnectionConfig::from_parts(
                self.driver.into(),
                &self.host,
                self.port,
                &self.user,
                self.password.as_ref().map(SensitiveString::expose_secret),
                &self.database,
            )?,
        };

        if let Some(name) = &self.application_name {
            config = config.with_application_name(name);
        }
        for (key, value) in &self.properties {
            config = config.with_property(key, value);
        }
        Ok(config)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_user() -> String {
    "root".to_string()
}

fn default_database() -> String {
    "ALX_prodev".to_string()
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SluiceConfig {
    /// Connection settings
    #[serde(default)]
    #[validate(nested)]
    pub connection: ConnectionSettings,

    /// Table read by the default query
    #[serde(default = "default_table")]
    #[validate(length(min = 1))]
    pub table: String,

    /// Ordering column of the default query
    #[serde(default = "default_order_by")]
    pub order_by: Option<String>,

    /// Binary identifier column rendered as hex
    #[serde(default = "default_identifier_column")]
    pub identifier_column: String,

    /// Records per batch
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 100000))]
    pub batch_size: usize,

    /// Records per page
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100000))]
    pub page_size: usize,
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            table: default_table(),
            order_by: default_order_by(),
            identifier_column: default_identifier_column(),
            batch_size: default_batch_size(),
            page_size: default_page_size(),
        }
    }
}

fn default_table() -> String {
    "user_data".to_string()
}

fn default_order_by() -> Option<String> {
    Some("user_id".to_string())
}

fn default_identifier_column() -> String {
    crate::record::DEFAULT_IDENTIFIER_COLUMN.to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_page_size() -> usize {
    5
}

impl SluiceConfig {
    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Invalid config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&yaml)
    }

    /// Run the validation rules
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::config(format!("Validation failed: {}", e)))
    }

    /// Connection configuration
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        self.connection.to_connection_config()
    }

    /// `SELECT *` over the configured table in the configured order
    pub fn default_query(&self) -> Result<Query> {
        let database_type = self.connection_config()?.database_type();
        let sql = dialect_for_database(database_type)
            .select_all_sql(&self.table, self.order_by.as_deref());
        Ok(Query::new(sql))
    }
}
