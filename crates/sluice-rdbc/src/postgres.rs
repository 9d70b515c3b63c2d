//! PostgreSQL backend for sluice-rdbc
//!
//! `execute` opens a portal with `query_raw`; rows are then pulled from the
//! resulting [`tokio_postgres::RowStream`] one at a time.

use async_trait::async_trait;
use futures::StreamExt;
use std::pin::Pin;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tracing::warn;

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, DatabaseType};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Convert a Value to a tokio-postgres parameter
fn value_to_sql(value: &Value) -> Box<dyn ToSql + Sync + Send> {
    match value {
        Value::Null => Box::new(Option::<i32>::None),
        Value::Bool(b) => Box::new(*b),
        // PostgreSQL has no 1-byte integer
        Value::Int8(n) => Box::new(i16::from(*n)),
        Value::Int16(n) => Box::new(*n),
        Value::Int32(n) => Box::new(*n),
        Value::Int64(n) => Box::new(*n),
        Value::Float32(n) => Box::new(*n),
        Value::Float64(n) => Box::new(*n),
        Value::Decimal(d) => Box::new(*d),
        Value::String(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Date(d) => Box::new(*d),
        Value::Time(t) => Box::new(*t),
        Value::DateTime(dt) => Box::new(*dt),
        Value::DateTimeTz(dt) => Box::new(*dt),
        Value::Uuid(u) => Box::new(*u),
    }
}

fn pg_row_to_row(pg_row: &tokio_postgres::Row) -> Row {
    let columns = pg_row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let values = pg_row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| pg_value_to_value(pg_row, i, col.type_()))
        .collect();

    Row::new(columns, values)
}

fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn pg_value_to_value(
    row: &tokio_postgres::Row,
    idx: usize,
    pg_type: &tokio_postgres::types::Type,
) -> Value {
    use tokio_postgres::types::Type;

    let value = match *pg_type {
        Type::BOOL => get(row, idx).map(Value::Bool),
        Type::INT2 => get(row, idx).map(Value::Int16),
        Type::INT4 => get(row, idx).map(Value::Int32),
        Type::INT8 => get(row, idx).map(Value::Int64),
        Type::FLOAT4 => get(row, idx).map(Value::Float32),
        Type::FLOAT8 => get(row, idx).map(Value::Float64),
        Type::NUMERIC => get(row, idx).map(Value::Decimal),
        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => get(row, idx).map(Value::String),
        Type::BYTEA => get(row, idx).map(Value::Bytes),
        Type::DATE => get(row, idx).map(Value::Date),
        Type::TIME => get(row, idx).map(Value::Time),
        Type::TIMESTAMP => get(row, idx).map(Value::DateTime),
        Type::TIMESTAMPTZ => get(row, idx).map(Value::DateTimeTz),
        Type::UUID => get(row, idx).map(Value::Uuid),
        _ => get(row, idx).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

struct Cursor {
    sql: String,
    rows: Pin<Box<tokio_postgres::RowStream>>,
}

/// PostgreSQL connection with a single streaming cursor
pub struct PgConnection {
    client: Option<tokio_postgres::Client>,
    driver: JoinHandle<()>,
    cursor: Option<Cursor>,
}

impl PgConnection {
    fn client(&self) -> Result<&tokio_postgres::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::connection("connection is closed"))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        self.cursor = None;

        let boxed_params: Vec<Box<dyn ToSql + Sync + Send>> =
            params.iter().map(value_to_sql).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = boxed_params
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self
            .client()?
            .query_raw(sql, param_refs)
            .await
            .map_err(|e| Error::query_with_source("Failed to execute query", sql, e))?;

        self.cursor = Some(Cursor {
            sql: sql.to_string(),
            rows: Box::pin(rows),
        });
        Ok(())
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        match cursor.rows.next().await {
            Some(Ok(pg_row)) => Ok(Some(pg_row_to_row(&pg_row))),
            Some(Err(e)) => {
                let err = Error::query_with_source("Failed to fetch row", cursor.sql.clone(), e);
                self.cursor = None;
                Err(err)
            }
            None => {
                self.cursor = None;
                Ok(None)
            }
        }
    }

    async fn is_valid(&mut self) -> bool {
        match self.client.as_ref() {
            Some(client) if !client.is_closed() => client.simple_query("SELECT 1").await.is_ok(),
            _ => false,
        }
    }

    fn close(&mut self) {
        self.cursor = None;
        self.client = None;
        self.driver.abort();
    }
}

/// Driver configuration for `config`; properties become URL parameters
fn pg_config_for(config: &ConnectionConfig) -> Result<tokio_postgres::Config> {
    let mut pg_config: tokio_postgres::Config = config
        .effective_url()?
        .parse()
        .map_err(|e| Error::config(format!("Invalid PostgreSQL connection string: {}", e)))?;
    if let Some(name) = &config.application_name {
        pg_config.application_name(name);
    }
    Ok(pg_config)
}

/// Factory for PostgreSQL connections
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnectionFactory;

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let (client, connection) = pg_config_for(config)?
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| Error::connection_with_source("Failed to connect to PostgreSQL", e))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Box::new(PgConnection {
            client: Some(client),
            driver,
            cursor: None,
        }))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversion() {
        let _ = value_to_sql(&Value::Int64(42));
        let _ = value_to_sql(&Value::String("hello".into()));
        let _ = value_to_sql(&Value::Null);
        let _ = value_to_sql(&Value::Uuid(uuid::Uuid::nil()));
    }

    #[test]
    fn test_pg_connection_factory_type() {
        assert_eq!(
            PgConnectionFactory.database_type(),
            DatabaseType::PostgreSQL
        );
    }

    #[test]
    fn test_properties_reach_driver_config() {
        let config = ConnectionConfig::new("postgres://app@db.local:5432/users")
            .with_application_name("nightly-report")
            .with_property("connect_timeout", "5")
            .with_property("sslmode", "disable");

        let pg_config = pg_config_for(&config).unwrap();
        assert_eq!(
            pg_config.get_connect_timeout(),
            Some(&std::time::Duration::from_secs(5))
        );
        assert_eq!(pg_config.get_ssl_mode(), tokio_postgres::config::SslMode::Disable);
        assert_eq!(pg_config.get_application_name(), Some("nightly-report"));
    }

    #[test]
    fn test_unknown_property_is_rejected() {
        let config = ConnectionConfig::new("postgres://app@db.local/users")
            .with_property("no_such_option", "1");

        let err = pg_config_for(&config).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = PgConnectionFactory
            .connect(&ConnectionConfig::new("postgres://user@host:notaport/db"))
            .await
            .err()
            .expect("malformed url");
        assert_eq!(err.category(), crate::error::ErrorCategory::Configuration);
    }
}
