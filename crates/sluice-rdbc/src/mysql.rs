//! MySQL backend for sluice-rdbc
//!
//! Rows are streamed from the server one at a time. `execute` hands the
//! connection to a driver task that walks the binary-protocol result set and
//! forwards each row through a channel of capacity 1, so at most one row is
//! buffered ahead of the consumer. The task gives the connection back when
//! the result set is drained or the consumer stops listening.

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionConfig, ConnectionFactory, DatabaseType};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// MySQL charset id for binary strings (BINARY, VARBINARY, BLOB)
const BINARY_CHARSET: u16 = 63;

/// Convert a Value to a MySQL parameter
fn value_to_sql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(b) => mysql_async::Value::from(*b),
        Value::Int8(n) => mysql_async::Value::from(*n),
        Value::Int16(n) => mysql_async::Value::from(*n),
        Value::Int32(n) => mysql_async::Value::from(*n),
        Value::Int64(n) => mysql_async::Value::from(*n),
        Value::Float32(n) => mysql_async::Value::from(*n),
        Value::Float64(n) => mysql_async::Value::from(*n),
        Value::Decimal(d) => mysql_async::Value::from(d.to_string()),
        Value::String(s) => mysql_async::Value::from(s.clone()),
        Value::Bytes(b) => mysql_async::Value::from(b.clone()),
        Value::Date(d) => {
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        Value::Time(t) => mysql_async::Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1000,
        ),
        Value::DateTime(dt) => naive_datetime_to_sql(dt),
        Value::DateTimeTz(dt) => naive_datetime_to_sql(&dt.naive_utc()),
        // BINARY(16) keys
        Value::Uuid(u) => mysql_async::Value::from(u.as_bytes().to_vec()),
    }
}

fn naive_datetime_to_sql(dt: &chrono::NaiveDateTime) -> mysql_async::Value {
    let (date, time) = (dt.date(), dt.time());
    mysql_async::Value::Date(
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
        time.nanosecond() / 1000,
    )
}

/// Convert a MySQL value to a Value, using the column type to tell
/// decimals and binary strings apart from text
fn mysql_value_to_value(val: mysql_async::Value, column_type: ColumnType, charset: u16) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(b) => match column_type {
            ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL => {
                match std::str::from_utf8(&b).ok().and_then(|s| Decimal::from_str(s).ok()) {
                    Some(d) => Value::Decimal(d),
                    None => Value::Bytes(b),
                }
            }
            _ if charset == BINARY_CHARSET => Value::Bytes(b),
            _ => match String::from_utf8(b) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
        },
        mysql_async::Value::Int(n) => Value::Int64(n),
        mysql_async::Value::UInt(n) => Value::from(n),
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let Some(date) = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            else {
                return Value::Null;
            };
            if matches!(column_type, ColumnType::MYSQL_TYPE_DATE) {
                return Value::Date(date);
            }
            chrono::NaiveTime::from_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                .map(|time| Value::DateTime(chrono::NaiveDateTime::new(date, time)))
                .unwrap_or(Value::Null)
        }
        mysql_async::Value::Time(_neg, days, hour, min, sec, micro) => {
            let total_hours = days * 24 + hour as u32;
            chrono::NaiveTime::from_hms_micro_opt(total_hours % 24, min as u32, sec as u32, micro)
                .map(Value::Time)
                .unwrap_or(Value::Null)
        }
    }
}

fn convert_row(mut row: mysql_async::Row) -> Row {
    let columns = row.columns();
    let names = columns.iter().map(|c| c.name_str().to_string()).collect();
    let values = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let val: mysql_async::Value = row.take(i).unwrap_or(mysql_async::Value::NULL);
            mysql_value_to_value(val, column.column_type(), column.character_set())
        })
        .collect();
    Row::new(names, values)
}

/// Walk a result set, forwarding each row until the receiver goes away
async fn pump_rows(
    conn: &mut Conn,
    sql: &str,
    params: Vec<mysql_async::Value>,
    tx: &mpsc::Sender<Result<Row>>,
) -> std::result::Result<(), mysql_async::Error> {
    let mut result = conn.exec_iter(sql, params).await?;
    while let Some(row) = result.next().await? {
        if tx.send(Ok(convert_row(row))).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// An open result set being read by the driver task
struct Cursor {
    rows: mpsc::Receiver<Result<Row>>,
    task: JoinHandle<Conn>,
}

/// Driver options for `config`; properties become URL parameters
fn opts_for(config: &ConnectionConfig) -> Result<mysql_async::Opts> {
    mysql_async::Opts::from_url(&config.effective_url()?)
        .map_err(|e| Error::config(format!("Invalid MySQL connection string: {}", e)))
}

/// MySQL connection with a single streaming cursor
pub struct MySqlConnection {
    conn: Option<Conn>,
    cursor: Option<Cursor>,
    database: String,
}

impl MySqlConnection {
    /// Database this connection is bound to
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Open a connection from configuration
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let opts = opts_for(config)?;
        let database = opts.db_name().unwrap_or_default().to_string();

        let conn = Conn::new(OptsBuilder::from_opts(opts))
            .await
            .map_err(|e| Error::connection_with_source("Failed to connect to MySQL", e))?;

        Ok(Self {
            conn: Some(conn),
            cursor: None,
            database,
        })
    }

    /// Wait for the driver task to hand the connection back
    async fn reclaim(&mut self) -> Result<()> {
        if let Some(cursor) = self.cursor.take() {
            drop(cursor.rows);
            let conn = cursor
                .task
                .await
                .map_err(|e| Error::connection_with_source("MySQL cursor task failed", e))?;
            self.conn = Some(conn);
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        self.reclaim().await?;
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| Error::connection("connection already closed"))?;

        let sql_owned = sql.to_string();
        let params: Vec<mysql_async::Value> = params.iter().map(value_to_sql).collect();
        let (tx, rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            if let Err(e) = pump_rows(&mut conn, &sql_owned, params, &tx).await {
                let err = Error::query_with_source("Failed to execute query", sql_owned, e);
                let _ = tx.send(Err(err)).await;
            }
            conn
        });

        self.cursor = Some(Cursor { rows: rx, task });
        Ok(())
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };

        match cursor.rows.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => {
                self.reclaim().await?;
                Err(e)
            }
            None => {
                self.reclaim().await?;
                Ok(None)
            }
        }
    }

    async fn is_valid(&mut self) -> bool {
        match (self.conn.as_mut(), self.cursor.as_ref()) {
            (Some(conn), _) => conn.ping().await.is_ok(),
            (None, Some(cursor)) => !cursor.task.is_finished(),
            (None, None) => false,
        }
    }

    fn close(&mut self) {
        let cursor = self.cursor.take();
        let conn = self.conn.take();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(database = %self.database, "No runtime to disconnect MySQL connection");
            return;
        };

        handle.spawn(async move {
            let conn = match cursor {
                Some(Cursor { rows, task }) => {
                    drop(rows);
                    task.await.ok()
                }
                None => conn,
            };
            if let Some(conn) = conn {
                if let Err(e) = conn.disconnect().await {
                    debug!(error = %e, "MySQL disconnect failed");
                }
            }
        });
    }
}

/// Factory for MySQL connections
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnectionFactory;

#[async_trait]
impl ConnectionFactory for MySqlConnectionFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let conn = MySqlConnection::connect(config).await?;
        Ok(Box::new(conn))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }
}
