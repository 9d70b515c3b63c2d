//! Scripted in-memory connection for sluice-rdbc integration tests
//!
//! Tracks every connect, close and statement so tests can assert that
//! leases are released exactly once.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use sluice_rdbc::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared counters observed by tests
#[derive(Clone, Default)]
pub struct Tracker {
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    statements: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
}

impl Tracker {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> usize {
        self.connects() - self.closes()
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().unwrap().clone()
    }
}

/// Rows served by the double
#[derive(Clone)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    fn row(&self, values: &[Value]) -> Row {
        Row::new(self.columns.clone(), values.to_vec())
    }
}

/// `user_data` rows with 16-byte binary ids and DECIMAL ages
pub fn users(count: usize) -> Table {
    let rows = (0..count)
        .map(|i| {
            vec![
                Value::Bytes(user_id(i)),
                Value::String(format!("User {}", i)),
                Value::String(format!("user{}@example.com", i)),
                Value::Decimal(Decimal::new(200 + i as i64 * 10, 1)),
            ]
        })
        .collect();
    Table::new(&["user_id", "name", "email", "age"], rows)
}

/// Binary id of the `i`-th user
pub fn user_id(i: usize) -> Vec<u8> {
    let mut id = vec![0xAB; 16];
    id[15] = i as u8;
    id
}

/// Single-column table of ages
pub fn ages(values: &[Value]) -> Table {
    Table::new(&["age"], values.iter().cloned().map(|v| vec![v]).collect())
}

/// Factory producing [`MemoryConnection`]s
#[derive(Clone)]
pub struct MemoryFactory {
    table: Arc<Table>,
    tracker: Tracker,
    fail_connect: bool,
    fail_on_fetch: Option<usize>,
    fail_execute: bool,
}

impl MemoryFactory {
    pub fn new(table: Table) -> Self {
        Self {
            table: Arc::new(table),
            tracker: Tracker::default(),
            fail_connect: false,
            fail_on_fetch: None,
            fail_execute: false,
        }
    }

    /// Every connect attempt is refused
    pub fn refuse_connections(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// The `n`-th row fetch (1-based) on each connection fails
    pub fn fail_on_fetch(mut self, n: usize) -> Self {
        self.fail_on_fetch = Some(n);
        self
    }

    /// Every statement fails to execute
    pub fn fail_execute(mut self) -> Self {
        self.fail_execute = true;
        self
    }

    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }

    pub fn provisioner(&self) -> Provisioner {
        Provisioner::new(
            Arc::new(self.clone()),
            ConnectionConfig::new("mysql://root@localhost/ALX_prodev"),
        )
    }
}

#[async_trait]
impl ConnectionFactory for MemoryFactory {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        if self.fail_connect {
            return Err(Error::connection("connection refused"));
        }
        self.tracker.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            factory: self.clone(),
            cursor: None,
            sql: String::new(),
            fetches: 0,
            closed: false,
        }))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }
}

/// Connection over the scripted table.
///
/// Statements containing `LIMIT` take their last two parameters as limit
/// and offset.
pub struct MemoryConnection {
    factory: MemoryFactory,
    cursor: Option<VecDeque<Row>>,
    sql: String,
    fetches: usize,
    closed: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        if self.closed {
            return Err(Error::connection("connection is closed"));
        }
        self.factory
            .tracker
            .statements
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        if self.factory.fail_execute {
            return Err(Error::query_with_sql("simulated syntax error", sql));
        }

        let table = &self.factory.table;
        let (offset, limit) = if sql.contains("LIMIT") && params.len() >= 2 {
            let limit = params[params.len() - 2].as_i64().unwrap_or(0) as usize;
            let offset = params[params.len() - 1].as_i64().unwrap_or(0) as usize;
            (offset, limit)
        } else {
            (0, table.rows.len())
        };

        self.sql = sql.to_string();
        self.cursor = Some(
            table
                .rows
                .iter()
                .skip(offset)
                .take(limit)
                .map(|values| table.row(values))
                .collect(),
        );
        Ok(())
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(Error::connection("connection is closed"));
        }
        self.fetches += 1;
        if self.factory.fail_on_fetch == Some(self.fetches) {
            return Err(Error::query_with_sql("simulated fetch failure", self.sql.clone()));
        }
        Ok(self.cursor.as_mut().and_then(VecDeque::pop_front))
    }

    async fn is_valid(&mut self) -> bool {
        !self.closed
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.cursor = None;
            self.factory.tracker.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
