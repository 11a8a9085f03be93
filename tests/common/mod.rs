//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use arcsql::config::ConnectionConfig;
use arcsql::driver::{Connector, NativeConnection, NativeError, ResultSet};
use arcsql::types::{TypeRegistry, Value};
use arcsql::Connection;

/// What the fake backend did and what it should do next
#[derive(Default)]
pub struct Script {
    /// Successful and failed connect calls
    pub connects: usize,
    /// Calls to the native quote routine
    pub quotes: usize,
    /// Every statement sent, including BEGIN/COMMIT/ROLLBACK
    pub executed: Vec<String>,
    /// Parameters of every `execute` call
    pub params: Vec<Vec<(String, Value)>>,
    /// Errors returned by the next connect calls
    pub connect_failures: VecDeque<NativeError>,
    /// Errors returned by the next statements
    pub execute_failures: VecDeque<NativeError>,
    /// Results returned by the next `execute` calls
    pub results: VecDeque<ResultSet>,
}

/// A connector whose connections record everything into a shared script
#[derive(Clone, Default)]
pub struct FakeConnector {
    script: Arc<Mutex<Script>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn fail_connect(&self, error: NativeError) {
        self.script().connect_failures.push_back(error);
    }

    pub fn fail_next(&self, error: NativeError) {
        self.script().execute_failures.push_back(error);
    }

    pub fn respond(&self, result: ResultSet) {
        self.script().results.push_back(result);
    }

    pub fn executed(&self) -> Vec<String> {
        self.script().executed.clone()
    }

    pub fn connects(&self) -> usize {
        self.script().connects
    }

    pub fn quotes(&self) -> usize {
        self.script().quotes
    }

    /// Build a connection for `driver` backed by this fake
    pub fn connection(&self, driver: &str) -> Connection {
        self.connection_with(ConnectionConfig::new(driver).retry_delay_ms(0))
    }

    pub fn connection_with(&self, config: ConnectionConfig) -> Connection {
        Connection::with_connector(
            "fake",
            config,
            Arc::new(self.clone()),
            Arc::new(TypeRegistry::new()),
        )
        .unwrap()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn NativeConnection>, NativeError> {
        let mut script = self.script();
        script.connects += 1;
        if let Some(error) = script.connect_failures.pop_front() {
            return Err(error);
        }
        Ok(Box::new(FakeConnection {
            script: self.script.clone(),
            in_transaction: false,
        }))
    }
}

struct FakeConnection {
    script: Arc<Mutex<Script>>,
    in_transaction: bool,
}

impl FakeConnection {
    fn record(&self, sql: &str) -> Result<(), NativeError> {
        let mut script = self.script.lock().unwrap();
        script.executed.push(sql.to_string());
        match script.execute_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl NativeConnection for FakeConnection {
    fn execute(&mut self, sql: &str, params: &[(String, Value)]) -> Result<ResultSet, NativeError> {
        self.script.lock().unwrap().params.push(params.to_vec());
        self.record(sql)?;
        Ok(self
            .script
            .lock()
            .unwrap()
            .results
            .pop_front()
            .unwrap_or_default())
    }

    fn begin(&mut self) -> Result<(), NativeError> {
        self.record("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), NativeError> {
        self.record("COMMIT")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), NativeError> {
        self.record("ROLLBACK")?;
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn quote(&self, value: &str) -> String {
        self.script.lock().unwrap().quotes += 1;
        format!("'{}'", value.replace('\'', "''"))
    }

    fn last_insert_id(&self) -> Option<i64> {
        None
    }

    fn server_version(&self) -> String {
        "fake-1.0".to_string()
    }
}

/// An in-memory SQLite connection with an `articles` table
pub fn sqlite_articles() -> Connection {
    let mut conn = Connection::new("test", ConnectionConfig::default()).unwrap();
    conn.execute_sql(
        "CREATE TABLE articles (
            id INTEGER PRIMARY KEY,
            author_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            published INTEGER NOT NULL DEFAULT 0
        )",
    )
    .unwrap();
    conn
}

/// Number of rows in a table
pub fn count_rows(conn: &mut Connection, table: &str) -> i64 {
    conn.execute_sql(&format!("SELECT COUNT(*) FROM {}", table))
        .unwrap()
        .fetch_column(0)
        .and_then(|v| v.as_i64())
        .unwrap()
}
