//! Query logging

use indexmap::IndexMap;
use std::fmt;
use std::sync::Mutex;

use tracing::{debug, error, warn};

use crate::driver::Role;
use crate::types::Value;

/// One executed (or failed) statement as seen by a logger
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    /// Name of the connection that ran the query
    pub connection: String,
    /// Role of the driver that ran the query
    pub role: Role,
    /// Wall time in milliseconds
    pub took_ms: f64,
    /// Rows returned or affected
    pub num_rows: usize,
    /// SQL text
    pub query: String,
    /// Bound parameters after type conversion
    pub params: IndexMap<String, Value>,
    /// Native error message when the query failed
    pub error: Option<String>,
}

impl LoggedQuery {
    /// SQL with the bound parameters written in place of their placeholders
    pub fn interpolated(&self) -> String {
        let query = self.query.as_str();
        let mut sql = String::with_capacity(query.len());
        let mut rest = query;

        // One pass over the SQL, so placeholder-like text inside a value stays as-is
        while let Some(start) = rest.find([':', '?']) {
            sql.push_str(&rest[..start]);
            let tail = &rest[start + 1..];
            let len = tail
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(tail.len());
            let token = &rest[start..start + 1 + len];
            match self.params.get(token) {
                Some(value) => sql.push_str(&literal(value)),
                None => sql.push_str(token),
            }
            rest = &rest[start + 1 + len..];
        }
        sql.push_str(rest);
        sql
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Bytes(b) => format!("'{}'", String::from_utf8_lossy(b).replace('\'', "''")),
        Value::Json(doc) => format!("'{}'", doc.to_string().replace('\'', "''")),
    }
}

impl fmt::Display for LoggedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connection={} role={} duration={:.2}ms rows={} {}",
            self.connection,
            self.role,
            self.took_ms,
            self.num_rows,
            self.interpolated()
        )
    }
}

/// Receives query log entries and connection warnings
pub trait QueryLogger: Send + Sync {
    /// Record one query
    fn log_query(&self, query: &LoggedQuery);

    /// Record a warning about the connection itself
    fn warning(&self, message: &str) {
        warn!(target: "arcsql::queries", "{}", message);
    }
}

/// Emits query log entries as `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl QueryLogger for TracingLogger {
    fn log_query(&self, query: &LoggedQuery) {
        match &query.error {
            Some(message) => error!(
                target: "arcsql::queries",
                connection = %query.connection,
                role = %query.role,
                error = %message,
                "{}",
                query
            ),
            None => debug!(
                target: "arcsql::queries",
                connection = %query.connection,
                role = %query.role,
                "{}",
                query
            ),
        }
    }
}

/// Collects log lines in memory as `<level>: <line>`
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected lines
    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Forget all collected lines
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn push(&self, line: String) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }
}

impl QueryLogger for MemoryLogger {
    fn log_query(&self, query: &LoggedQuery) {
        let level = if query.error.is_some() { "error" } else { "debug" };
        self.push(format!("{}: {}", level, query));
    }

    fn warning(&self, message: &str) {
        self.push(format!("warning: {}", message));
    }
}
