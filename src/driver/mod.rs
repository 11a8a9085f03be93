//! Database drivers
//!
//! A `Driver` wraps one native database handle. It connects lazily, retries
//! transient connect failures, binds typed parameters, times and logs every
//! statement, and knows the SQL dialect of the server behind it.
//!
//! The native handle itself sits behind the `NativeConnection` trait so that
//! any client library can be plugged in through a `Connector`. SQLite ships
//! built in (see [`sqlite`]).

pub mod dialect;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::connection::logger::{LoggedQuery, QueryLogger};
use crate::error::{Error, Result};
use crate::query::{Query, QueryCompiler, ValueBinder};
use crate::statement::Statement;
use crate::types::{TypeRegistry, Value};

pub use dialect::Dialect;
pub use sqlite::SqliteConnector;

/// Native error messages that mean the server connection is gone
pub const LOST_CONNECTION_CAUSES: [&str; 14] = [
    "gone away",
    "lost connection",
    "transaction() on null",
    "closed the connection unexpectedly",
    "closed unexpectedly",
    "deadlock avoided",
    "decryption failed or bad record mac",
    "is dead or not enabled",
    "no connection to the server",
    "query_wait_timeout",
    "reset by peer",
    "terminate due to client_idle_limit",
    "while sending",
    "writing data to the connection",
];

/// Which side of a read/write split a driver serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Read,
    Write,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Read => write!(f, "read"),
            Role::Write => write!(f, "write"),
        }
    }
}

/// Optional capabilities a server may or may not have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverFeature {
    /// Common table expressions on SELECT
    Cte,
    /// Common table expressions on UPDATE and DELETE
    CteInDml,
    /// JSON column type
    Json,
    /// Nested transactions through save points
    Savepoint,
    /// Window functions
    Window,
    /// TRUNCATE on tables referenced by foreign keys
    TruncateWithConstraints,
    /// Constraint checks can be toggled outside a transaction
    DisableConstraintWithoutTransaction,
    /// INTERSECT set operation
    Intersect,
    /// ORDER BY on set operations
    SetOperationsOrderBy,
}

/// Classification of a native failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorKind {
    /// The server connection dropped; reconnecting may help
    ConnectionLost,
    /// Temporary failure (busy, locked, throttled); retrying may help
    Transient,
    /// Any other failure
    Other,
}

/// An error raised by a native database handle
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct NativeError {
    pub kind: NativeErrorKind,
    pub code: Option<String>,
    pub message: String,
}

impl NativeError {
    /// Create an error of a given kind
    pub fn new(kind: NativeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// A connection-lost error
    pub fn lost(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::ConnectionLost, message)
    }

    /// A transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::Transient, message)
    }

    /// Any other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(NativeErrorKind::Other, message)
    }

    /// Attach a server error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Check if retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        self.kind == NativeErrorKind::Transient
    }

    /// Check if this error means the connection is gone
    pub fn is_connection_lost(&self) -> bool {
        if self.kind == NativeErrorKind::ConnectionLost {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        LOST_CONNECTION_CAUSES
            .iter()
            .any(|cause| message.contains(cause))
    }
}

/// Rows and counters produced by one native statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by INSERT/UPDATE/DELETE
    pub affected_rows: u64,
    /// Last generated row id, when the statement produced one
    pub last_insert_id: Option<i64>,
}

/// A native database handle: the only I/O boundary of a driver
pub trait NativeConnection: Send {
    /// Prepare, bind named parameters, execute and fetch
    fn execute(
        &mut self,
        sql: &str,
        params: &[(String, Value)],
    ) -> std::result::Result<ResultSet, NativeError>;

    /// Start a physical transaction
    fn begin(&mut self) -> std::result::Result<(), NativeError>;

    /// Commit the physical transaction
    fn commit(&mut self) -> std::result::Result<(), NativeError>;

    /// Roll back the physical transaction
    fn rollback(&mut self) -> std::result::Result<(), NativeError>;

    /// Check if a physical transaction is open
    fn in_transaction(&self) -> bool;

    /// Quote a string as a SQL literal
    fn quote(&self, value: &str) -> String;

    /// Last generated row id
    fn last_insert_id(&self) -> Option<i64>;

    /// Server version string
    fn server_version(&self) -> String;
}

/// Opens native handles for a driver
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> std::result::Result<Box<dyn NativeConnection>, NativeError>;
}

/// The connector shipped for a dialect, if any
pub fn builtin_connector(dialect: Dialect) -> Option<Arc<dyn Connector>> {
    match dialect {
        Dialect::Sqlite => Some(Arc::new(SqliteConnector)),
        _ => None,
    }
}

/// A database driver bound to one role of one connection
pub struct Driver {
    /// Name of the owning connection (used in log lines)
    connection_name: String,
    /// Effective config for this role
    config: ConnectionConfig,
    dialect: Dialect,
    role: Role,
    connector: Arc<dyn Connector>,
    /// Native handle, created on first use
    handle: Option<Box<dyn NativeConnection>>,
    auto_quoting: bool,
    /// Retries used by the last connect
    connect_retries: u32,
    types: Arc<TypeRegistry>,
    logger: Option<Arc<dyn QueryLogger>>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("connection", &self.connection_name)
            .field("dialect", &self.dialect)
            .field("role", &self.role)
            .field("connected", &self.is_connected())
            .field("auto_quoting", &self.auto_quoting)
            .finish()
    }
}

impl Driver {
    /// Create a driver with an explicit connector
    pub fn new(
        connection_name: impl Into<String>,
        config: ConnectionConfig,
        role: Role,
        connector: Arc<dyn Connector>,
        types: Arc<TypeRegistry>,
    ) -> Result<Self> {
        let dialect = Dialect::from_name(&config.driver)?;
        Ok(Self {
            connection_name: connection_name.into(),
            auto_quoting: config.quote_identifiers,
            config,
            dialect,
            role,
            connector,
            handle: None,
            connect_retries: 0,
            types,
            logger: None,
        })
    }

    /// Create a driver using the builtin connector for the configured dialect
    pub fn from_config(
        connection_name: impl Into<String>,
        config: ConnectionConfig,
        role: Role,
        types: Arc<TypeRegistry>,
    ) -> Result<Self> {
        let dialect = Dialect::from_name(&config.driver)?;
        let connector = builtin_connector(dialect).ok_or_else(|| Error::MissingExtension {
            driver: dialect.name().to_string(),
            reason: "no native backend is available; register a connector for it".to_string(),
        })?;
        Self::new(connection_name, config, role, connector, types)
    }

    /// Establish the native handle.
    ///
    /// Transient failures are retried until `connect_attempts` attempts were
    /// made; then, or on any other failure, `MissingConnection` is raised.
    pub fn connect(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let max_attempts = self.config.connect_attempts.max(1);
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        self.connect_retries = 0;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                connection = %self.connection_name,
                driver = %self.dialect,
                role = %self.role,
                attempt,
                "connecting"
            );

            match self.connector.connect(&self.config) {
                Ok(mut handle) => {
                    for statement in &self.config.init {
                        handle.execute(statement, &[])?;
                    }
                    self.handle = Some(handle);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        connection = %self.connection_name,
                        driver = %self.dialect,
                        attempt,
                        error = %e,
                        "connect failed, retrying"
                    );
                    self.connect_retries += 1;
                    thread::sleep(delay);
                }
                Err(e) => {
                    return Err(Error::MissingConnection {
                        driver: self.dialect.name().to_string(),
                        reason: e.message,
                        attempts: attempt,
                    })
                }
            }
        }
    }

    /// Drop the native handle
    pub fn disconnect(&mut self) {
        if self.handle.take().is_some() {
            debug!(connection = %self.connection_name, role = %self.role, "disconnected");
        }
    }

    /// Check if a native handle is open
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Number of retries the last connect needed
    pub fn connect_retries(&self) -> u32 {
        self.connect_retries
    }

    /// SQL dialect of this driver
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Role served by this driver
    pub fn role(&self) -> Role {
        self.role
    }

    /// Effective configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Type registry used for binding
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Enable or disable identifier quoting in compiled queries
    pub fn enable_auto_quoting(&mut self, enable: bool) {
        self.auto_quoting = enable;
    }

    /// Check if identifiers are quoted in compiled queries
    pub fn is_auto_quoting_enabled(&self) -> bool {
        self.auto_quoting
    }

    /// Check if the server supports a feature
    pub fn supports(&self, feature: DriverFeature) -> bool {
        self.dialect.supports(feature)
    }

    /// Attach or detach the query logger
    pub fn set_logger(&mut self, logger: Option<Arc<dyn QueryLogger>>) {
        self.logger = logger;
    }

    /// The attached query logger
    pub fn logger(&self) -> Option<&Arc<dyn QueryLogger>> {
        self.logger.as_ref()
    }

    /// Compile a query in this driver's dialect
    pub fn compile(&self, query: &Query, binder: &mut ValueBinder) -> Result<String> {
        QueryCompiler::new(self.dialect, self.auto_quoting).compile(query, binder)
    }

    /// Execute SQL with the bindings held by `binder`.
    ///
    /// Failures are logged (when a logger is attached) before being returned.
    pub fn execute(&mut self, sql: &str, binder: &ValueBinder) -> Result<Statement> {
        self.connect()?;

        let mut params = Vec::with_capacity(binder.bindings().len());
        for (placeholder, binding) in binder.bindings() {
            let value = self.types.to_database(&binding.value, binding.ty.as_deref())?;
            params.push((placeholder.clone(), value));
        }

        let started = Instant::now();
        let outcome = self.native_mut()?.execute(sql, &params);
        let took = started.elapsed();

        match outcome {
            Ok(result) => {
                let rows = if result.columns.is_empty() {
                    result.affected_rows as usize
                } else {
                    result.rows.len()
                };
                self.log(sql, params, took, rows, None);
                Ok(Statement::new(result))
            }
            Err(e) => {
                self.log(sql, params, took, 0, Some(e.message.clone()));
                Err(e.into())
            }
        }
    }

    /// Start a physical transaction
    pub fn begin_transaction(&mut self) -> Result<()> {
        self.connect()?;
        self.run_control("BEGIN", |h| h.begin())
    }

    /// Commit the physical transaction; false when none is open
    pub fn commit_transaction(&mut self) -> Result<bool> {
        if !self.in_transaction() {
            return Ok(false);
        }
        self.run_control("COMMIT", |h| h.commit())?;
        Ok(true)
    }

    /// Roll back the physical transaction; false when none is open
    pub fn rollback_transaction(&mut self) -> Result<bool> {
        if !self.in_transaction() {
            return Ok(false);
        }
        self.run_control("ROLLBACK", |h| h.rollback())?;
        Ok(true)
    }

    /// Check if a physical transaction is open
    pub fn in_transaction(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| h.in_transaction())
    }

    /// Quote a string with the native quoting routine
    pub fn quote(&mut self, value: &str) -> Result<String> {
        self.connect()?;
        Ok(self.native_mut()?.quote(value))
    }

    /// Quote an identifier for this dialect
    pub fn quote_identifier(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    /// Render a value as a SQL literal.
    ///
    /// Only strings that do not read as plain numbers reach the native
    /// quoting routine; every other value is rendered without a connection.
    pub fn schema_value(&mut self, value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Bool(true) => Ok("TRUE".to_string()),
            Value::Bool(false) => Ok("FALSE".to_string()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) if f.is_finite() => Ok(f.to_string()),
            Value::Float(f) => Err(Error::InvalidArgument(format!(
                "Cannot render non-finite float `{}` as SQL",
                f
            ))),
            Value::String(s) if is_plain_number(s) => Ok(s.clone()),
            Value::String(s) => self.quote(s),
            Value::Bytes(b) => self.quote(&String::from_utf8_lossy(b)),
            Value::Json(doc) => self.quote(&doc.to_string()),
        }
    }

    /// Last generated row id
    pub fn last_insert_id(&self) -> Option<i64> {
        self.handle.as_ref().and_then(|h| h.last_insert_id())
    }

    /// Server version, connecting if needed
    pub fn server_version(&mut self) -> Result<String> {
        self.connect()?;
        Ok(self.native_mut()?.server_version())
    }

    /// Check if an error means the connection to the server is gone
    pub fn is_connection_lost(error: &Error) -> bool {
        error.native().map_or(false, NativeError::is_connection_lost)
    }

    /// Write a marker line (such as `[RECONNECT]`) to the query log
    pub fn log_marker(&self, marker: &str) {
        self.log(marker, Vec::new(), Duration::ZERO, 0, None);
    }

    fn native_mut(&mut self) -> Result<&mut Box<dyn NativeConnection>> {
        self.handle
            .as_mut()
            .ok_or_else(|| Error::Internal("driver is not connected".to_string()))
    }

    fn run_control<F>(&mut self, sql: &str, op: F) -> Result<()>
    where
        F: FnOnce(&mut Box<dyn NativeConnection>) -> std::result::Result<(), NativeError>,
    {
        let started = Instant::now();
        let outcome = op(self.native_mut()?);
        let error = outcome.as_ref().err().map(|e| e.message.clone());
        self.log(sql, Vec::new(), started.elapsed(), 0, error);
        outcome.map_err(Error::from)
    }

    fn log(
        &self,
        sql: &str,
        params: Vec<(String, Value)>,
        took: Duration,
        rows: usize,
        error: Option<String>,
    ) {
        if let Some(logger) = &self.logger {
            let entry = LoggedQuery {
                connection: self.connection_name.clone(),
                role: self.role,
                took_ms: took.as_secs_f64() * 1000.0,
                num_rows: rows,
                query: sql.to_string(),
                params: params.into_iter().collect(),
                error,
            };
            logger.log_query(&entry);
        }
    }
}

/// A string that can go into SQL unquoted: digits with an optional sign and
/// decimal point, no leading zero, no thousands separator, no exponent
fn is_plain_number(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty()
        && !digits.starts_with('0')
        && !digits.starts_with('.')
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && !digits.ends_with('.')
}
