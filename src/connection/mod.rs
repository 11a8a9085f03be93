//! Connections
//!
//! A `Connection` owns the drivers of one configured database (a single write
//! driver, plus a read driver when reads go to a different server), runs
//! queries on the right one, and virtualizes nested transactions on top of
//! the single physical transaction a database session offers.
//!
//! Nesting works like this:
//! - the outermost `begin()` issues a physical `BEGIN`
//! - inner levels create save points when they are enabled, and are purely
//!   virtual otherwise
//! - rolling back an inner level without save points poisons the transaction,
//!   and the outermost `commit()` then rolls back and reports where that
//!   happened

pub mod logger;
pub mod registry;
pub mod transaction;

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::driver::{Connector, Driver, DriverFeature, Role};
use crate::error::{Error, Result};
use crate::query::{Expr, Query, QueryKind, ValueBinder};
use crate::statement::Statement;
use crate::types::{TypeRegistry, Value};

pub use logger::{LoggedQuery, MemoryLogger, QueryLogger, TracingLogger};
pub use registry::ConnectionRegistry;
pub use transaction::{Outcome, RollbackSite};

/// A configured database connection
pub struct Connection {
    name: String,
    config: ConnectionConfig,
    write: Driver,
    /// Separate read driver when the config splits roles
    read: Option<Driver>,
    /// Virtual nesting depth; 0 when idle
    transaction_level: u32,
    savepoints_enabled: bool,
    /// Set when an inner level rolled back without a save point
    nested_rollback: Option<RollbackSite>,
    types: Arc<TypeRegistry>,
    logger: Arc<dyn QueryLogger>,
    log_queries: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("write", &self.write)
            .field("read", &self.read)
            .field("transaction_level", &self.transaction_level)
            .field("savepoints_enabled", &self.savepoints_enabled)
            .finish()
    }
}

impl Connection {
    /// Create a connection on the builtin backend of the configured driver
    pub fn new(name: &str, config: ConnectionConfig) -> Result<Self> {
        Self::with_types(name, config, Arc::new(TypeRegistry::new()))
    }

    /// Create a connection sharing a type registry
    pub fn with_types(name: &str, config: ConnectionConfig, types: Arc<TypeRegistry>) -> Result<Self> {
        let write = Driver::from_config(name, config.for_role(Role::Write), Role::Write, types.clone())?;
        let read = if config.has_role_split() {
            Some(Driver::from_config(name, config.for_role(Role::Read), Role::Read, types.clone())?)
        } else {
            None
        };
        Ok(Self::from_drivers(name, config, write, read, types))
    }

    /// Create a connection on a custom backend
    pub fn with_connector(
        name: &str,
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        types: Arc<TypeRegistry>,
    ) -> Result<Self> {
        let write = Driver::new(
            name,
            config.for_role(Role::Write),
            Role::Write,
            connector.clone(),
            types.clone(),
        )?;
        let read = if config.has_role_split() {
            Some(Driver::new(
                name,
                config.for_role(Role::Read),
                Role::Read,
                connector,
                types.clone(),
            )?)
        } else {
            None
        };
        Ok(Self::from_drivers(name, config, write, read, types))
    }

    fn from_drivers(
        name: &str,
        config: ConnectionConfig,
        write: Driver,
        read: Option<Driver>,
        types: Arc<TypeRegistry>,
    ) -> Self {
        let log = config.log;
        let mut conn = Self {
            name: name.to_string(),
            config,
            write,
            read,
            transaction_level: 0,
            savepoints_enabled: false,
            nested_rollback: None,
            types,
            logger: Arc::new(TracingLogger),
            log_queries: false,
        };
        conn.enable_query_logging(log);
        conn
    }

    /// Connection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this connection was built from
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Shared type registry
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Driver serving a role
    pub fn driver(&self, role: Role) -> &Driver {
        match (role, &self.read) {
            (Role::Read, Some(read)) => read,
            _ => &self.write,
        }
    }

    /// Driver serving a role, mutably
    pub fn driver_mut(&mut self, role: Role) -> &mut Driver {
        match (role, self.read.as_mut()) {
            (Role::Read, Some(read)) => read,
            _ => &mut self.write,
        }
    }

    /// Connect every driver
    pub fn connect(&mut self) -> Result<()> {
        self.write.connect()?;
        if let Some(read) = self.read.as_mut() {
            read.connect()?;
        }
        Ok(())
    }

    /// Disconnect every driver
    pub fn disconnect(&mut self) {
        self.write.disconnect();
        if let Some(read) = self.read.as_mut() {
            read.disconnect();
        }
    }

    /// Check if the write driver is connected
    pub fn is_connected(&self) -> bool {
        self.write.is_connected()
    }

    /// Check if the server supports a feature
    pub fn supports(&self, feature: DriverFeature) -> bool {
        self.write.supports(feature)
    }

    // ========== Query logging ==========

    /// Turn query logging on or off
    pub fn enable_query_logging(&mut self, enable: bool) {
        self.log_queries = enable;
        let logger = enable.then(|| self.logger.clone());
        self.write.set_logger(logger.clone());
        if let Some(read) = self.read.as_mut() {
            read.set_logger(logger);
        }
    }

    /// Check if queries are logged
    pub fn is_query_logging_enabled(&self) -> bool {
        self.log_queries
    }

    /// Replace the logger
    pub fn set_logger(&mut self, logger: Arc<dyn QueryLogger>) {
        self.logger = logger;
        self.enable_query_logging(self.log_queries);
    }

    /// The logger
    pub fn logger(&self) -> &Arc<dyn QueryLogger> {
        &self.logger
    }

    // ========== Execution ==========

    /// Compile a query for the write driver
    pub fn compile(&self, query: &Query) -> Result<(String, ValueBinder)> {
        let mut binder = query.fresh_binder();
        let sql = self.write.compile(query, &mut binder)?;
        Ok((sql, binder))
    }

    /// Compile and execute a query.
    ///
    /// SELECT runs on the read driver unless a transaction is open.
    pub fn run(&mut self, query: &Query) -> Result<Statement> {
        let role = if query.kind() == QueryKind::Select && !self.in_transaction() {
            Role::Read
        } else {
            Role::Write
        };

        let mut binder = query.fresh_binder();
        let sql = self.driver(role).compile(query, &mut binder)?;
        let statement = self.execute_on(role, &sql, &binder)?;

        let select_types = query.get_select_type_map();
        if select_types.is_empty() {
            Ok(statement)
        } else {
            statement.cast(select_types, &self.types)
        }
    }

    /// Execute SQL with bindings on the write driver
    pub fn execute(&mut self, sql: &str, binder: &ValueBinder) -> Result<Statement> {
        self.execute_on(Role::Write, sql, binder)
    }

    /// Execute SQL without bindings on the write driver
    pub fn execute_sql(&mut self, sql: &str) -> Result<Statement> {
        self.execute(sql, &ValueBinder::new())
    }

    /// Insert one row
    pub fn insert<I, K, V>(&mut self, table: &str, values: I) -> Result<Statement>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, row): (Vec<String>, Vec<Value>) = values
            .into_iter()
            .map(|(column, value)| (column.into(), value.into()))
            .unzip();
        let query = Query::insert_into(table, columns).values(row)?;
        self.run(&query)
    }

    /// Update rows matching `conditions` (every row when `None`)
    pub fn update<I, K, V>(&mut self, table: &str, values: I, conditions: Option<Expr>) -> Result<Statement>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut query = Query::update(table);
        for (column, value) in values {
            let column: String = column.into();
            query = query.set(&column, value);
        }
        if let Some(conditions) = conditions {
            query = query.where_(conditions);
        }
        self.run(&query)
    }

    /// Delete rows matching `conditions` (every row when `None`)
    pub fn delete(&mut self, table: &str, conditions: Option<Expr>) -> Result<Statement> {
        let mut query = Query::delete(table);
        if let Some(conditions) = conditions {
            query = query.where_(conditions);
        }
        self.run(&query)
    }

    /// Quote a string as a literal
    pub fn quote(&mut self, value: &str) -> Result<String> {
        self.write.quote(value)
    }

    /// Render a value as a SQL literal
    pub fn schema_value(&mut self, value: &Value) -> Result<String> {
        self.write.schema_value(value)
    }

    /// Quote an identifier
    pub fn quote_identifier(&self, identifier: &str) -> String {
        self.write.quote_identifier(identifier)
    }

    /// Last generated row id
    pub fn last_insert_id(&self) -> Option<i64> {
        self.write.last_insert_id()
    }

    /// Run on a role's driver, reconnecting once if the server went away
    /// while no transaction was open
    fn execute_on(&mut self, role: Role, sql: &str, binder: &ValueBinder) -> Result<Statement> {
        let idle = !self.in_transaction();
        let driver = self.driver_mut(role);
        match driver.execute(sql, binder) {
            Err(e) if idle && Driver::is_connection_lost(&e) => {
                reconnect(driver, &e)?;
                driver.execute(sql, binder)
            }
            other => other,
        }
    }

    // ========== Transactions ==========

    /// Start a transaction, or a nested level of the current one
    pub fn begin(&mut self) -> Result<()> {
        if self.transaction_level == 0 {
            match self.write.begin_transaction() {
                Err(e) if Driver::is_connection_lost(&e) => {
                    reconnect(&mut self.write, &e)?;
                    self.write.begin_transaction()?;
                }
                other => other?,
            }
            self.nested_rollback = None;
        } else if self.savepoints_enabled {
            self.create_savepoint(&self.transaction_level.to_string())?;
        }
        self.transaction_level += 1;
        Ok(())
    }

    /// Commit the current level; false when no transaction is open.
    ///
    /// Committing the outermost level of a transaction that an inner level
    /// rolled back rolls everything back and fails with
    /// `NestedTransactionRollback`.
    pub fn commit(&mut self) -> Result<bool> {
        if self.transaction_level == 0 {
            return Ok(false);
        }

        if self.transaction_level == 1 {
            if let Some(site) = self.nested_rollback.take() {
                self.transaction_level = 0;
                self.write.rollback_transaction()?;
                return Err(Error::NestedTransactionRollback { site });
            }
            self.write.commit_transaction()?;
            self.transaction_level = 0;
            return Ok(true);
        }

        if self.savepoints_enabled {
            self.release_savepoint(&(self.transaction_level - 1).to_string())?;
        }
        self.transaction_level -= 1;
        Ok(true)
    }

    /// Roll back the current level; false when no transaction is open.
    ///
    /// Inner levels roll back to their save point when save points are
    /// enabled. Without save points the caller's location is recorded and the
    /// outermost commit is turned into a rollback.
    #[track_caller]
    pub fn rollback(&mut self) -> Result<bool> {
        self.rollback_from(Location::caller())
    }

    fn rollback_from(&mut self, location: &'static Location<'static>) -> Result<bool> {
        if self.transaction_level == 0 {
            return Ok(false);
        }

        if self.transaction_level == 1 {
            return self.rollback_all();
        }

        self.transaction_level -= 1;
        if self.savepoints_enabled {
            self.rollback_savepoint(&self.transaction_level.to_string())?;
        } else if self.nested_rollback.is_none() {
            self.nested_rollback = Some(RollbackSite::new(self.transaction_level, location));
        }
        Ok(true)
    }

    /// Roll back the whole physical transaction from any level
    pub fn rollback_all(&mut self) -> Result<bool> {
        if self.transaction_level == 0 {
            return Ok(false);
        }
        self.transaction_level = 0;
        self.nested_rollback = None;
        self.write.rollback_transaction()?;
        Ok(true)
    }

    /// Run `f` inside a transaction level.
    ///
    /// An `Err` or a rollback outcome (`false`, `None`) rolls the level back;
    /// anything else commits it.
    #[track_caller]
    pub fn transactional<T, E, F>(&mut self, f: F) -> std::result::Result<T, E>
    where
        T: Outcome,
        E: From<Error>,
        F: FnOnce(&mut Connection) -> std::result::Result<T, E>,
    {
        let location = Location::caller();
        self.begin()?;

        match f(self) {
            Err(e) => {
                if let Err(rollback_error) = self.rollback_from(location) {
                    warn!(
                        connection = %self.name,
                        error = %rollback_error,
                        "rollback after a failed transaction callback failed"
                    );
                }
                Err(e)
            }
            Ok(value) if !value.should_commit() => {
                self.rollback_from(location)?;
                Ok(value)
            }
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
        }
    }

    /// Check if a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.transaction_level > 0
    }

    /// Current nesting depth
    pub fn transaction_level(&self) -> u32 {
        self.transaction_level
    }

    /// Where an inner level rolled back without a save point, if it did
    pub fn nested_rollback_site(&self) -> Option<&RollbackSite> {
        self.nested_rollback.as_ref()
    }

    /// Enable or disable save points for nested levels.
    ///
    /// Stays disabled when the server lacks save points.
    pub fn enable_savepoints(&mut self, enable: bool) {
        self.savepoints_enabled = enable && self.write.supports(DriverFeature::Savepoint);
    }

    /// Check if nested levels use save points
    pub fn is_savepoints_enabled(&self) -> bool {
        self.savepoints_enabled
    }

    /// Create a save point
    pub fn create_savepoint(&mut self, name: &str) -> Result<()> {
        let sql = self.write.dialect().savepoint_sql(name);
        self.execute_sql(&sql).map(|_| ())
    }

    /// Release a save point (a no-op where the dialect has no RELEASE)
    pub fn release_savepoint(&mut self, name: &str) -> Result<()> {
        match self.write.dialect().release_savepoint_sql(name) {
            Some(sql) => self.execute_sql(&sql).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Roll back to a save point
    pub fn rollback_savepoint(&mut self, name: &str) -> Result<()> {
        let sql = self.write.dialect().rollback_savepoint_sql(name);
        self.execute_sql(&sql).map(|_| ())
    }

    /// Run `f` with foreign key checks disabled.
    ///
    /// Checks are turned back on even when `f` fails.
    pub fn disable_constraints<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let dialect = self.write.dialect();
        self.execute_sql(dialect.disable_foreign_keys_sql())?;
        let result = f(self);
        let enabled = self.execute_sql(dialect.enable_foreign_keys_sql());
        let value = result?;
        enabled?;
        Ok(value)
    }
}

fn reconnect(driver: &mut Driver, cause: &Error) -> Result<()> {
    info!(role = %driver.role(), error = %cause, "connection lost, reconnecting");
    driver.log_marker("[RECONNECT]");
    driver.disconnect();
    driver.connect()
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.transaction_level > 0 {
            self.logger.warning(&format!(
                "The connection `{}` is going to be closed but there is an active transaction (level {})",
                self.name, self.transaction_level
            ));
        }
    }
}
