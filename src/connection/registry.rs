//! Named connection registry
//!
//! Holds connection configs by name and builds each connection on first use.
//! Aliases let code ask for one name (`default`) and get another
//! (`test`), which is how test suites swap databases.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::Connection;
use crate::config::{self, ConnectionConfig};
use crate::driver::{Connector, Dialect};
use crate::error::{Error, Result};
use crate::types::TypeRegistry;

/// Registry of named connections
pub struct ConnectionRegistry {
    configs: IndexMap<String, ConnectionConfig>,
    aliases: IndexMap<String, String>,
    /// Custom backends keyed by canonical driver name
    connectors: HashMap<&'static str, Arc<dyn Connector>>,
    connections: HashMap<String, Connection>,
    types: Arc<TypeRegistry>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry with the builtin types
    pub fn new() -> Self {
        Self::with_types(Arc::new(TypeRegistry::new()))
    }

    /// Create an empty registry sharing a type registry
    pub fn with_types(types: Arc<TypeRegistry>) -> Self {
        Self {
            configs: IndexMap::new(),
            aliases: IndexMap::new(),
            connectors: HashMap::new(),
            connections: HashMap::new(),
            types,
        }
    }

    /// Type registry handed to every connection
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Configure a connection name
    pub fn set_config(&mut self, name: &str, config: ConnectionConfig) -> Result<()> {
        if self.configs.contains_key(name) {
            return Err(Error::Config(format!(
                "Cannot reconfigure existing connection `{}`",
                name
            )));
        }
        self.configs.insert(name.to_string(), config);
        Ok(())
    }

    /// Configure a connection name from a DSN
    pub fn set_dsn(&mut self, name: &str, dsn: &str) -> Result<()> {
        self.set_config(name, ConnectionConfig::from_dsn(dsn)?)
    }

    /// Configure every connection of a TOML document
    pub fn load_toml_str(&mut self, source: &str) -> Result<()> {
        for (name, config) in config::from_toml_str(source)? {
            self.set_config(&name, config)?;
        }
        Ok(())
    }

    /// Configure every connection of a TOML file
    pub fn load_toml_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        for (name, config) in config::from_toml_file(path)? {
            self.set_config(&name, config)?;
        }
        Ok(())
    }

    /// Config of a name
    pub fn config(&self, name: &str) -> Option<&ConnectionConfig> {
        self.configs.get(name)
    }

    /// Configured names in configuration order
    pub fn configured(&self) -> Vec<&str> {
        self.configs.keys().map(String::as_str).collect()
    }

    /// Forget a name and close its connection
    pub fn drop_config(&mut self, name: &str) -> bool {
        self.connections.remove(name);
        self.configs.shift_remove(name).is_some()
    }

    /// Make `alias` resolve to `source`
    pub fn alias(&mut self, alias: &str, source: &str) {
        self.aliases.insert(alias.to_string(), source.to_string());
    }

    /// Remove an alias
    pub fn drop_alias(&mut self, alias: &str) -> bool {
        self.aliases.shift_remove(alias).is_some()
    }

    /// All aliases and their targets
    pub fn aliases(&self) -> &IndexMap<String, String> {
        &self.aliases
    }

    /// Use a custom backend for a driver
    pub fn register_connector(&mut self, driver: &str, connector: Arc<dyn Connector>) -> Result<()> {
        let dialect = Dialect::from_name(driver)?;
        self.connectors.insert(dialect.name(), connector);
        Ok(())
    }

    /// Get a connection, building it on first use
    pub fn get(&mut self, name: &str) -> Result<&mut Connection> {
        let name = self
            .aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string());

        if !self.connections.contains_key(&name) {
            let config = self
                .configs
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::MissingConfig(name.clone()))?;
            let dialect = Dialect::from_name(&config.driver)?;

            debug!(connection = %name, driver = %dialect, "building connection");
            let connection = match self.connectors.get(dialect.name()) {
                Some(connector) => {
                    Connection::with_connector(&name, config, connector.clone(), self.types.clone())?
                }
                None => Connection::with_types(&name, config, self.types.clone())?,
            };
            self.connections.insert(name.clone(), connection);
        }

        self.connections
            .get_mut(&name)
            .ok_or(Error::MissingConfig(name))
    }

    /// Check if a connection was built for a name
    pub fn is_built(&self, name: &str) -> bool {
        let name = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.connections.contains_key(name)
    }
}
