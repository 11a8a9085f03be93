//! ArcSQL - database access layer written in Rust
//!
//! This library provides:
//! - Drivers wrapping native database handles (SQLite built in)
//! - Connections with nested transactions, save points and auto-reconnect
//! - A query builder and per-dialect SQL compiler (CTEs, window functions)
//! - Typed value binding and result casting
//! - A registry of named, lazily built connections

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod query;
pub mod statement;
pub mod types;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionRegistry};
pub use driver::{Dialect, Driver, DriverFeature, Role};
pub use error::{Error, Result};
pub use query::{CommonTableExpression, Query, QueryCompiler, ValueBinder};
pub use statement::Statement;
pub use types::{TypeMap, TypeRegistry, Value};
