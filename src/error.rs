//! Error types for ArcSQL
//!
//! This module defines all error types used by drivers, connections and the
//! query builder.

use thiserror::Error;

use crate::connection::RollbackSite;
use crate::driver::NativeError;

/// The main error type for ArcSQL
#[derive(Error, Debug)]
pub enum Error {
    // ========== Configuration Errors ==========
    #[error("Database driver `{0}` could not be found")]
    MissingDriver(String),

    #[error("Database driver `{driver}` cannot be used: {reason}")]
    MissingExtension { driver: String, reason: String },

    #[error("The datasource configuration `{0}` was not found")]
    MissingConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // ========== Connection Errors ==========
    #[error("Connection to {driver} could not be established: {reason}")]
    MissingConnection {
        driver: String,
        reason: String,
        attempts: u32,
    },

    #[error(transparent)]
    Native(#[from] NativeError),

    // ========== Transaction Errors ==========
    #[error(
        "Cannot commit transaction - rollback() has been already called in the nested transaction at {site}"
    )]
    NestedTransactionRollback { site: RollbackSite },

    // ========== Query Errors ==========
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{dialect} does not support {feature}")]
    Unsupported {
        dialect: &'static str,
        feature: String,
    },

    // ========== Type Errors ==========
    #[error("Type error: cannot convert {value} to {ty}")]
    TypeConversion { value: String, ty: String },

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The native error behind this error, if the database produced it
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            Error::Native(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for ArcSQL operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MissingDriver("oracle".to_string());
        assert_eq!(err.to_string(), "Database driver `oracle` could not be found");

        let err = Error::MissingConnection {
            driver: "sqlite".to_string(),
            reason: "unable to open database file".to_string(),
            attempts: 4,
        };
        assert_eq!(
            err.to_string(),
            "Connection to sqlite could not be established: unable to open database file"
        );
    }

    #[test]
    fn test_native_passthrough() {
        let err: Error = NativeError::lost("MySQL server has gone away").into();
        assert_eq!(err.to_string(), "MySQL server has gone away");
        assert!(err.native().is_some());
    }
}
