//! SQL dialects
//!
//! Everything that differs between database servers at the SQL-text level
//! lives here: identifier quoting, save point syntax, feature support and the
//! statements used to toggle constraint checks.

use std::fmt;

use super::DriverFeature;
use crate::error::{Error, Result};

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Sqlite,
    Mysql,
    MariaDb,
    Postgres,
    SqlServer,
}

impl Dialect {
    /// Resolve a configured driver name
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "mysql" => Ok(Dialect::Mysql),
            "mariadb" => Ok(Dialect::MariaDb),
            "postgres" | "postgresql" | "pgsql" => Ok(Dialect::Postgres),
            "sqlserver" | "sqlsrv" | "mssql" => Ok(Dialect::SqlServer),
            _ => Err(Error::MissingDriver(name.to_string())),
        }
    }

    /// Canonical driver name
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
            Dialect::MariaDb => "mariadb",
            Dialect::Postgres => "postgres",
            Dialect::SqlServer => "sqlserver",
        }
    }

    /// Opening and closing identifier quote characters
    pub fn quote_chars(&self) -> (char, char) {
        match self {
            Dialect::Sqlite | Dialect::Postgres => ('"', '"'),
            Dialect::Mysql | Dialect::MariaDb => ('`', '`'),
            Dialect::SqlServer => ('[', ']'),
        }
    }

    /// Check if a dialect supports a feature
    pub fn supports(&self, feature: DriverFeature) -> bool {
        match feature {
            DriverFeature::Cte
            | DriverFeature::Json
            | DriverFeature::Savepoint
            | DriverFeature::Window => true,
            DriverFeature::CteInDml => !matches!(self, Dialect::MariaDb),
            DriverFeature::TruncateWithConstraints => {
                matches!(self, Dialect::Sqlite | Dialect::Postgres)
            }
            DriverFeature::DisableConstraintWithoutTransaction => {
                matches!(self, Dialect::Mysql | Dialect::MariaDb | Dialect::SqlServer)
            }
            DriverFeature::Intersect => !matches!(self, Dialect::Mysql),
            DriverFeature::SetOperationsOrderBy => !matches!(self, Dialect::SqlServer),
        }
    }

    /// Quote a single identifier segment
    pub fn quote_name(&self, name: &str) -> String {
        let (open, close) = self.quote_chars();
        let escaped = name.replace(close, &format!("{}{}", close, close));
        format!("{}{}{}", open, escaped, close)
    }

    /// Quote an identifier.
    ///
    /// Handles `*`, `name`, `table.column`, `table.*` and `expr AS alias`.
    /// Anything else (function calls, expressions, already quoted names) is
    /// returned untouched.
    pub fn quote_identifier(&self, identifier: &str) -> String {
        let identifier = identifier.trim();
        if identifier.is_empty() || identifier == "*" {
            return identifier.to_string();
        }

        if let Some((expr, alias)) = split_alias(identifier) {
            return format!(
                "{} AS {}",
                self.quote_identifier(expr),
                self.quote_identifier(alias)
            );
        }

        let segments: Vec<&str> = identifier.split('.').collect();
        let valid = segments
            .iter()
            .enumerate()
            .all(|(i, s)| is_plain_name(s) || (*s == "*" && i == segments.len() - 1 && i > 0));
        if !valid {
            return identifier.to_string();
        }

        segments
            .iter()
            .map(|s| if *s == "*" { "*".to_string() } else { self.quote_name(s) })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Statement creating a save point
    pub fn savepoint_sql(&self, name: &str) -> String {
        match self {
            Dialect::SqlServer => format!("SAVE TRANSACTION t{}", name),
            _ => format!("SAVEPOINT LEVEL{}", name),
        }
    }

    /// Statement releasing a save point, if the dialect has one
    pub fn release_savepoint_sql(&self, name: &str) -> Option<String> {
        match self {
            Dialect::SqlServer => None,
            _ => Some(format!("RELEASE SAVEPOINT LEVEL{}", name)),
        }
    }

    /// Statement rolling back to a save point
    pub fn rollback_savepoint_sql(&self, name: &str) -> String {
        match self {
            Dialect::SqlServer => format!("ROLLBACK TRANSACTION t{}", name),
            _ => format!("ROLLBACK TO SAVEPOINT LEVEL{}", name),
        }
    }

    /// Statement turning foreign key checks off
    pub fn disable_foreign_keys_sql(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "PRAGMA foreign_keys = OFF",
            Dialect::Mysql | Dialect::MariaDb => "SET foreign_key_checks = 0",
            Dialect::Postgres => "SET CONSTRAINTS ALL DEFERRED",
            Dialect::SqlServer => {
                "EXEC sp_MSforeachtable \"ALTER TABLE ? NOCHECK CONSTRAINT all\""
            }
        }
    }

    /// Statement turning foreign key checks back on
    pub fn enable_foreign_keys_sql(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "PRAGMA foreign_keys = ON",
            Dialect::Mysql | Dialect::MariaDb => "SET foreign_key_checks = 1",
            Dialect::Postgres => "SET CONSTRAINTS ALL IMMEDIATE",
            Dialect::SqlServer => {
                "EXEC sp_MSforeachtable \"ALTER TABLE ? WITH CHECK CHECK CONSTRAINT all\""
            }
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn is_plain_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Split `expr AS alias` (case-insensitive AS) at its last occurrence
fn split_alias(identifier: &str) -> Option<(&str, &str)> {
    let upper = identifier.to_ascii_uppercase();
    let pos = upper.rfind(" AS ")?;
    let expr = identifier[..pos].trim();
    let alias = identifier[pos + 4..].trim();
    if expr.is_empty() || !is_plain_name(alias) {
        return None;
    }
    Some((expr, alias))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(Dialect::from_name("SQLite").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_name("sqlsrv").unwrap(), Dialect::SqlServer);
        assert!(matches!(
            Dialect::from_name("oracle"),
            Err(Error::MissingDriver(name)) if name == "oracle"
        ));
    }

    #[test]
    fn test_quote_identifier() {
        let d = Dialect::Mysql;
        assert_eq!(d.quote_identifier("title"), "`title`");
        assert_eq!(d.quote_identifier("articles.title"), "`articles`.`title`");
        assert_eq!(d.quote_identifier("articles.*"), "`articles`.*");
        assert_eq!(d.quote_identifier("*"), "*");
        assert_eq!(d.quote_identifier("title AS t"), "`title` AS `t`");
        assert_eq!(d.quote_identifier("COUNT(*)"), "COUNT(*)");
        assert_eq!(
            Dialect::SqlServer.quote_identifier("a.b"),
            "[a].[b]"
        );
        assert_eq!(Dialect::Postgres.quote_identifier("x\"y"), "x\"y");
    }

    #[test]
    fn test_savepoint_sql() {
        assert_eq!(Dialect::Sqlite.savepoint_sql("1"), "SAVEPOINT LEVEL1");
        assert_eq!(
            Dialect::Mysql.rollback_savepoint_sql("2"),
            "ROLLBACK TO SAVEPOINT LEVEL2"
        );
        assert_eq!(Dialect::SqlServer.savepoint_sql("1"), "SAVE TRANSACTION t1");
        assert_eq!(Dialect::SqlServer.release_savepoint_sql("1"), None);
    }

    #[test]
    fn test_features() {
        assert!(Dialect::Mysql.supports(DriverFeature::CteInDml));
        assert!(!Dialect::MariaDb.supports(DriverFeature::CteInDml));
        assert!(Dialect::Sqlite.supports(DriverFeature::Savepoint));
    }
}
