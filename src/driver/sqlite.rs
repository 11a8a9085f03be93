//! SQLite backend on top of rusqlite

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::ErrorCode;

use super::{Connector, NativeConnection, NativeError, NativeErrorKind, ResultSet};
use crate::config::ConnectionConfig;
use crate::types::Value;

/// Opens SQLite databases (files or `:memory:`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn NativeConnection>, NativeError> {
        let conn = if config.database.is_empty() || config.database == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&config.database)
        }
        .map_err(native_error)?;

        Ok(Box::new(SqliteConnection { conn }))
    }
}

/// A native SQLite handle
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    fn batch(&self, sql: &str) -> Result<(), NativeError> {
        self.conn.execute_batch(sql).map_err(native_error)
    }
}

impl NativeConnection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[(String, Value)]) -> Result<ResultSet, NativeError> {
        let mut stmt = self.conn.prepare(sql).map_err(native_error)?;

        // Placeholders that do not occur in the SQL are skipped
        let mut bound = vec![false; stmt.parameter_count()];
        for (name, value) in params {
            if let Some(index) = stmt.parameter_index(name).map_err(native_error)? {
                stmt.raw_bind_parameter(index, to_sql_value(value))
                    .map_err(native_error)?;
                if let Some(slot) = bound.get_mut(index - 1) {
                    *slot = true;
                }
            }
        }
        // SQLite would silently bind a missing parameter as NULL
        if let Some(missing) = bound.iter().position(|b| !b) {
            let index = missing + 1;
            let name = stmt
                .parameter_name(index)
                .map(str::to_string)
                .unwrap_or_else(|| format!("?{}", index));
            return Err(NativeError::other(format!("No value bound for parameter {}", name)));
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        if columns.is_empty() {
            let affected = stmt.raw_execute().map_err(native_error)?;
            let last_insert_id = match self.conn.last_insert_rowid() {
                0 => None,
                id if affected > 0 => Some(id),
                _ => None,
            };
            return Ok(ResultSet {
                columns,
                rows: Vec::new(),
                affected_rows: affected as u64,
                last_insert_id,
            });
        }

        let mut rows = Vec::new();
        let mut cursor = stmt.raw_query();
        while let Some(row) = cursor.next().map_err(native_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(from_value_ref(row.get_ref(i).map_err(native_error)?));
            }
            rows.push(values);
        }

        Ok(ResultSet {
            columns,
            rows,
            affected_rows: 0,
            last_insert_id: None,
        })
    }

    fn begin(&mut self) -> Result<(), NativeError> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> Result<(), NativeError> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), NativeError> {
        self.batch("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn quote(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn last_insert_id(&self) -> Option<i64> {
        match self.conn.last_insert_rowid() {
            0 => None,
            id => Some(id),
        }
    }

    fn server_version(&self) -> String {
        rusqlite::version().to_string()
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Json(doc) => SqlValue::Text(doc.to_string()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn native_error(err: rusqlite::Error) -> NativeError {
    let (kind, code) = match &err {
        rusqlite::Error::SqliteFailure(e, _) => {
            let kind = match e.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => NativeErrorKind::Transient,
                _ => NativeErrorKind::Other,
            };
            (kind, Some(e.extended_code.to_string()))
        }
        _ => (NativeErrorKind::Other, None),
    };

    NativeError {
        kind,
        code,
        message: err.to_string(),
    }
}
