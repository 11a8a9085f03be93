//! Executed statements
//!
//! A `Statement` holds the materialized result of one execution and hands out
//! rows through a forward-only cursor.

use indexmap::IndexMap;

use crate::driver::ResultSet;
use crate::error::Result;
use crate::types::{TypeMap, TypeRegistry, Value};

/// The result of executing one SQL statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    /// Column names
    columns: Vec<String>,
    /// Result rows
    rows: Vec<Vec<Value>>,
    /// Number of affected rows (for INSERT/UPDATE/DELETE)
    affected_rows: u64,
    /// Last generated row id
    last_insert_id: Option<i64>,
    /// Cursor position
    position: usize,
}

impl Statement {
    /// Wrap a native result set
    pub fn new(result: ResultSet) -> Self {
        Self {
            columns: result.columns,
            rows: result.rows,
            affected_rows: result.affected_rows,
            last_insert_id: result.last_insert_id,
            position: 0,
        }
    }

    /// Create an empty statement
    pub fn empty() -> Self {
        Self::default()
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Rows returned by a query, or rows changed by a write
    pub fn row_count(&self) -> usize {
        if self.columns.is_empty() {
            self.affected_rows as usize
        } else {
            self.rows.len()
        }
    }

    /// Row id generated by the statement, if any
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    /// Fetch the next row
    pub fn fetch(&mut self) -> Option<Vec<Value>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        row
    }

    /// Fetch the next row keyed by column name
    pub fn fetch_assoc(&mut self) -> Option<IndexMap<String, Value>> {
        let row = self.fetch()?;
        Some(self.columns.iter().cloned().zip(row).collect())
    }

    /// Fetch one column of the next row
    pub fn fetch_column(&mut self, index: usize) -> Option<Value> {
        self.fetch().and_then(|row| row.into_iter().nth(index))
    }

    /// Fetch all remaining rows
    pub fn fetch_all(&mut self) -> Vec<Vec<Value>> {
        let rest = self.rows.get(self.position..).unwrap_or_default().to_vec();
        self.position = self.rows.len();
        rest
    }

    /// Fetch all remaining rows keyed by column name
    pub fn fetch_all_assoc(&mut self) -> Vec<IndexMap<String, Value>> {
        self.fetch_all()
            .into_iter()
            .map(|row| self.columns.iter().cloned().zip(row).collect())
            .collect()
    }

    /// Cast columns listed in a type map through their converters
    pub fn cast(mut self, types: &TypeMap, registry: &TypeRegistry) -> Result<Self> {
        let targets: Vec<(usize, String)> = self
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| types.type_for(c).map(|t| (i, t.to_string())))
            .collect();
        if targets.is_empty() {
            return Ok(self);
        }

        for row in &mut self.rows {
            for (index, ty) in &targets {
                if let Some(cell) = row.get_mut(*index) {
                    let value = std::mem::replace(cell, Value::Null);
                    *cell = registry.from_database(value, Some(ty))?;
                }
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement() -> Statement {
        Statement::new(ResultSet {
            columns: vec!["id".to_string(), "published".to_string()],
            rows: vec![
                vec![Value::Int(1), Value::Int(1)],
                vec![Value::Int(2), Value::Int(0)],
            ],
            affected_rows: 0,
            last_insert_id: None,
        })
    }

    #[test]
    fn test_cursor() {
        let mut stmt = statement();
        assert_eq!(stmt.row_count(), 2);
        assert_eq!(stmt.fetch_column(0), Some(Value::Int(1)));

        let rest = stmt.fetch_all_assoc();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0]["id"], Value::Int(2));
        assert_eq!(stmt.fetch(), None);
    }

    #[test]
    fn test_cast() {
        let types = TypeMap::with_defaults([("published", "boolean")]);
        let mut stmt = statement().cast(&types, &TypeRegistry::new()).unwrap();
        assert_eq!(stmt.fetch(), Some(vec![Value::Int(1), Value::Bool(true)]));
        assert_eq!(stmt.fetch(), Some(vec![Value::Int(2), Value::Bool(false)]));
    }

    #[test]
    fn test_write_row_count() {
        let stmt = Statement::new(ResultSet {
            affected_rows: 3,
            last_insert_id: Some(9),
            ..ResultSet::default()
        });
        assert_eq!(stmt.row_count(), 3);
        assert_eq!(stmt.last_insert_id(), Some(9));
    }
}
