//! Common table expressions

use super::Query;

/// A named subquery attached to a query's WITH clause
#[derive(Debug, Clone)]
pub struct CommonTableExpression {
    /// CTE name
    pub name: String,
    /// Defining query
    pub query: Option<Box<Query>>,
    /// Optional column list
    pub fields: Vec<String>,
    /// Whether the CTE refers to itself
    pub recursive: bool,
    /// Modifiers placed before the query, e.g. `MATERIALIZED`
    pub modifiers: Vec<String>,
}

impl CommonTableExpression {
    /// Create a CTE from a name and its defining query
    pub fn new(name: impl Into<String>, query: Query) -> Self {
        Self {
            name: name.into(),
            query: Some(Box::new(query)),
            fields: Vec::new(),
            recursive: false,
            modifiers: Vec::new(),
        }
    }

    /// Create a CTE whose query is set later
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: None,
            fields: Vec::new(),
            recursive: false,
            modifiers: Vec::new(),
        }
    }

    /// Set the defining query
    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(Box::new(query));
        self
    }

    /// Set the column list
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Mark as recursive
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Add a modifier such as `MATERIALIZED` or `NOT MATERIALIZED`
    pub fn modifier(mut self, modifier: impl Into<String>) -> Self {
        self.modifiers.push(modifier.into());
        self
    }

    /// Shorthand for the `MATERIALIZED` modifier
    pub fn materialized(self) -> Self {
        self.modifier("MATERIALIZED")
    }
}
