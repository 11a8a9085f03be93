//! Placeholder generation and value bindings

use indexmap::IndexMap;
use std::collections::HashMap;

use crate::types::Value;

/// A value bound to a named placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Bound value
    pub value: Value,
    /// Type name the value binds as
    pub ty: Option<String>,
    /// Placeholder name without the leading colon
    pub placeholder: String,
}

/// Collects the values bound while compiling a query.
///
/// Bindings are keyed by their full token (`:c0`) and kept in the order they
/// were bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueBinder {
    bindings: IndexMap<String, Binding>,
    counters: HashMap<String, usize>,
}

impl ValueBinder {
    /// Create an empty binder
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value to a placeholder (`:name` or `name`)
    pub fn bind(&mut self, param: &str, value: impl Into<Value>, ty: Option<&str>) {
        let key = if param.starts_with(':') || param.starts_with('?') {
            param.to_string()
        } else {
            format!(":{}", param)
        };
        let placeholder = key.trim_start_matches(':').to_string();
        self.bindings.insert(
            key,
            Binding {
                value: value.into(),
                ty: ty.map(str::to_string),
                placeholder,
            },
        );
    }

    /// Generate a placeholder token.
    ///
    /// Tokens that already start with `:` or `?` are returned unchanged. Any
    /// other token is used as a prefix: `c` yields `:c0`, `:c1`, ...
    pub fn placeholder(&mut self, token: &str) -> String {
        if token.starts_with(':') || token.starts_with('?') {
            return token.to_string();
        }
        let counter = self.counters.entry(token.to_string()).or_insert(0);
        let placeholder = format!(":{}{}", token, counter);
        *counter += 1;
        placeholder
    }

    /// Bind every value under a fresh `:c<n>` placeholder and return the tokens
    pub fn generate_many_named<I>(&mut self, values: I, ty: Option<&str>) -> Vec<String>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        values
            .into_iter()
            .map(|value| {
                let token = self.placeholder("c");
                self.bind(&token, value, ty);
                token
            })
            .collect()
    }

    /// Copy bindings from `other` whose tokens are not bound here yet
    pub fn merge(&mut self, other: &ValueBinder) {
        for (token, binding) in &other.bindings {
            self.bindings
                .entry(token.clone())
                .or_insert_with(|| binding.clone());
        }
    }

    /// All bindings in bind order
    pub fn bindings(&self) -> &IndexMap<String, Binding> {
        &self.bindings
    }

    /// Look up a binding by token
    pub fn get(&self, token: &str) -> Option<&Binding> {
        self.bindings.get(token)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop all bindings and restart placeholder numbering
    pub fn reset(&mut self) {
        self.bindings.clear();
        self.counters.clear();
    }

    /// Restart placeholder numbering, keeping the bindings
    pub fn reset_count(&mut self) {
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_numbering() {
        let mut binder = ValueBinder::new();
        assert_eq!(binder.placeholder("c"), ":c0");
        assert_eq!(binder.placeholder("c"), ":c1");
        assert_eq!(binder.placeholder("tag"), ":tag0");
        assert_eq!(binder.placeholder(":id"), ":id");
        assert_eq!(binder.placeholder("?"), "?");
    }

    #[test]
    fn test_bind() {
        let mut binder = ValueBinder::new();
        binder.bind(":id", 7, Some("integer"));
        binder.bind("name", "x", None);

        let id = binder.get(":id").unwrap();
        assert_eq!(id.value, Value::Int(7));
        assert_eq!(id.ty.as_deref(), Some("integer"));
        assert_eq!(id.placeholder, "id");
        assert_eq!(binder.get(":name").unwrap().placeholder, "name");
    }

    #[test]
    fn test_generate_many_named() {
        let mut binder = ValueBinder::new();
        let tokens = binder.generate_many_named(vec![1, 2, 3], Some("integer"));
        assert_eq!(tokens, vec![":c0", ":c1", ":c2"]);
        assert_eq!(binder.len(), 3);
    }

    #[test]
    fn test_reset() {
        let mut binder = ValueBinder::new();
        binder.generate_many_named(vec![1, 2], None);

        binder.reset_count();
        assert_eq!(binder.len(), 2);
        assert_eq!(binder.placeholder("c"), ":c0");

        assert_eq!(binder.placeholder("c"), ":c1");
        assert_eq!(binder.placeholder("tag"), ":tag0");
        binder.reset();
        assert!(binder.is_empty());
        assert_eq!(binder.placeholder("c"), ":c0");
        assert_eq!(binder.placeholder("tag"), ":tag0");
    }

    #[test]
    fn test_merge_keeps_existing_bindings() {
        let mut outer = ValueBinder::new();
        outer.bind(":id", 1, None);

        let mut inner = ValueBinder::new();
        inner.bind(":id", 2, None);
        inner.bind(":author", 7, Some("integer"));

        outer.merge(&inner);
        assert_eq!(outer.len(), 2);
        assert_eq!(outer.get(":id").unwrap().value, Value::Int(1));
        assert_eq!(outer.get(":author").unwrap().ty.as_deref(), Some("integer"));
    }
}
