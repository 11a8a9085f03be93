//! Column to type-name mapping
//!
//! A `TypeMap` tells the query builder which type a value compared against a
//! given column (or alias) should bind as, and which type a fetched column
//! should be cast to.

use indexmap::IndexMap;

/// Maps column names and aliases to type names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeMap {
    /// Types applying to every query sharing this map (usually schema-derived)
    defaults: IndexMap<String, String>,
    /// Types set explicitly for one query; these win over defaults
    types: IndexMap<String, String>,
}

impl TypeMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map from default types
    pub fn with_defaults<I, K, V>(defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = Self::new();
        map.add_defaults(defaults);
        map
    }

    /// Replace all default types
    pub fn set_defaults<I, K, V>(&mut self, defaults: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.defaults.clear();
        self.add_defaults(defaults);
    }

    /// Add default types, overriding existing keys
    pub fn add_defaults<I, K, V>(&mut self, defaults: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (column, ty) in defaults {
            self.defaults.insert(column.into(), ty.into());
        }
    }

    /// Add explicit types, overriding existing keys
    pub fn set_types<I, K, V>(&mut self, types: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (column, ty) in types {
            self.types.insert(column.into(), ty.into());
        }
    }

    /// Look up the type for a column.
    ///
    /// Explicit types are checked before defaults. A qualified name
    /// (`articles.id`) falls back to its unqualified column (`id`).
    pub fn type_for(&self, column: &str) -> Option<&str> {
        let lookup = |key: &str| {
            self.types
                .get(key)
                .or_else(|| self.defaults.get(key))
                .map(String::as_str)
        };

        lookup(column).or_else(|| {
            column
                .rsplit_once('.')
                .and_then(|(_, unqualified)| lookup(unqualified))
        })
    }

    /// All known mappings, explicit types overriding defaults
    pub fn to_map(&self) -> IndexMap<String, String> {
        let mut merged = self.defaults.clone();
        for (k, v) in &self.types {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Check if the map holds no mapping at all
    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_types_win() {
        let mut map = TypeMap::with_defaults([("id", "integer"), ("created", "datetime")]);
        map.set_types([("created", "date")]);

        assert_eq!(map.type_for("id"), Some("integer"));
        assert_eq!(map.type_for("created"), Some("date"));
        assert_eq!(map.type_for("missing"), None);
    }

    #[test]
    fn test_qualified_fallback() {
        let map = TypeMap::with_defaults([("author_id", "integer"), ("articles.title", "text")]);

        assert_eq!(map.type_for("articles.author_id"), Some("integer"));
        assert_eq!(map.type_for("articles.title"), Some("text"));
        assert_eq!(map.type_for("title"), None);
    }
}
