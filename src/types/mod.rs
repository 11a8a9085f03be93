//! Type system for ArcSQL
//!
//! Values are bound and fetched through named types. The builtin types cover
//! the usual SQL column types; applications register their own converters on a
//! `TypeRegistry` and hand that registry to their connections.

pub mod type_map;
pub mod value;

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

pub use type_map::TypeMap;
pub use value::Value;

/// Converts values between their application and database representations
pub trait TypeConverter: Send + Sync {
    /// Convert a value into what gets bound on the wire
    fn to_database(&self, value: &Value) -> Result<Value>;

    /// Convert a fetched value into its application representation
    fn from_database(&self, value: Value) -> Result<Value>;
}

/// Builtin column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    /// Tiny integer (8-bit)
    TinyInteger,
    /// Small integer (16-bit)
    SmallInteger,
    /// Integer (32-bit)
    Integer,
    /// Big integer (64-bit)
    BigInteger,
    /// Floating point
    Float,
    /// Fixed-point decimal, carried as a string to keep precision
    Decimal,
    /// Boolean
    Boolean,
    /// Variable-length character string
    String,
    /// Fixed-length character string
    Char,
    /// Unlimited text
    Text,
    /// UUID string
    Uuid,
    /// Binary data
    Binary,
    /// JSON document stored as text
    Json,
    /// Date (`YYYY-MM-DD`)
    Date,
    /// Date and time
    DateTime,
    /// Time of day
    Time,
    /// Timestamp
    Timestamp,
}

impl BuiltinType {
    /// Every builtin type
    pub const ALL: [BuiltinType; 17] = [
        BuiltinType::TinyInteger,
        BuiltinType::SmallInteger,
        BuiltinType::Integer,
        BuiltinType::BigInteger,
        BuiltinType::Float,
        BuiltinType::Decimal,
        BuiltinType::Boolean,
        BuiltinType::String,
        BuiltinType::Char,
        BuiltinType::Text,
        BuiltinType::Uuid,
        BuiltinType::Binary,
        BuiltinType::Json,
        BuiltinType::Date,
        BuiltinType::DateTime,
        BuiltinType::Time,
        BuiltinType::Timestamp,
    ];

    /// Registry name of this type
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinType::TinyInteger => "tinyinteger",
            BuiltinType::SmallInteger => "smallinteger",
            BuiltinType::Integer => "integer",
            BuiltinType::BigInteger => "biginteger",
            BuiltinType::Float => "float",
            BuiltinType::Decimal => "decimal",
            BuiltinType::Boolean => "boolean",
            BuiltinType::String => "string",
            BuiltinType::Char => "char",
            BuiltinType::Text => "text",
            BuiltinType::Uuid => "uuid",
            BuiltinType::Binary => "binary",
            BuiltinType::Json => "json",
            BuiltinType::Date => "date",
            BuiltinType::DateTime => "datetime",
            BuiltinType::Time => "time",
            BuiltinType::Timestamp => "timestamp",
        }
    }

    /// Check if this type is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            BuiltinType::TinyInteger
                | BuiltinType::SmallInteger
                | BuiltinType::Integer
                | BuiltinType::BigInteger
        )
    }

    /// Check if this type is carried as text
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            BuiltinType::String
                | BuiltinType::Char
                | BuiltinType::Text
                | BuiltinType::Uuid
                | BuiltinType::Decimal
                | BuiltinType::Date
                | BuiltinType::DateTime
                | BuiltinType::Time
                | BuiltinType::Timestamp
        )
    }

    fn mismatch(&self, value: &Value) -> Error {
        Error::TypeConversion {
            value: format!("{:?}", value),
            ty: self.name().to_string(),
        }
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TypeConverter for BuiltinType {
    fn to_database(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self {
            t if t.is_integer() => value
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| self.mismatch(value)),
            BuiltinType::Float => value
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| self.mismatch(value)),
            BuiltinType::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Int(i) => Ok(Value::Bool(*i != 0)),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "1" | "true" | "on" | "yes" => Ok(Value::Bool(true)),
                    "0" | "false" | "off" | "no" | "" => Ok(Value::Bool(false)),
                    _ => Err(self.mismatch(value)),
                },
                _ => Err(self.mismatch(value)),
            },
            BuiltinType::Json => serde_json::to_string(&value.to_json())
                .map(Value::String)
                .map_err(|e| Error::Internal(e.to_string())),
            BuiltinType::Binary => match value {
                Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
                Value::String(s) => Ok(Value::Bytes(s.clone().into_bytes())),
                _ => Err(self.mismatch(value)),
            },
            _ => match value {
                Value::String(s) => Ok(Value::String(s.clone())),
                Value::Int(_) | Value::Float(_) | Value::Bool(_) => {
                    Ok(Value::String(value.to_string()))
                }
                _ => Err(self.mismatch(value)),
            },
        }
    }

    fn from_database(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match self {
            t if t.is_integer() => value
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| self.mismatch(&value)),
            BuiltinType::Float => value
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| self.mismatch(&value)),
            BuiltinType::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(b)),
                Value::Int(i) => Ok(Value::Bool(i != 0)),
                Value::String(s) => Ok(Value::Bool(!matches!(s.as_str(), "" | "0" | "f" | "false"))),
                other => Err(self.mismatch(&other)),
            },
            BuiltinType::Json => {
                let parsed: Option<serde_json::Value> = match &value {
                    Value::String(s) => serde_json::from_str(s).ok(),
                    Value::Bytes(b) => serde_json::from_slice(b).ok(),
                    Value::Json(doc) => Some(doc.clone()),
                    other => Some(other.to_json()),
                };
                parsed.map(Value::Json).ok_or_else(|| self.mismatch(&value))
            }
            BuiltinType::Binary => match value {
                Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
                other => Ok(other),
            },
            _ => match value {
                Value::Int(_) | Value::Float(_) => Ok(Value::String(value.to_string())),
                other => Ok(other),
            },
        }
    }
}

/// Registry of named type converters.
///
/// Each connection holds a shared registry; there is no process-wide state.
#[derive(Clone)]
pub struct TypeRegistry {
    types: IndexMap<String, Arc<dyn TypeConverter>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeRegistry {
    /// Create a registry holding the builtin types
    pub fn new() -> Self {
        let mut types: IndexMap<String, Arc<dyn TypeConverter>> = IndexMap::new();
        for ty in BuiltinType::ALL {
            types.insert(ty.name().to_string(), Arc::new(ty));
        }
        Self { types }
    }

    /// Register (or replace) a converter under a name
    pub fn register(&mut self, name: impl Into<String>, converter: Arc<dyn TypeConverter>) {
        self.types.insert(name.into(), converter);
    }

    /// Make `alias` resolve to the converter registered as `target`
    pub fn alias(&mut self, alias: impl Into<String>, target: &str) -> Result<()> {
        let converter = self.build(target)?;
        self.types.insert(alias.into(), converter);
        Ok(())
    }

    /// Check if a type name is known
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Look up the converter for a type name
    pub fn build(&self, name: &str) -> Result<Arc<dyn TypeConverter>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown type `{}`", name)))
    }

    /// Convert a value for binding; untyped values pass through
    pub fn to_database(&self, value: &Value, ty: Option<&str>) -> Result<Value> {
        match ty {
            Some(name) => self.build(name)?.to_database(value),
            None => Ok(value.clone()),
        }
    }

    /// Cast a fetched value; untyped values pass through
    pub fn from_database(&self, value: Value, ty: Option<&str>) -> Result<Value> {
        match ty {
            Some(name) => self.build(name)?.from_database(value),
            None => Ok(value),
        }
    }

    /// Registered type names
    pub fn names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }
}
