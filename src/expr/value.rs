//! Dynamically typed expression values
//!
//! A closed tagged variant with explicit coercion rules: string
//! concatenation on `+` with any string operand, numeric promotion from int
//! to float, and recoverable division-by-zero. Conversions to and from
//! `serde_json::Value` sit here because evaluation contexts are built from
//! JSON maps.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// A value produced or consumed by the expression engine
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// Human-readable type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Truthiness used by logical operators and policy dispatch
    ///
    /// Falsy: null, false, 0, 0.0, empty string, empty list, empty map.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
        }
    }

    /// String coercion used by `+` concatenation and interpolation
    ///
    /// Null renders as the empty string.
    pub fn coerce_to_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => s.clone(),
            Self::List(_) | Self::Map(_) => self.to_string(),
        }
    }

    /// Build a value from a JSON tree
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Self::Str(s.clone()),
            JsonValue::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            JsonValue::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Equality with int/float cross-comparison; mismatched types compare unequal
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{}", s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                // Sorted for deterministic rendering
                let mut keys: Vec<_> = entries.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, entries[*key])?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());

        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(Value::List(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(Value::Null.coerce_to_string(), "");
        assert_eq!(Value::Int(42).coerce_to_string(), "42");
        assert_eq!(Value::Bool(true).coerce_to_string(), "true");
        assert_eq!(Value::Str("hi".into()).coerce_to_string(), "hi");
    }

    #[test]
    fn test_from_json() {
        let value = Value::from_json(&json!({
            "name": "Bo",
            "level": 3,
            "tags": ["a", "b"],
            "ratio": 0.5,
            "missing": null
        }));

        let Value::Map(map) = value else {
            panic!("expected map");
        };
        assert_eq!(map["name"], Value::Str("Bo".into()));
        assert_eq!(map["level"], Value::Int(3));
        assert_eq!(map["ratio"], Value::Float(0.5));
        assert_eq!(map["missing"], Value::Null);
        assert_eq!(
            map["tags"],
            Value::List(vec![Value::Str("a".into()), Value::Str("b".into())])
        );
    }

    #[test]
    fn test_loose_eq_across_numeric_types() {
        assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
        assert!(!Value::Int(2).loose_eq(&Value::Float(2.5)));
        assert!(!Value::Int(2).loose_eq(&Value::Str("2".into())));
    }

    #[test]
    fn test_display_is_deterministic() {
        let mut entries = HashMap::new();
        entries.insert("b".to_string(), Value::Int(2));
        entries.insert("a".to_string(), Value::Int(1));
        assert_eq!(Value::Map(entries).to_string(), "{a: 1, b: 2}");
    }
}
