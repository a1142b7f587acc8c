//! Evaluation context: named scopes of attribute values
//!
//! Variables in the language are addressed as `$scope.path`; the context is
//! the set of scopes an integration exposes. The ABAC integration fixes the
//! scopes `user`, `resource`, and `context`; the engine itself is generic
//! over scope names so other consumers can expose their own.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use super::value::Value;

/// Context containing all variables available during evaluation
#[derive(Debug, Clone, Default)]
pub struct ExprContext {
    scopes: HashMap<String, Value>,
}

impl ExprContext {
    /// Create an empty evaluation context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scope holding a value (usually a map)
    pub fn with_scope(mut self, name: impl Into<String>, value: Value) -> Self {
        self.scopes.insert(name.into(), value);
        self
    }

    /// Add a scope built from a JSON object
    pub fn with_json_scope(
        self,
        name: impl Into<String>,
        entries: &HashMap<String, JsonValue>,
    ) -> Self {
        let map = entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect();
        self.with_scope(name, Value::Map(map))
    }

    /// Look up a scope root by name
    pub fn scope(&self, name: &str) -> Option<&Value> {
        self.scopes.get(name)
    }
}
