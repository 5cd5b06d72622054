use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn from_string(s: &str) -> Self {
                Self(s.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique graph identifier.
    GraphId
);

define_id!(
    /// Unique run identifier.
    RunId
);

/// Opaque per-node parameters handed to a tool.
pub type ToolConfig = Map<String, Value>;

/// The mutable record threaded through every tool invocation of a run.
///
/// Keys are strings; values are JSON. Cloning produces a deep copy, which is
/// what step log snapshots rely on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    data: Map<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a State from initial data.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Get a value as an integer, if it's an integer.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Resolve a dotted path (`stats.words`) through nested objects.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Set a string value.
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Merge another map into this one (overwrites on conflict).
    pub fn merge(&mut self, other: &Map<String, Value>) {
        for (k, v) in other {
            self.data.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the underlying data map.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }
}

impl From<Map<String, Value>> for State {
    fn from(data: Map<String, Value>) -> Self {
        Self::from_map(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_operations() {
        let mut state = State::new();
        state.set_str("name", "Alice");
        state.set("count", json!(42));

        assert_eq!(state.get_str("name"), Some("Alice"));
        assert_eq!(state.get_i64("count"), Some(42));
        assert_eq!(state.get("missing"), None);

        assert_eq!(state.remove("name"), Some(json!("Alice")));
        assert!(!state.contains_key("name"));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_lookup_nested_path() {
        let mut state = State::new();
        state.set("stats", json!({"words": 12, "inner": {"flag": true}}));

        assert_eq!(state.lookup("stats.words"), Some(&json!(12)));
        assert_eq!(state.lookup("stats.inner.flag"), Some(&json!(true)));
        assert_eq!(state.lookup("stats.missing"), None);
        assert_eq!(state.lookup("stats.words.deeper"), None);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut state = State::new();
        state.set("items", json!([1, 2]));
        let snapshot = state.clone();

        state.set("items", json!([1, 2, 3]));
        assert_eq!(snapshot.get("items"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut state = State::new();
        state.set_str("text", "hello");
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value, json!({"text": "hello"}));

        let parsed: State = serde_json::from_value(json!({"n": 1})).unwrap();
        assert_eq!(parsed.get_i64("n"), Some(1));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
        assert_eq!(GraphId::from_string("g-1").to_string(), "g-1");
    }
}
