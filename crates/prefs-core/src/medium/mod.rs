//! Persistent key-value medium the preference store writes through.
//!
//! The medium keeps type-tagged values and applies edit batches atomically:
//! either every operation of a batch becomes visible or none does.

mod file;
mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use self::file::{FileMedium, SETTINGS_FORMAT_VERSION};
pub use self::memory::MemoryMedium;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Bool(bool),
    String(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    Put(String, Value),
    Remove(String),
    Clear,
}

impl EditOp {
    pub(crate) fn apply_to(&self, entries: &mut BTreeMap<String, Value>) {
        match self {
            EditOp::Put(key, value) => {
                entries.insert(key.clone(), value.clone());
            }
            EditOp::Remove(key) => {
                entries.remove(key);
            }
            EditOp::Clear => entries.clear(),
        }
    }
}

pub trait PreferenceMedium: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// All stored keys in ascending order.
    fn keys(&self) -> Vec<String>;

    /// Apply `ops` in order as one atomic unit. On error nothing changes.
    fn commit(&self, ops: &[EditOp]) -> Result<(), StorageError>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn get_int(&self, key: &str, default: i32) -> i32 {
        match self.get(key) {
            Some(Value::Int(v)) => v,
            _ => default,
        }
    }

    fn get_long(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(Value::Long(v)) => v,
            _ => default,
        }
    }

    fn get_float(&self, key: &str, default: f32) -> f32 {
        match self.get(key) {
            Some(Value::Float(v)) => v,
            _ => default,
        }
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(v)) => v,
            _ => default,
        }
    }

    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(v)) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_apply_in_order() {
        let mut entries = BTreeMap::new();
        let ops = vec![
            EditOp::Put("a".into(), Value::Int(1)),
            EditOp::Clear,
            EditOp::Put("b".into(), Value::Bool(true)),
            EditOp::Remove("missing".into()),
        ];
        for op in &ops {
            op.apply_to(&mut entries);
        }
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get("b"), Some(&Value::Bool(true)));
    }

    #[test]
    fn value_json_shape() {
        let json = serde_json::to_value(Value::Long(7)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "long", "value": 7}));
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::Long(7));
    }

    #[test]
    fn typed_getters_are_strict() {
        let medium = MemoryMedium::new();
        medium
            .commit(&[
                EditOp::Put("n".into(), Value::Int(5)),
                EditOp::Put("s".into(), Value::String("5".into())),
            ])
            .unwrap();
        assert_eq!(medium.get_int("n", 0), 5);
        assert_eq!(medium.get_long("n", -1), -1);
        assert_eq!(medium.get_float("n", 0.5), 0.5);
        assert_eq!(medium.get_int("s", 9), 9);
        assert_eq!(medium.get_string("s").as_deref(), Some("5"));
        assert_eq!(medium.get_string("n"), None);
        assert!(!medium.get_bool("n", false));
    }
}
