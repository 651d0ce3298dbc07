//! Read-only configuration trees built from JSON.

use hs_types::{DataError, HsResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// A node in a configuration tree: a scalar or array leaf, or a nested object.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    Value(Value),
    Object(ConfigObject),
}

impl ConfigNode {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ConfigObject> {
        match self {
            Self::Object(o) => Some(o),
            Self::Value(_) => None,
        }
    }
}

/// A named JSON object whose nested objects are themselves `ConfigObject`s.
///
/// Names follow the key (or file stem) they came from, capitalized:
/// `model.json` gives `Model`, a nested `"solver"` key gives `Solver`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigObject {
    name: String,
    fields: BTreeMap<String, ConfigNode>,
}

impl ConfigObject {
    pub fn from_file<P: AsRef<Path>>(path: P) -> HsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        let value: Value = serde_json::from_str(&text)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let config = Self::from_value(value, &stem)?;
        info!("Loaded config '{}' from {}", config.name, path.display());
        Ok(config)
    }

    /// Build a tree from a JSON object; any other JSON value is rejected.
    pub fn from_value(value: Value, name: &str) -> Result<Self, DataError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map, name)),
            other => Err(DataError::InvalidFormat {
                message: format!("config '{}' must be a JSON object, got {}", name, kind(&other)),
            }),
        }
    }

    fn from_map(map: Map<String, Value>, name: &str) -> Self {
        let fields = map
            .into_iter()
            .map(|(key, value)| {
                let node = match value {
                    Value::Object(nested) => ConfigNode::Object(Self::from_map(nested, &key)),
                    leaf => ConfigNode::Value(leaf),
                };
                (key, node)
            })
            .collect();
        Self {
            name: capitalize(name),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<&ConfigNode> {
        self.fields.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(ConfigNode::as_value)
    }

    pub fn object(&self, key: &str) -> Option<&ConfigObject> {
        self.get(key).and_then(ConfigNode::as_object)
    }

    /// Follow a dotted path such as `"model.solver.name"`.
    pub fn lookup(&self, path: &str) -> Option<&ConfigNode> {
        let mut segments = path.split('.');
        let mut node = self.get(segments.next()?)?;
        for segment in segments {
            node = node.as_object()?.get(segment)?;
        }
        Some(node)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Back to plain JSON; names are not part of the output.
    pub fn to_value(&self) -> Value {
        let map = self
            .fields
            .iter()
            .map(|(key, node)| {
                let value = match node {
                    ConfigNode::Value(v) => v.clone(),
                    ConfigNode::Object(o) => o.to_value(),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "attribute1": "value1",
            "attribute2": {
                "nested_attribute1": "nested_value1",
                "nested_attribute2": "nested_value2"
            }
        })
    }

    #[test]
    fn builds_nested_objects() {
        let config = ConfigObject::from_value(sample(), "TestClass").unwrap();
        assert_eq!(config.name(), "Testclass");
        assert_eq!(config.value("attribute1"), Some(&json!("value1")));

        let nested = config.object("attribute2").unwrap();
        assert_eq!(nested.name(), "Attribute2");
        assert_eq!(nested.value("nested_attribute1"), Some(&json!("nested_value1")));
        assert_eq!(nested.value("nested_attribute2"), Some(&json!("nested_value2")));
        assert!(config.value("attribute2").is_none());
    }

    #[test]
    fn from_file_names_root_after_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.json");
        std::fs::write(&path, sample().to_string()).unwrap();

        let config = ConfigObject::from_file(&path).unwrap();
        assert_eq!(config.name(), "Test_config");
        assert_eq!(
            config.lookup("attribute2.nested_attribute2").and_then(ConfigNode::as_value),
            Some(&json!("nested_value2"))
        );
        assert_eq!(config.to_value(), sample());
    }

    #[test]
    fn lookup_misses() {
        let config = ConfigObject::from_value(sample(), "cfg").unwrap();
        assert!(config.lookup("attribute1.deeper").is_none());
        assert!(config.lookup("absent").is_none());
        assert!(config.lookup("").is_none());
        assert_eq!(config.keys().collect::<Vec<_>>(), vec!["attribute1", "attribute2"]);
    }

    #[test]
    fn keys_need_not_be_identifiers() {
        let config =
            ConfigObject::from_value(json!({"max-iter": 100, "2nd pass": true}), "odd").unwrap();
        assert_eq!(config.value("max-iter"), Some(&json!(100)));
        assert_eq!(config.value("2nd pass"), Some(&json!(true)));
        assert_eq!(config.len(), 2);
    }

    #[test]
    fn root_must_be_an_object() {
        let err = ConfigObject::from_value(json!([1, 2]), "list").unwrap_err();
        assert!(err.to_string().contains("an array"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ConfigObject::from_file(&path).is_err());
    }
}
