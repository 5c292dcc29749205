//! Closed variant type for node and edge payloads

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered property map
pub type Properties = BTreeMap<String, PropertyValue>;

/// Property value. Variant order matters for untagged deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for PropertyValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PropertyValue::Null,
            serde_json::Value::Bool(b) => PropertyValue::Bool(b),
            serde_json::Value::Number(n) => PropertyValue::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => PropertyValue::String(s),
            serde_json::Value::Array(items) => {
                PropertyValue::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                PropertyValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// Convert a JSON object into a property map; non-objects yield an empty map
pub(crate) fn properties_from_json(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
        _ => Properties::new(),
    }
}

impl fmt::Display for PropertyValue {
    /// Strings render bare, everything else renders as compact JSON
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("null"),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Number(n) => write!(f, "{}", n),
            PropertyValue::String(s) => f.write_str(s),
            other => {
                let json = serde_json::to_string(other).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_nested() {
        let json = serde_json::json!({
            "title": "Water boils at 100C",
            "score": 3,
            "tags": ["physics", true],
            "meta": { "lang": null }
        });

        let props = properties_from_json(json);
        assert_eq!(props["title"].as_str(), Some("Water boils at 100C"));
        assert_eq!(props["score"].as_f64(), Some(3.0));
        assert!(matches!(props["tags"], PropertyValue::List(ref items) if items.len() == 2));
        assert!(matches!(props["meta"], PropertyValue::Map(_)));
    }

    #[test]
    fn test_untagged_deserialization() {
        let value: PropertyValue = serde_json::from_str("null").unwrap();
        assert_eq!(value, PropertyValue::Null);

        let value: PropertyValue = serde_json::from_str("1.5").unwrap();
        assert_eq!(value, PropertyValue::Number(1.5));

        let value: PropertyValue = serde_json::from_str(r#"{"a":[1,"x"]}"#).unwrap();
        assert!(matches!(value, PropertyValue::Map(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(PropertyValue::from("plain").to_string(), "plain");
        assert_eq!(PropertyValue::from(2.5).to_string(), "2.5");
        let list = PropertyValue::List(vec![PropertyValue::from("a"), PropertyValue::Null]);
        assert_eq!(list.to_string(), r#"["a",null]"#);
    }
}
