// src/models.rs

use std::collections::HashMap;
use std::fmt;

/// A single node in the configuration value tree.
///
/// This is the crate's explicit, key-path-addressed representation of merged
/// settings: every layer (defaults, files, environment, overrides...) is a
/// `ConfigValue::Map` and the merged view is rebuilt from those maps. Lists
/// are opaque leaves for merging purposes; only maps recurse.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ConfigValue>),
    Map(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Human-readable type tag, used in merge-conflict diagnostics.
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

    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    pub fn as_map(&self) -> Option<&HashMap<String, ConfigValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut HashMap<String, ConfigValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convenience constructor for an empty map node.
    pub fn empty_map() -> Self {
        Self::Map(HashMap::new())
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{}", s),
            Self::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Self::Map(m) => {
                let mut keys: Vec<&String> = m.keys().collect();
                keys.sort();
                let rendered: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("{}: {}", k, m[k]))
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => Self::Str(s),
            toml::Value::Integer(i) => Self::Int(i),
            toml::Value::Float(x) => Self::Float(x),
            toml::Value::Boolean(b) => Self::Bool(b),
            toml::Value::Datetime(dt) => Self::Str(dt.to_string()),
            toml::Value::Array(items) => {
                Self::List(items.into_iter().map(ConfigValue::from).collect())
            }
            toml::Value::Table(table) => Self::Map(
                table
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(ConfigValue::from).collect())
            }
            serde_json::Value::Object(obj) => Self::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&ConfigValue> for serde_json::Value {
    fn from(value: &ConfigValue) -> Self {
        match value {
            ConfigValue::Null => Self::Null,
            ConfigValue::Bool(b) => Self::Bool(*b),
            ConfigValue::Int(i) => Self::from(*i),
            ConfigValue::Float(x) => {
                serde_json::Number::from_f64(*x).map_or(Self::Null, Self::Number)
            }
            ConfigValue::Str(s) => Self::String(s.clone()),
            ConfigValue::List(items) => Self::Array(items.iter().map(Self::from).collect()),
            ConfigValue::Map(m) => {
                let mut obj = serde_json::Map::new();
                let mut keys: Vec<&String> = m.keys().collect();
                keys.sort();
                for key in keys {
                    obj.insert(key.clone(), Self::from(&m[key]));
                }
                Self::Object(obj)
            }
        }
    }
}

/// Builds a `ConfigValue::Map` from key/value pairs.
#[macro_export]
macro_rules! config_map {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = std::collections::HashMap::new();
        $(map.insert($key.to_string(), $crate::models::ConfigValue::from($value));)*
        $crate::models::ConfigValue::Map(map)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_table_converts_to_nested_map() {
        let parsed: toml::Value = toml::from_str("[run]\necho = true\nretries = 3").unwrap();
        let value = ConfigValue::from(parsed);
        let run = value.as_map().unwrap().get("run").unwrap();
        assert_eq!(
            run.as_map().unwrap().get("echo"),
            Some(&ConfigValue::Bool(true))
        );
        assert_eq!(
            run.as_map().unwrap().get("retries"),
            Some(&ConfigValue::Int(3))
        );
    }

    #[test]
    fn json_round_trips_through_config_value() {
        let raw: serde_json::Value =
            serde_json::from_str(r#"{"a": {"b": [1, "two", null]}}"#).unwrap();
        let value = ConfigValue::from(raw.clone());
        assert_eq!(serde_json::Value::from(&value), raw);
    }

    #[test]
    fn type_names_cover_all_variants() {
        assert_eq!(ConfigValue::Null.type_name(), "null");
        assert_eq!(ConfigValue::Bool(false).type_name(), "bool");
        assert_eq!(ConfigValue::List(vec![]).type_name(), "list");
        assert_eq!(ConfigValue::empty_map().type_name(), "map");
    }

    #[test]
    fn config_map_macro_builds_nested_values() {
        let value = config_map! {
            "echo" => true,
            "shell" => "/bin/sh",
        };
        let m = value.as_map().unwrap();
        assert_eq!(m.get("echo"), Some(&ConfigValue::Bool(true)));
        assert_eq!(m.get("shell"), Some(&ConfigValue::Str("/bin/sh".into())));
    }
}
