// src/core/env.rs
//
// Environment-variable configuration layer. Only settings already present in
// the merged view are sought: each mapping leaf derives one candidate
// variable name, and name collisions are rejected before any variable is
// read.

use crate::core::config::{ConfigError, ConfigResult, ValueMap};
use crate::models::ConfigValue;
use std::collections::HashMap;
use std::env;

/// Scan the process environment against `view` and build a fresh layer map
/// holding every matching variable, cast to the type of the setting it
/// shadows.
pub fn load_env(view: &ValueMap, prefix: &str) -> ConfigResult<ValueMap> {
    let leaves = collect_leaves(view);
    let derived = derive_var_names(&leaves, prefix)?;
    let mut layer = ValueMap::new();
    for (var, path) in derived {
        let Ok(raw) = env::var(&var) else {
            continue;
        };
        log::debug!("Found environment variable {}, loading it", var);
        let template = lookup(view, &path).unwrap_or(&ConfigValue::Null);
        let value = cast(&var, &raw, template)?;
        insert_at(&mut layer, &path, value);
    }
    Ok(layer)
}

/// Every (key path, leaf) pair of the view, depth-first. Maps recurse; all
/// other values are leaves.
fn collect_leaves(view: &ValueMap) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    let mut keys: Vec<&String> = view.keys().collect();
    keys.sort();
    for key in keys {
        match &view[key] {
            ConfigValue::Map(inner) => {
                for mut sub in collect_leaves(inner) {
                    sub.insert(0, key.clone());
                    paths.push(sub);
                }
            }
            _ => paths.push(vec![key.clone()]),
        }
    }
    paths
}

/// Uppercase + underscore-join each path under `prefix`; two paths mapping
/// to the same variable name is a hard error (before reading anything).
fn derive_var_names(
    leaves: &[Vec<String>],
    prefix: &str,
) -> ConfigResult<HashMap<String, Vec<String>>> {
    let mut derived: HashMap<String, Vec<String>> = HashMap::new();
    for path in leaves {
        let var = format!("{}{}", prefix, path.join("_").to_uppercase());
        if let Some(existing) = derived.get(&var) {
            return Err(ConfigError::AmbiguousEnvVar {
                var,
                first: existing.join("."),
                second: path.join("."),
            });
        }
        derived.insert(var, path.clone());
    }
    Ok(derived)
}

fn lookup<'a>(view: &'a ValueMap, path: &[String]) -> Option<&'a ConfigValue> {
    let (first, rest) = path.split_first()?;
    let mut current = view.get(first)?;
    for key in rest {
        current = current.as_map()?.get(key)?;
    }
    Some(current)
}

/// Cast a raw env string to the type of the setting it shadows. Booleans
/// treat "" and "0" as false and everything else as true; null-valued
/// settings accept the raw string; list settings cannot be expressed.
fn cast(var: &str, raw: &str, template: &ConfigValue) -> ConfigResult<ConfigValue> {
    match template {
        ConfigValue::Bool(_) => Ok(ConfigValue::Bool(!(raw.is_empty() || raw == "0"))),
        ConfigValue::List(_) => Err(ConfigError::UncastableEnvVar {
            var: var.to_string(),
            wanted: "list",
        }),
        ConfigValue::Map(_) => Err(ConfigError::UncastableEnvVar {
            var: var.to_string(),
            wanted: "map",
        }),
        ConfigValue::Int(_) => raw
            .parse::<i64>()
            .map(ConfigValue::Int)
            .map_err(|_| ConfigError::EnvCast {
                var: var.to_string(),
                value: raw.to_string(),
                wanted: "int",
            }),
        ConfigValue::Float(_) => raw
            .parse::<f64>()
            .map(ConfigValue::Float)
            .map_err(|_| ConfigError::EnvCast {
                var: var.to_string(),
                value: raw.to_string(),
                wanted: "float",
            }),
        ConfigValue::Null | ConfigValue::Str(_) => Ok(ConfigValue::Str(raw.to_string())),
    }
}

fn insert_at(layer: &mut ValueMap, path: &[String], value: ConfigValue) {
    let Some((leaf, parents)) = path.split_last() else {
        return;
    };
    let mut current = layer;
    for key in parents {
        current = current
            .entry(key.clone())
            .or_insert_with(ConfigValue::empty_map)
            .as_map_mut()
            .expect("env layer parents are always maps");
    }
    current.insert(leaf.clone(), value);
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_map;

    // Env-var mutation is process-global; each test uses a unique prefix so
    // parallel test threads never collide.

    fn view() -> ValueMap {
        let mut v = ValueMap::new();
        v.insert(
            "run".into(),
            config_map! {
                "echo" => false,
                "shell" => "/bin/sh",
                "retries" => 3i64,
                "hide" => ConfigValue::Null,
            },
        );
        v
    }

    #[test]
    fn derives_nested_names_and_casts_bool() {
        env::set_var("DRVT1_RUN_ECHO", "1");
        let layer = load_env(&view(), "DRVT1_").unwrap();
        let run = layer.get("run").unwrap().as_map().unwrap();
        assert_eq!(run.get("echo"), Some(&ConfigValue::Bool(true)));
        env::remove_var("DRVT1_RUN_ECHO");
    }

    #[test]
    fn bool_empty_and_zero_are_false() {
        for (val, expected) in [("", false), ("0", false), ("false", true), ("yes", true)] {
            env::set_var("DRVT2_RUN_ECHO", val);
            let layer = load_env(&view(), "DRVT2_").unwrap();
            let run = layer.get("run").unwrap().as_map().unwrap();
            assert_eq!(run.get("echo"), Some(&ConfigValue::Bool(expected)), "{:?}", val);
        }
        env::remove_var("DRVT2_RUN_ECHO");
    }

    #[test]
    fn int_parses_or_errors() {
        env::set_var("DRVT3_RUN_RETRIES", "7");
        let layer = load_env(&view(), "DRVT3_").unwrap();
        let run = layer.get("run").unwrap().as_map().unwrap();
        assert_eq!(run.get("retries"), Some(&ConfigValue::Int(7)));

        env::set_var("DRVT3_RUN_RETRIES", "seven");
        let err = load_env(&view(), "DRVT3_").unwrap_err();
        assert!(matches!(err, ConfigError::EnvCast { .. }));
        env::remove_var("DRVT3_RUN_RETRIES");
    }

    #[test]
    fn null_setting_accepts_raw_string() {
        env::set_var("DRVT4_RUN_HIDE", "both");
        let layer = load_env(&view(), "DRVT4_").unwrap();
        let run = layer.get("run").unwrap().as_map().unwrap();
        assert_eq!(run.get("hide"), Some(&ConfigValue::Str("both".into())));
        env::remove_var("DRVT4_RUN_HIDE");
    }

    #[test]
    fn list_setting_is_uncastable() {
        let mut v = ValueMap::new();
        v.insert("paths".into(), ConfigValue::List(vec![]));
        env::set_var("DRVT5_PATHS", "a:b");
        let err = load_env(&v, "DRVT5_").unwrap_err();
        assert!(matches!(err, ConfigError::UncastableEnvVar { wanted: "list", .. }));
        env::remove_var("DRVT5_PATHS");
    }

    #[test]
    fn colliding_derived_names_error_before_reading() {
        // `foo_bar` (leaf) and `foo.bar` (nested) both derive PREFIX_FOO_BAR.
        let mut v = ValueMap::new();
        v.insert("foo_bar".into(), ConfigValue::Int(1));
        v.insert("foo".into(), config_map! { "bar" => 2i64 });
        let err = load_env(&v, "DRVT6_").unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousEnvVar { .. }));
    }

    #[test]
    fn unset_variables_leave_layer_empty() {
        let layer = load_env(&view(), "DRVT7_").unwrap();
        assert!(layer.is_empty());
    }
}
