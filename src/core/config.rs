// src/core/config.rs

use crate::config_map;
use crate::constants::{CONFIG_PREFIX, FILE_SUFFIXES, SYSTEM_PREFIX};
use crate::core::env as env_loader;
use crate::models::ConfigValue;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Can't cleanly merge {base_type} ({base}) with {update_type} ({update})")]
    AmbiguousMerge {
        base_type: &'static str,
        base: String,
        update_type: &'static str,
        update: String,
    },
    #[error(
        "Configuration keys '{first}' and '{second}' both map to environment variable '{var}'"
    )]
    AmbiguousEnvVar {
        var: String,
        first: String,
        second: String,
    },
    #[error("Can't cast environment variable '{var}' into a {wanted}-typed setting")]
    UncastableEnvVar { var: String, wanted: &'static str },
    #[error("Environment variable '{var}' value {value:?} is not a valid {wanted}")]
    EnvCast {
        var: String,
        value: String,
        wanted: &'static str,
    },
    #[error("Config files of type '{suffix}' (from file '{path}') are not supported! Please use one of: {supported:?}")]
    UnknownFileType {
        suffix: String,
        path: String,
        supported: &'static [&'static str],
    },
    #[error("Config file '{path}' must contain a top-level table/object")]
    InvalidFileRoot { path: String },
    #[error("Error reading config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Error parsing TOML in '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Error parsing JSON in '{path}': {source}")]
    JsonParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub type ValueMap = HashMap<String, ConfigValue>;

// --- MERGE PRIMITIVES ---

/// Recursively merge `updates` into `base`, mutating `base`.
///
/// Map values present on both sides recurse; a map on exactly one side is an
/// unrecoverable conflict. The whole merge is validated up front so a
/// conflict aborts before any key of `base` has been touched.
pub fn merge_values(base: &mut ValueMap, updates: &ValueMap) -> ConfigResult<()> {
    check_mergeable(base, updates)?;
    apply_merge(base, updates);
    Ok(())
}

fn check_mergeable(base: &ValueMap, updates: &ValueMap) -> ConfigResult<()> {
    for (key, value) in updates {
        if let Some(existing) = base.get(key) {
            match (existing, value) {
                (ConfigValue::Map(b), ConfigValue::Map(u)) => check_mergeable(b, u)?,
                (b, u) if b.is_map() != u.is_map() => {
                    return Err(ConfigError::AmbiguousMerge {
                        base_type: b.type_name(),
                        base: b.to_string(),
                        update_type: u.type_name(),
                        update: u.to_string(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn apply_merge(base: &mut ValueMap, updates: &ValueMap) {
    for (key, value) in updates {
        match (base.get_mut(key), value) {
            (Some(ConfigValue::Map(b)), ConfigValue::Map(u)) => apply_merge(b, u),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Return a deep, independent copy of `source` (merge into an empty base).
pub fn copy_map(source: &ValueMap) -> ValueMap {
    let mut base = ValueMap::new();
    apply_merge(&mut base, source);
    base
}

/// Remove every (nested) key mentioned in `deletions` from `base`.
///
/// Deletion leaves are `Null`; map values recurse. Runs after all layers
/// have merged, so deletions always win.
pub fn obliterate(base: &mut ValueMap, deletions: &ValueMap) {
    for (key, value) in deletions {
        match value {
            ConfigValue::Map(inner) => {
                if let Some(ConfigValue::Map(target)) = base.get_mut(key) {
                    obliterate(target, inner);
                }
            }
            _ => {
                base.remove(key);
            }
        }
    }
}

/// Remove the key pointed at by `keypath` from nested `map`, if it exists.
pub fn excise(map: &mut ValueMap, keypath: &[&str]) {
    let Some((leaf, parents)) = keypath.split_last() else {
        return;
    };
    let mut current = map;
    for key in parents {
        match current.get_mut(*key) {
            Some(ConfigValue::Map(next)) => current = next,
            _ => return,
        }
    }
    current.remove(*leaf);
}

// --- FILE TIERS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    System,
    User,
    Project,
    Runtime,
}

impl Tier {
    fn describe(self) -> &'static str {
        match self {
            Self::System => "System-wide",
            Self::User => "Per-user",
            Self::Project => "Per-project",
            Self::Runtime => "Runtime",
        }
    }
}

/// One config file tier: where to look, what was found, what it held.
#[derive(Debug, Clone, Default)]
struct FileTier {
    prefix: Option<String>,
    path: Option<PathBuf>,
    // None = not attempted yet; Some(false) = attempted, nothing there.
    found: Option<bool>,
    data: ValueMap,
}

// --- CONFIG ---

/// The layered configuration object.
///
/// Layers, lowest to highest precedence: defaults, collection, system file,
/// user file, project file, environment variables, runtime file, overrides,
/// modifications. Deletions are tracked separately and applied last on every
/// re-merge so lower layers can never resurrect a deleted key.
#[derive(Debug, Clone)]
pub struct Config {
    defaults: ValueMap,
    collection: ValueMap,
    system: FileTier,
    user: FileTier,
    project: FileTier,
    runtime: FileTier,
    env: ValueMap,
    env_prefix: String,
    overrides: ValueMap,
    modifications: ValueMap,
    deletions: ValueMap,
    merged: ValueMap,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a config holding only the built-in defaults. No file I/O is
    /// performed; call the `load_*` methods (or `load_base_conf_files`) to
    /// pull in file tiers.
    pub fn new() -> Self {
        let mut config = Self {
            defaults: global_defaults(),
            collection: ValueMap::new(),
            system: FileTier {
                prefix: Some(SYSTEM_PREFIX.to_string()),
                ..Default::default()
            },
            user: FileTier {
                // Resolved eagerly so later expansion never depends on $HOME.
                prefix: dirs::home_dir()
                    .map(|home| format!("{}/.", home.display()))
                    .or(Some("~/.".to_string())),
                ..Default::default()
            },
            project: FileTier::default(),
            runtime: FileTier::default(),
            env: ValueMap::new(),
            env_prefix: crate::constants::ENV_PREFIX.to_string(),
            overrides: ValueMap::new(),
            modifications: ValueMap::new(),
            deletions: ValueMap::new(),
            merged: ValueMap::new(),
        };
        // Defaults alone can never conflict with an empty stack.
        config.merge().expect("defaults must merge cleanly");
        config
    }

    pub fn with_defaults(defaults: ValueMap) -> Self {
        let mut config = Self::new();
        config.defaults = defaults;
        config.merge().expect("defaults must merge cleanly");
        config
    }

    /// Replace the 'defaults' layer.
    pub fn load_defaults(&mut self, data: ValueMap) -> ConfigResult<()> {
        self.defaults = data;
        self.merge()
    }

    /// Replace the 'overrides' layer (typically CLI flag values).
    pub fn load_overrides(&mut self, data: ValueMap) -> ConfigResult<()> {
        self.overrides = data;
        self.merge()
    }

    /// Replace the collection-driven layer.
    pub fn load_collection(&mut self, data: ValueMap) -> ConfigResult<()> {
        log::debug!("Loading collection configuration");
        self.collection = data;
        self.merge()
    }

    pub fn set_system_prefix(&mut self, prefix: Option<String>) {
        self.system = FileTier {
            prefix,
            ..Default::default()
        };
    }

    pub fn set_user_prefix(&mut self, prefix: Option<String>) {
        self.user = FileTier {
            prefix,
            ..Default::default()
        };
    }

    /// Set the directory where a project-tier config file may be found
    /// (typically the directory the task collection was loaded from).
    pub fn set_project_location(&mut self, path: Option<&Path>) {
        let prefix = path.map(|p| format!("{}/", p.display()));
        self.project = FileTier {
            prefix,
            ..Default::default()
        };
    }

    /// Set the full path of the runtime config file, if any.
    pub fn set_runtime_path(&mut self, path: Option<PathBuf>) {
        self.runtime = FileTier::default();
        self.runtime.path = path;
    }

    pub fn load_system(&mut self) -> ConfigResult<()> {
        self.load_tier(Tier::System)?;
        self.merge()
    }

    pub fn load_user(&mut self) -> ConfigResult<()> {
        self.load_tier(Tier::User)?;
        self.merge()
    }

    pub fn load_project(&mut self) -> ConfigResult<()> {
        self.load_tier(Tier::Project)?;
        self.merge()
    }

    pub fn load_runtime(&mut self) -> ConfigResult<()> {
        self.load_tier(Tier::Runtime)?;
        self.merge()
    }

    /// Load the system and user tiers, which need no other context.
    pub fn load_base_conf_files(&mut self) -> ConfigResult<()> {
        self.load_tier(Tier::System)?;
        self.load_tier(Tier::User)?;
        self.merge()
    }

    /// Load the environment-variable layer. Intended for late in the
    /// lifecycle: only keys already present in the merged view are sought,
    /// so all other sources should be loaded first.
    pub fn load_shell_env(&mut self) -> ConfigResult<()> {
        log::debug!("Running pre-merge for shell env loading...");
        self.merge()?;
        self.env = env_loader::load_env(&self.merged, &self.env_prefix)?;
        log::debug!("Loaded shell environment, triggering final merge");
        self.merge()
    }

    fn tier_mut(&mut self, tier: Tier) -> &mut FileTier {
        match tier {
            Tier::System => &mut self.system,
            Tier::User => &mut self.user,
            Tier::Project => &mut self.project,
            Tier::Runtime => &mut self.runtime,
        }
    }

    fn tier(&self, tier: Tier) -> &FileTier {
        match tier {
            Tier::System => &self.system,
            Tier::User => &self.user,
            Tier::Project => &self.project,
            Tier::Runtime => &self.runtime,
        }
    }

    fn load_tier(&mut self, tier: Tier) -> ConfigResult<()> {
        // Short-circuit if loading was already attempted.
        if self.tier(tier).found.is_some() {
            return Ok(());
        }
        let candidates: Vec<PathBuf> = if tier == Tier::Runtime {
            match &self.runtime.path {
                Some(path) => vec![path.clone()],
                None => return Ok(()),
            }
        } else {
            let Some(prefix) = self.tier(tier).prefix.clone() else {
                return Ok(());
            };
            FILE_SUFFIXES
                .iter()
                .map(|suffix| {
                    let raw = format!("{}{}.{}", prefix, CONFIG_PREFIX, suffix);
                    PathBuf::from(shellexpand::tilde(&raw).into_owned())
                })
                .collect()
        };
        for path in candidates {
            if !path.is_file() {
                log::debug!("Didn't see any {}, skipping.", path.display());
                continue;
            }
            let data = load_config_file(&path)?;
            let slot = self.tier_mut(tier);
            slot.data = data;
            slot.path = Some(path);
            slot.found = Some(true);
            return Ok(());
        }
        self.tier_mut(tier).found = Some(false);
        Ok(())
    }

    /// Rebuild the merged view from scratch, all layers in order, deletions
    /// last.
    pub fn merge(&mut self) -> ConfigResult<()> {
        log::debug!("Merging config sources in order onto new empty cache...");
        let mut merged = ValueMap::new();
        merge_values(&mut merged, &self.defaults)?;
        merge_values(&mut merged, &self.collection)?;
        for tier in [Tier::System, Tier::User, Tier::Project] {
            Self::merge_tier(&mut merged, self.tier(tier), tier)?;
        }
        merge_values(&mut merged, &self.env)?;
        Self::merge_tier(&mut merged, self.tier(Tier::Runtime), Tier::Runtime)?;
        merge_values(&mut merged, &self.overrides)?;
        merge_values(&mut merged, &self.modifications)?;
        obliterate(&mut merged, &self.deletions);
        self.merged = merged;
        Ok(())
    }

    fn merge_tier(merged: &mut ValueMap, slot: &FileTier, tier: Tier) -> ConfigResult<()> {
        match slot.found {
            None => log::debug!("{} config file has not been loaded yet, skipping", tier.describe()),
            Some(true) => {
                log::debug!(
                    "{} config file ({:?}): merging",
                    tier.describe(),
                    slot.path
                );
                merge_values(merged, &slot.data)?;
            }
            Some(false) => log::debug!("{} config file not found, skipping", tier.describe()),
        }
        Ok(())
    }

    // --- READ ACCESS (always against the fully merged view) ---

    pub fn view(&self) -> &ValueMap {
        &self.merged
    }

    /// Look up a dotted key path (e.g. `"run.echo"`) in the merged view.
    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        let mut parts = path.split('.');
        let mut current = self.merged.get(parts.next()?)?;
        for part in parts {
            current = current.as_map()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(ConfigValue::as_bool)
    }

    pub fn get_int(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(ConfigValue::as_int)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(ConfigValue::as_str)
    }

    // --- WRITE ACCESS (modifications/deletions ledgers) ---

    /// Write `value` at dotted `path` into the modifications layer. Clears
    /// any matching entry from the deletions ledger first, so a re-set key
    /// reappears.
    pub fn set(&mut self, path: &str, value: ConfigValue) -> ConfigResult<()> {
        let parts: Vec<&str> = path.split('.').collect();
        excise(&mut self.deletions, &parts);
        let mut current = &mut self.modifications;
        let (leaf, parents) = parts.split_last().expect("key path may not be empty");
        for key in parents {
            current = current
                .entry((*key).to_string())
                .or_insert_with(ConfigValue::empty_map)
                .as_map_mut()
                .expect("modification path components must be maps");
        }
        current.insert((*leaf).to_string(), value);
        self.merge()
    }

    /// Record dotted `path` in the deletions ledger; the key disappears from
    /// the merged view even though lower layers still contain it. Returns
    /// false (and records nothing) if the key is not currently visible.
    pub fn delete(&mut self, path: &str) -> ConfigResult<bool> {
        if self.get(path).is_none() {
            return Ok(false);
        }
        let parts: Vec<&str> = path.split('.').collect();
        let (leaf, parents) = parts.split_last().expect("key path may not be empty");
        let mut current = &mut self.deletions;
        for key in parents {
            let entry = current
                .entry((*key).to_string())
                .or_insert_with(ConfigValue::empty_map);
            match entry {
                ConfigValue::Map(next) => current = next,
                // A parent is already wholly deleted; nothing further needed.
                _ => return Ok(true),
            }
        }
        current.insert((*leaf).to_string(), ConfigValue::Null);
        self.merge()?;
        Ok(true)
    }

    /// Deep-copy this configuration: all layers are cloned and the merged
    /// view rebuilt, leaving no shared mutable state with the original.
    pub fn clone_config(&self) -> ConfigResult<Self> {
        let mut new = self.clone();
        new.defaults = copy_map(&self.defaults);
        new.collection = copy_map(&self.collection);
        new.overrides = copy_map(&self.overrides);
        new.modifications = copy_map(&self.modifications);
        new.deletions = copy_map(&self.deletions);
        new.merge()?;
        Ok(new)
    }
}

/// The core default settings.
pub fn global_defaults() -> ValueMap {
    let shell = if cfg!(target_os = "windows") {
        std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    } else {
        "/bin/sh".to_string()
    };
    let mut root = ValueMap::new();
    root.insert(
        "run".to_string(),
        config_map! {
            "warn" => false,
            "hide" => ConfigValue::Null,
            "shell" => shell,
            "pty" => false,
            "fallback" => true,
            "echo" => false,
            "env" => ConfigValue::empty_map(),
            "replace_env" => false,
            "echo_stdin" => ConfigValue::Null,
        },
    );
    root.insert(
        "sudo".to_string(),
        config_map! {
            "prompt" => "[sudo] password: ",
            "password" => ConfigValue::Null,
            "user" => ConfigValue::Null,
        },
    );
    root.insert(
        "tasks".to_string(),
        config_map! {
            "dedupe" => true,
            "auto_dash_names" => true,
            "collection_name" => crate::constants::DEFAULT_COLLECTION_NAME,
            "search_root" => ConfigValue::Null,
        },
    );
    root
}

fn load_config_file(path: &Path) -> ConfigResult<ValueMap> {
    let suffix = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_string();
    if !FILE_SUFFIXES.contains(&suffix.as_str()) {
        return Err(ConfigError::UnknownFileType {
            suffix,
            path: path.display().to_string(),
            supported: FILE_SUFFIXES,
        });
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let value = match suffix.as_str() {
        "toml" => {
            let parsed: toml::Value =
                toml::from_str(&text).map_err(|source| ConfigError::TomlParse {
                    path: path.display().to_string(),
                    source,
                })?;
            ConfigValue::from(parsed)
        }
        _ => {
            let parsed: serde_json::Value =
                serde_json::from_str(&text).map_err(|source| ConfigError::JsonParse {
                    path: path.display().to_string(),
                    source,
                })?;
            ConfigValue::from(parsed)
        }
    };
    match value {
        ConfigValue::Map(map) => Ok(map),
        _ => Err(ConfigError::InvalidFileRoot {
            path: path.display().to_string(),
        }),
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn map(pairs: &[(&str, ConfigValue)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn merge_inserts_and_overwrites_leaves() {
        let mut base = map(&[("keep", ConfigValue::Int(1)), ("swap", ConfigValue::Int(2))]);
        let updates = map(&[("swap", ConfigValue::Int(3)), ("new", ConfigValue::Int(4))]);
        merge_values(&mut base, &updates).unwrap();
        assert_eq!(base.get("keep"), Some(&ConfigValue::Int(1)));
        assert_eq!(base.get("swap"), Some(&ConfigValue::Int(3)));
        assert_eq!(base.get("new"), Some(&ConfigValue::Int(4)));
    }

    #[test]
    fn merge_recurses_into_nested_maps() {
        let mut base = ValueMap::new();
        base.insert("run".into(), config_map! { "echo" => false, "warn" => false });
        let mut updates = ValueMap::new();
        updates.insert("run".into(), config_map! { "echo" => true });
        merge_values(&mut base, &updates).unwrap();
        let run = base.get("run").unwrap().as_map().unwrap();
        assert_eq!(run.get("echo"), Some(&ConfigValue::Bool(true)));
        assert_eq!(run.get("warn"), Some(&ConfigValue::Bool(false)));
    }

    #[test]
    fn merge_is_idempotent_for_conflict_free_inputs() {
        let mut base = ValueMap::new();
        base.insert("a".into(), config_map! { "b" => 1i64 });
        let mut updates = ValueMap::new();
        updates.insert("a".into(), config_map! { "c" => 2i64 });
        merge_values(&mut base, &updates).unwrap();
        let snapshot = base.clone();
        merge_values(&mut base, &updates).unwrap();
        assert_eq!(base, snapshot);
    }

    #[test]
    fn merge_type_conflict_fails_before_touching_other_keys() {
        let mut base = map(&[
            ("aaa", ConfigValue::Int(1)),
            ("zzz", config_map! { "inner" => 1i64 }),
        ]);
        let updates = map(&[
            ("aaa", ConfigValue::Int(99)),
            ("zzz", ConfigValue::Int(5)),
        ]);
        let err = merge_values(&mut base, &updates).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousMerge { .. }));
        // Unrelated key untouched even though it sorts before the conflict.
        assert_eq!(base.get("aaa"), Some(&ConfigValue::Int(1)));
    }

    #[test]
    fn merge_conflict_both_directions() {
        let mut base = map(&[("k", ConfigValue::Int(5))]);
        let updates = map(&[("k", config_map! { "nested" => 1i64 })]);
        assert!(merge_values(&mut base, &updates).is_err());

        let mut base = map(&[("k", config_map! { "nested" => 1i64 })]);
        let updates = map(&[("k", ConfigValue::Int(5))]);
        assert!(merge_values(&mut base, &updates).is_err());
    }

    #[test]
    fn copy_map_is_deep() {
        let mut source = ValueMap::new();
        source.insert("outer".into(), config_map! { "inner" => 1i64 });
        let mut copy = copy_map(&source);
        copy.get_mut("outer")
            .unwrap()
            .as_map_mut()
            .unwrap()
            .insert("inner".into(), ConfigValue::Int(9));
        let original = source.get("outer").unwrap().as_map().unwrap();
        assert_eq!(original.get("inner"), Some(&ConfigValue::Int(1)));
    }

    #[test]
    fn default_view_exposes_run_tree() {
        let config = Config::new();
        assert_eq!(config.get_bool("run.echo"), Some(false));
        assert_eq!(config.get_bool("tasks.dedupe"), Some(true));
        assert_eq!(config.get("run.hide"), Some(&ConfigValue::Null));
    }

    #[test]
    fn set_lands_in_merged_view() {
        let mut config = Config::new();
        config.set("run.echo", ConfigValue::Bool(true)).unwrap();
        assert_eq!(config.get_bool("run.echo"), Some(true));
        // Lower layers untouched: re-loading defaults keeps the override.
        config.merge().unwrap();
        assert_eq!(config.get_bool("run.echo"), Some(true));
    }

    #[test]
    fn deletion_wins_over_lower_layers_until_reset() {
        let mut config = Config::new();
        assert!(config.get("run.shell").is_some());
        assert!(config.delete("run.shell").unwrap());
        assert_eq!(config.get("run.shell"), None);
        // Remerging must not resurrect the deleted key.
        config.merge().unwrap();
        assert_eq!(config.get("run.shell"), None);
        // Setting it again removes the ledger entry and it reappears.
        config.set("run.shell", ConfigValue::from("/bin/zsh")).unwrap();
        assert_eq!(config.get_str("run.shell"), Some("/bin/zsh"));
    }

    #[test]
    fn delete_of_missing_key_records_nothing() {
        let mut config = Config::new();
        assert!(!config.delete("run.nope").unwrap());
    }

    #[test]
    fn overrides_beat_collection_and_defaults() {
        let mut config = Config::new();
        let mut coll = ValueMap::new();
        coll.insert("run".into(), config_map! { "echo" => true });
        config.load_collection(coll).unwrap();
        assert_eq!(config.get_bool("run.echo"), Some(true));
        let mut overrides = ValueMap::new();
        overrides.insert("run".into(), config_map! { "echo" => false });
        config.load_overrides(overrides).unwrap();
        assert_eq!(config.get_bool("run.echo"), Some(false));
    }

    #[test]
    fn runtime_file_toml_is_loaded_and_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[run]\necho = true").unwrap();
        let mut config = Config::new();
        config.set_runtime_path(Some(path));
        config.load_runtime().unwrap();
        assert_eq!(config.get_bool("run.echo"), Some(true));
    }

    #[test]
    fn project_tier_prefers_toml_over_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("drover.toml"), "[run]\nwarn = true\n").unwrap();
        std::fs::write(dir.path().join("drover.json"), r#"{"run": {"warn": false}}"#).unwrap();
        let mut config = Config::new();
        config.set_project_location(Some(dir.path()));
        config.load_project().unwrap();
        assert_eq!(config.get_bool("run.warn"), Some(true));
    }

    #[test]
    fn unknown_suffix_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.ini");
        std::fs::write(&path, "x = 1").unwrap();
        let mut config = Config::new();
        config.set_runtime_path(Some(path));
        let err = config.load_runtime().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFileType { .. }));
    }

    #[test]
    fn clone_config_shares_no_state() {
        let mut config = Config::new();
        config.set("run.echo", ConfigValue::Bool(true)).unwrap();
        let mut copy = config.clone_config().unwrap();
        copy.set("run.echo", ConfigValue::Bool(false)).unwrap();
        assert_eq!(config.get_bool("run.echo"), Some(true));
        assert_eq!(copy.get_bool("run.echo"), Some(false));
    }
}
