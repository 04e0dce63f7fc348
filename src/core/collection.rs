// src/core/collection.rs
//
// Task namespaces. A collection holds tasks and sub-collections, resolves
// dotted lookups ("docs.build"), and carries its own configuration slice
// which is unioned along the lookup path.

use crate::core::config::{merge_values, ConfigError, ValueMap};
use crate::core::parse_context::ParserContext;
use crate::core::task::Task;
use crate::models::ConfigValue;
use indexmap::IndexMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Name conflict: this collection has a task named {0:?} already")]
    TaskNameConflict(String),
    #[error("Name conflict: this collection has a sub-collection named {0:?} already")]
    SubCollectionNameConflict(String),
    #[error("'{name}' cannot be the default because '{existing}' already is!")]
    DuplicateDefault { name: String, existing: String },
    #[error("Non-root collections must have a name!")]
    MissingName,
    #[error("This collection has no default task.")]
    NoDefaultTask,
    #[error("No task named {0:?} in this collection!")]
    NoSuchTask(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid task argument declaration: {0}")]
    BadArguments(String),
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub name: Option<String>,
    pub doc: Option<String>,
    tasks: IndexMap<String, Task>,
    // alias -> primary task name
    aliases: IndexMap<String, String>,
    collections: IndexMap<String, Collection>,
    pub default: Option<String>,
    pub auto_dash_names: bool,
    configuration: ValueMap,
    pub loaded_from: Option<PathBuf>,
}

impl Collection {
    pub fn new() -> Self {
        Self {
            auto_dash_names: true,
            ..Default::default()
        }
    }

    pub fn named(name: &str) -> Self {
        let mut coll = Self::new();
        coll.name = Some(coll.transform(name));
        coll
    }

    pub fn with_auto_dash_names(mut self, enabled: bool) -> Self {
        self.auto_dash_names = enabled;
        self
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    pub fn with_loaded_from(mut self, path: PathBuf) -> Self {
        self.loaded_from = Some(path);
        self
    }

    /// First line of the collection's doc text.
    pub fn summary(&self) -> Option<&str> {
        self.doc.as_deref().and_then(|d| d.lines().next())
    }

    pub fn is_empty(&self) -> bool {
        self.task_names().is_empty()
    }

    /// Apply the underscore/dash policy to a name: with auto-dashing on,
    /// interior underscores become dashes; with it off, the reverse. The
    /// first and last characters and anything touching a dot are left alone.
    pub fn transform(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        let (from, to) = if self.auto_dash_names {
            ('_', '-')
        } else {
            ('-', '_')
        };
        let chars: Vec<char> = name.chars().collect();
        let end = chars.len() - 1;
        chars
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                if c == from
                    && i != 0
                    && i != end
                    && chars[i - 1] != '.'
                    && chars[i + 1] != '.'
                {
                    to
                } else {
                    c
                }
            })
            .collect()
    }

    fn subtask_name(&self, collection_name: &str, task_name: &str) -> String {
        format!(
            "{}.{}",
            self.transform(collection_name),
            self.transform(task_name)
        )
    }

    // --- MUTATION ---

    /// Add a task under its own (transformed) name and aliases.
    pub fn add_task(&mut self, task: Task) -> Result<(), CollectionError> {
        let name = self.transform(&task.name);
        if self.collections.contains_key(&name) {
            return Err(CollectionError::SubCollectionNameConflict(name));
        }
        for alias in &task.aliases {
            let alias = self.transform(alias);
            self.aliases.insert(alias, name.clone());
        }
        if task.is_default {
            if let Some(existing) = &self.default {
                return Err(CollectionError::DuplicateDefault {
                    name,
                    existing: existing.clone(),
                });
            }
            self.default = Some(name.clone());
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Add a sub-collection; it must carry a name.
    pub fn add_collection(&mut self, coll: Collection) -> Result<(), CollectionError> {
        let Some(name) = coll.name.clone() else {
            return Err(CollectionError::MissingName);
        };
        let name = self.transform(&name);
        if self.tasks.contains_key(&name) {
            return Err(CollectionError::TaskNameConflict(name));
        }
        self.collections.insert(name, coll);
        Ok(())
    }

    /// Merge `options` into this collection's configuration slice.
    pub fn configure(&mut self, options: &ValueMap) -> Result<(), CollectionError> {
        merge_values(&mut self.configuration, options)?;
        Ok(())
    }

    // --- LOOKUP ---

    fn split_path(path: &str) -> (&str, &str) {
        match path.split_once('.') {
            Some((head, rest)) => (head, rest),
            None => (path, ""),
        }
    }

    pub fn subcollection_from_path(&self, path: &str) -> Option<&Collection> {
        let mut current = self;
        for part in path.split('.') {
            current = current.collections.get(part)?;
        }
        Some(current)
    }

    fn local_task(&self, name: &str) -> Option<&Task> {
        self.tasks
            .get(name)
            .or_else(|| self.aliases.get(name).and_then(|p| self.tasks.get(p)))
    }

    /// Resolve `name` (dotted, aliased, or empty-for-default) to a task plus
    /// the configuration unioned along the path. On shared keys, collections
    /// nearer the root win.
    pub fn task_with_config(
        &self,
        name: &str,
    ) -> Result<(&Task, ValueMap), CollectionError> {
        let ours = self.configuration.clone();
        if name.is_empty() {
            let default = self
                .default
                .as_deref()
                .ok_or(CollectionError::NoDefaultTask)?;
            let task = self
                .local_task(default)
                .ok_or_else(|| CollectionError::NoSuchTask(default.to_string()))?;
            return Ok((task, ours));
        }
        let name = self.transform(name);
        if name.contains('.') {
            let (coll, rest) = Self::split_path(&name);
            return self.merged_from_child(coll, rest, ours);
        }
        if self.collections.contains_key(name.as_str()) {
            return self.merged_from_child(&name, "", ours);
        }
        match self.local_task(&name) {
            Some(task) => Ok((task, ours)),
            None => Err(CollectionError::NoSuchTask(name)),
        }
    }

    fn merged_from_child(
        &self,
        coll: &str,
        rest: &str,
        ours: ValueMap,
    ) -> Result<(&Task, ValueMap), CollectionError> {
        let child = self
            .collections
            .get(coll)
            .ok_or_else(|| CollectionError::NoSuchTask(coll.to_string()))?;
        let (task, mut config) = child.task_with_config(rest)?;
        // Shallow top-level union; our keys override the child's.
        for (key, value) in ours {
            config.insert(key, value);
        }
        Ok((task, config))
    }

    pub fn task(&self, name: &str) -> Result<&Task, CollectionError> {
        self.task_with_config(name).map(|(task, _)| task)
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.task_with_config(name).is_ok()
    }

    /// This collection's own config (no path), or the config seen by
    /// `taskpath`.
    pub fn configuration(&self, taskpath: Option<&str>) -> Result<ValueMap, CollectionError> {
        match taskpath {
            None => Ok(self.configuration.clone()),
            Some(path) => self.task_with_config(path).map(|(_, config)| config),
        }
    }

    // --- FLATTENED VIEWS ---

    /// All task identifiers, flattened: primary dotted name -> aliases. A
    /// sub-collection's default task picks up the bare collection name as an
    /// extra alias.
    pub fn task_names(&self) -> IndexMap<String, Vec<String>> {
        let mut ret = IndexMap::new();
        for (name, task) in &self.tasks {
            let aliases = task.aliases.iter().map(|a| self.transform(a)).collect();
            ret.insert(name.clone(), aliases);
        }
        for (coll_name, coll) in &self.collections {
            for (task_name, aliases) in coll.task_names() {
                let mut aliases: Vec<String> = aliases
                    .iter()
                    .map(|a| self.subtask_name(coll_name, a))
                    .collect();
                if coll.default.as_deref() == Some(task_name.as_str()) {
                    aliases.push(coll_name.clone());
                }
                ret.insert(self.subtask_name(coll_name, &task_name), aliases);
            }
        }
        ret
    }

    /// Parser contexts for every reachable task, flat dotted names included.
    pub fn to_contexts(&self) -> Result<Vec<ParserContext>, CollectionError> {
        let mut result = Vec::new();
        for (primary, aliases) in self.task_names() {
            let task = self.task(&primary)?;
            let args = task
                .get_arguments()
                .map_err(|e| CollectionError::BadArguments(e.to_string()))?;
            let context = ParserContext::new(Some(&primary), aliases)
                .with_args(args)
                .map_err(|e| CollectionError::BadArguments(e.to_string()))?;
            result.push(context);
        }
        Ok(result)
    }

    /// JSON-friendly rendition of the whole tree, for `--list-format=json`.
    pub fn serialized(&self) -> serde_json::Value {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        let mut colls: Vec<&Collection> = self.collections.values().collect();
        colls.sort_by(|a, b| a.name.cmp(&b.name));
        serde_json::json!({
            "name": self.name,
            "help": self.summary(),
            "default": self.default,
            "tasks": tasks
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": self.transform(&t.name),
                        "help": t.summary(),
                        "aliases": t
                            .aliases
                            .iter()
                            .map(|a| self.transform(a))
                            .collect::<Vec<_>>(),
                    })
                })
                .collect::<Vec<_>>(),
            "collections": colls.iter().map(|c| c.serialized()).collect::<Vec<_>>(),
        })
    }

    /// The configuration map handed to `Config::load_collection` for a given
    /// task path, as `ConfigValue`s.
    pub fn config_values(&self, taskpath: &str) -> Result<ValueMap, CollectionError> {
        self.configuration(Some(taskpath))
    }

    pub fn collections(&self) -> impl Iterator<Item = (&String, &Collection)> {
        self.collections.iter()
    }

    pub fn tasks(&self) -> impl Iterator<Item = (&String, &Task)> {
        self.tasks.iter()
    }
}

/// Convenience for building config maps in `configure` calls.
pub fn config_entry(key: &str, value: ConfigValue) -> ValueMap {
    let mut map = ValueMap::new();
    map.insert(key.to_string(), value);
    map
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{ArgDecl, Task};

    fn noop(name: &str) -> Task {
        Task::new(name, |_, _| Ok(None))
    }

    #[test]
    fn transform_toggles_interior_underscores_only() {
        let coll = Collection::new();
        assert_eq!(coll.transform("my_task"), "my-task");
        assert_eq!(coll.transform("_private"), "_private");
        assert_eq!(coll.transform("trailing_"), "trailing_");
        assert_eq!(coll.transform("a._b"), "a._b");
        assert_eq!(coll.transform("b_.c"), "b_.c");
        assert_eq!(coll.transform("a_b.c_d"), "a-b.c-d");
        assert_eq!(coll.transform("_"), "_");
    }

    #[test]
    fn transform_reverses_when_dashing_disabled() {
        let coll = Collection::new().with_auto_dash_names(false);
        assert_eq!(coll.transform("my-task"), "my_task");
        assert_eq!(coll.transform("my_task"), "my_task");
    }

    #[test]
    fn add_task_and_lookup_by_alias() {
        let mut coll = Collection::new();
        coll.add_task(noop("build").with_aliases(&["compile"])).unwrap();
        assert!(coll.has_task("build"));
        assert!(coll.has_task("compile"));
        assert!(!coll.has_task("nope"));
    }

    #[test]
    fn task_collection_name_collisions_are_rejected() {
        let mut coll = Collection::new();
        coll.add_task(noop("docs")).unwrap();
        let err = coll.add_collection(Collection::named("docs")).unwrap_err();
        assert!(matches!(err, CollectionError::TaskNameConflict(_)));

        let mut coll = Collection::new();
        coll.add_collection(Collection::named("docs")).unwrap();
        let err = coll.add_task(noop("docs")).unwrap_err();
        assert!(matches!(err, CollectionError::SubCollectionNameConflict(_)));
    }

    #[test]
    fn only_one_default_task_allowed() {
        let mut coll = Collection::new();
        coll.add_task(noop("first").default()).unwrap();
        let err = coll.add_task(noop("second").default()).unwrap_err();
        assert!(matches!(err, CollectionError::DuplicateDefault { .. }));
    }

    #[test]
    fn unnamed_subcollections_are_rejected() {
        let mut coll = Collection::new();
        let err = coll.add_collection(Collection::new()).unwrap_err();
        assert!(matches!(err, CollectionError::MissingName));
    }

    #[test]
    fn dotted_lookup_reaches_nested_tasks() {
        let mut inner = Collection::named("inner");
        inner.add_task(noop("mytask")).unwrap();
        let mut mid = Collection::named("mid");
        mid.add_collection(inner).unwrap();
        let mut root = Collection::new();
        root.add_collection(mid).unwrap();
        assert!(root.has_task("mid.inner.mytask"));
        assert_eq!(root.task("mid.inner.mytask").unwrap().name, "mytask");
    }

    #[test]
    fn empty_name_resolves_collection_default() {
        let mut coll = Collection::new();
        coll.add_task(noop("main").default()).unwrap();
        assert_eq!(coll.task("").unwrap().name, "main");
        let empty = Collection::new();
        assert!(matches!(
            empty.task("").unwrap_err(),
            CollectionError::NoDefaultTask
        ));
    }

    #[test]
    fn subcollection_name_resolves_its_default_task() {
        let mut docs = Collection::named("docs");
        docs.add_task(noop("build").default()).unwrap();
        let mut root = Collection::new();
        root.add_collection(docs).unwrap();
        assert_eq!(root.task("docs").unwrap().name, "build");
    }

    #[test]
    fn config_union_prefers_collections_nearer_the_root() {
        let mut inner = Collection::named("inner");
        inner.add_task(noop("mytask")).unwrap();
        let mut shared = ValueMap::new();
        shared.insert("shared".into(), ConfigValue::from("inner"));
        shared.insert("only_inner".into(), ConfigValue::from(1i64));
        inner.configure(&shared).unwrap();

        let mut root = Collection::new();
        root.add_collection(inner).unwrap();
        let mut root_conf = ValueMap::new();
        root_conf.insert("shared".into(), ConfigValue::from("root"));
        root_conf.insert("only_root".into(), ConfigValue::from(2i64));
        root.configure(&root_conf).unwrap();

        let (_, config) = root.task_with_config("inner.mytask").unwrap();
        assert_eq!(config.get("shared"), Some(&ConfigValue::from("root")));
        assert_eq!(config.get("only_inner"), Some(&ConfigValue::from(1i64)));
        assert_eq!(config.get("only_root"), Some(&ConfigValue::from(2i64)));
    }

    #[test]
    fn task_names_flatten_with_default_alias_injection() {
        let mut docs = Collection::named("docs");
        docs.add_task(noop("build").with_aliases(&["b"]).default())
            .unwrap();
        let mut root = Collection::new();
        root.add_task(noop("top")).unwrap();
        root.add_collection(docs).unwrap();
        let names = root.task_names();
        assert_eq!(names.get("top"), Some(&vec![]));
        assert_eq!(
            names.get("docs.build"),
            Some(&vec!["docs.b".to_string(), "docs".to_string()])
        );
    }

    #[test]
    fn to_contexts_builds_parser_contexts_with_task_args() {
        let mut coll = Collection::new();
        coll.add_task(
            noop("deploy").with_args(vec![ArgDecl::new("host")]),
        )
        .unwrap();
        let contexts = coll.to_contexts().unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].name(), Some("deploy"));
        assert!(contexts[0].has_flag("--host"));
    }

    #[test]
    fn serialized_renders_sorted_tree() {
        let mut docs = Collection::named("docs").with_doc("Documentation tasks.");
        docs.add_task(noop("build").with_doc("Build the docs.")).unwrap();
        let mut root = Collection::new();
        root.add_task(noop("zeta")).unwrap();
        root.add_task(noop("alpha")).unwrap();
        root.add_collection(docs).unwrap();
        let value = root.serialized();
        assert_eq!(value["tasks"][0]["name"], "alpha");
        assert_eq!(value["tasks"][1]["name"], "zeta");
        assert_eq!(value["collections"][0]["name"], "docs");
        assert_eq!(value["collections"][0]["help"], "Documentation tasks.");
        assert_eq!(value["collections"][0]["tasks"][0]["help"], "Build the docs.");
    }

    #[test]
    fn underscored_task_names_are_transformed_on_add() {
        let mut coll = Collection::new();
        coll.add_task(noop("my_task")).unwrap();
        assert!(coll.has_task("my-task"));
        assert!(coll.has_task("my_task")); // transformed again at lookup
    }
}
