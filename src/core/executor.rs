// src/core/executor.rs
//
// Turns requested tasks into a flat call chain (pre-tasks, the task, then
// post-tasks, recursively), optionally deduplicates repeated calls, and
// executes each with a freshly cloned configuration.

use crate::core::collection::Collection;
use crate::core::config::Config;
use crate::core::parse_context::ParserContext;
use crate::core::task::TaskArgs;
use crate::system::context::Context;
use crate::CancellationToken;
use anyhow::Context as _;
use std::sync::Arc;

/// One task invocation request: a dotted task path plus argument values.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: TaskArgs,
}

impl Call {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: TaskArgs::new(),
        }
    }

    pub fn with_args(name: &str, args: TaskArgs) -> Self {
        Self {
            name: name.to_string(),
            args,
        }
    }

    /// Build a call from a parsed task context: every argument with an
    /// effective value lands in the bag under its attribute name.
    pub fn from_parser_context(context: &ParserContext) -> Self {
        let mut args = TaskArgs::new();
        for (arg, slot) in context.args() {
            if let Some(value) = slot.value(arg) {
                let key = arg
                    .attr_name
                    .clone()
                    .unwrap_or_else(|| arg.name().to_string());
                args.insert(&key, value.clone());
            }
        }
        Self::with_args(context.name().unwrap_or_default(), args)
    }
}

pub struct Executor<'a> {
    collection: &'a Collection,
    config: &'a Config,
    cancellation: CancellationToken,
}

impl<'a> Executor<'a> {
    pub fn new(
        collection: &'a Collection,
        config: &'a Config,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            collection,
            config,
            cancellation,
        }
    }

    /// Execute `requests` in order, expanded with their pre/post chains.
    pub fn execute(&self, requests: &[Call]) -> anyhow::Result<()> {
        let mut chain = Vec::new();
        for call in requests {
            self.expand_call(call, &mut chain)?;
        }
        let dedupe = self.config.get_bool("tasks.dedupe").unwrap_or(true);
        if dedupe {
            chain = Self::dedupe(chain);
        }
        log::debug!(
            "Executing call chain: {:?}",
            chain.iter().map(|c| c.name.as_str()).collect::<Vec<_>>()
        );
        for call in &chain {
            self.execute_one(call)?;
        }
        Ok(())
    }

    fn expand_call(&self, call: &Call, out: &mut Vec<Call>) -> anyhow::Result<()> {
        let task = self
            .collection
            .task(&call.name)
            .with_context(|| format!("Can't find any task named {:?}!", call.name))?;
        for pre in task.pre.clone() {
            let resolved = self.resolve_sibling(&call.name, &pre)?;
            self.expand_call(&Call::new(&resolved), out)?;
        }
        out.push(call.clone());
        for post in task.post.clone() {
            let resolved = self.resolve_sibling(&call.name, &post)?;
            self.expand_call(&Call::new(&resolved), out)?;
        }
        Ok(())
    }

    /// Resolve a pre/post task name relative to the calling task's
    /// namespace, falling back to the root collection.
    fn resolve_sibling(&self, caller: &str, name: &str) -> anyhow::Result<String> {
        if let Some((parent, _)) = caller.rsplit_once('.') {
            let sibling = format!("{}.{}", parent, name);
            if self.collection.has_task(&sibling) {
                return Ok(sibling);
            }
        }
        if self.collection.has_task(name) {
            return Ok(name.to_string());
        }
        anyhow::bail!(
            "Task {:?} (pre/post of {:?}) not found in the namespace!",
            name,
            caller
        )
    }

    /// Keep the first occurrence of each identical (task, args) pair.
    fn dedupe(chain: Vec<Call>) -> Vec<Call> {
        let mut deduped: Vec<Call> = Vec::new();
        for call in chain {
            if !deduped.contains(&call) {
                deduped.push(call);
            }
        }
        deduped
    }

    fn execute_one(&self, call: &Call) -> anyhow::Result<()> {
        let (task, collection_config) = self
            .collection
            .task_with_config(&call.name)
            .with_context(|| format!("Can't find any task named {:?}!", call.name))?;
        let mut config = self
            .config
            .clone_config()
            .context("Failed cloning configuration for task execution")?;
        config
            .load_collection(collection_config)
            .context("Failed merging collection configuration")?;
        let mut context = Context::new(config, Arc::clone(&self.cancellation));
        log::debug!("Executing task {:?}", call.name);
        let output = task
            .call(&mut context, &call.args)
            .with_context(|| format!("Task {:?} failed", call.name))?;
        if task.autoprint {
            if let Some(output) = output {
                println!("{}", output);
            }
        }
        Ok(())
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::args::ArgValue;
    use crate::core::task::Task;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(name: &str, log: &Log) -> Task {
        let log = Arc::clone(log);
        let tag = name.to_string();
        Task::new(name, move |_, _| {
            log.lock().unwrap().push(tag.clone());
            Ok(None)
        })
    }

    fn token() -> CancellationToken {
        Arc::new(AtomicBool::new(false))
    }

    fn executor_fixture(log: &Log) -> Collection {
        let mut coll = Collection::new();
        coll.add_task(recording("clean", log)).unwrap();
        coll.add_task(recording("build", log).with_pre(&["clean"])).unwrap();
        coll.add_task(recording("package", log).with_pre(&["build"]))
            .unwrap();
        coll.add_task(
            recording("release", log)
                .with_pre(&["build", "package"])
                .with_post(&["clean"]),
        )
        .unwrap();
        coll
    }

    #[test]
    fn pre_chains_expand_recursively() {
        let log: Log = Arc::default();
        let coll = executor_fixture(&log);
        let config = Config::new();
        Executor::new(&coll, &config, token())
            .execute(&[Call::new("package")])
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["clean", "build", "package"]);
    }

    #[test]
    fn duplicate_calls_are_deduped_by_default() {
        let log: Log = Arc::default();
        let coll = executor_fixture(&log);
        let config = Config::new();
        Executor::new(&coll, &config, token())
            .execute(&[Call::new("release")])
            .unwrap();
        // Expansion is clean,build,clean,build,package,release,clean;
        // dedupe keeps first sightings only.
        assert_eq!(
            *log.lock().unwrap(),
            vec!["clean", "build", "package", "release"]
        );
    }

    #[test]
    fn dedupe_can_be_disabled() {
        let log: Log = Arc::default();
        let coll = executor_fixture(&log);
        let mut config = Config::new();
        config
            .set("tasks.dedupe", crate::models::ConfigValue::Bool(false))
            .unwrap();
        Executor::new(&coll, &config, token())
            .execute(&[Call::new("build"), Call::new("build")])
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["clean", "build", "clean", "build"]
        );
    }

    #[test]
    fn same_task_different_args_is_not_a_duplicate() {
        let log: Log = Arc::default();
        let mut coll = Collection::new();
        coll.add_task(recording("greet", &log)).unwrap();
        let config = Config::new();
        let mut args = TaskArgs::new();
        args.insert("name", ArgValue::Str("world".into()));
        Executor::new(&coll, &config, token())
            .execute(&[Call::new("greet"), Call::with_args("greet", args)])
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn pre_names_resolve_within_the_same_namespace_first() {
        let log: Log = Arc::default();
        let mut sub = Collection::named("sub");
        sub.add_task(recording("clean", &log)).unwrap();
        sub.add_task(recording("build", &log).with_pre(&["clean"])).unwrap();
        let mut root = Collection::new();
        let root_log = Arc::clone(&log);
        root.add_task(Task::new("clean", move |_, _| {
            root_log.lock().unwrap().push("root.clean".into());
            Ok(None)
        }))
        .unwrap();
        root.add_collection(sub).unwrap();
        let config = Config::new();
        Executor::new(&root, &config, token())
            .execute(&[Call::new("sub.build")])
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["clean", "build"]);
    }

    #[test]
    fn missing_tasks_error_clearly() {
        let log: Log = Arc::default();
        let coll = executor_fixture(&log);
        let config = Config::new();
        let err = Executor::new(&coll, &config, token())
            .execute(&[Call::new("nope")])
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn tasks_see_collection_configuration() {
        let seen: Arc<Mutex<Option<String>>> = Arc::default();
        let seen_clone = Arc::clone(&seen);
        let mut coll = Collection::new();
        coll.add_task(Task::new("peek", move |ctx, _| {
            *seen_clone.lock().unwrap() = ctx
                .config
                .get_str("greeting")
                .map(str::to_string);
            Ok(None)
        }))
        .unwrap();
        let mut options = crate::core::config::ValueMap::new();
        options.insert(
            "greeting".into(),
            crate::models::ConfigValue::from("hello"),
        );
        coll.configure(&options).unwrap();
        let config = Config::new();
        Executor::new(&coll, &config, token())
            .execute(&[Call::new("peek")])
            .unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("hello"));
    }
}
