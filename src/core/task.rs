// src/core/task.rs
//
// Tasks carry declarative argument metadata (`ArgDecl`) rather than deriving
// anything from their body: the body is an opaque closure, and everything
// the parser or help output needs is declared up front.

use crate::core::args::{ArgError, ArgValue, Argument, Kind};
use crate::core::parse_context::translate_underscores;
use crate::system::context::Context;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Values handed to a task body, keyed by the argument's attribute name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs(IndexMap<String, ArgValue>);

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: ArgValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(ArgValue::as_bool).unwrap_or(false)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgValue::as_str)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ArgValue::as_int)
    }

    pub fn get_list(&self, name: &str) -> &[String] {
        self.get(name).and_then(ArgValue::as_list).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.0.iter()
    }
}

/// One declared task argument.
#[derive(Debug, Clone, Default)]
pub struct ArgDecl {
    pub name: String,
    pub default: Option<ArgValue>,
    /// Explicit positional marker; when unset, arguments without defaults
    /// are positional.
    pub positional: Option<bool>,
    pub optional: bool,
    pub iterable: bool,
    pub incrementable: bool,
    pub help: Option<String>,
}

impl ArgDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_default(mut self, default: ArgValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn positional(mut self, flag: bool) -> Self {
        self.positional = Some(flag);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn iterable(mut self) -> Self {
        self.iterable = true;
        self
    }

    pub fn incrementable(mut self) -> Self {
        self.incrementable = true;
        self
    }

    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    fn is_positional(&self) -> bool {
        self.positional.unwrap_or(self.default.is_none())
    }
}

pub type TaskBody =
    Arc<dyn Fn(&mut Context, &TaskArgs) -> anyhow::Result<Option<String>> + Send + Sync>;

/// A named, executable unit with declared CLI arguments and optional
/// pre/post task chains.
#[derive(Clone)]
pub struct Task {
    pub name: String,
    body: TaskBody,
    pub doc: Option<String>,
    pub aliases: Vec<String>,
    pub args: Vec<ArgDecl>,
    /// Names of tasks to run before/after this one, resolved by the
    /// executor against the owning collection.
    pub pre: Vec<String>,
    pub post: Vec<String>,
    pub is_default: bool,
    pub auto_shortflags: bool,
    pub autoprint: bool,
    times_called: Arc<AtomicUsize>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("pre", &self.pre)
            .field("post", &self.post)
            .finish()
    }
}

impl Task {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&mut Context, &TaskArgs) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            body: Arc::new(body),
            doc: None,
            aliases: Vec::new(),
            args: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
            is_default: false,
            auto_shortflags: true,
            autoprint: false,
            times_called: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = Some(doc.to_string());
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_args(mut self, args: Vec<ArgDecl>) -> Self {
        self.args = args;
        self
    }

    pub fn with_pre(mut self, pre: &[&str]) -> Self {
        self.pre = pre.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_post(mut self, post: &[&str]) -> Self {
        self.post = post.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn no_auto_shortflags(mut self) -> Self {
        self.auto_shortflags = false;
        self
    }

    pub fn autoprint(mut self) -> Self {
        self.autoprint = true;
        self
    }

    /// First line of the task's doc text, for listings.
    pub fn summary(&self) -> Option<&str> {
        self.doc.as_deref().and_then(|d| d.lines().next())
    }

    pub fn times_called(&self) -> usize {
        self.times_called.load(Ordering::SeqCst)
    }

    /// Invoke the task body, bumping the call counter.
    pub fn call(&self, context: &mut Context, args: &TaskArgs) -> anyhow::Result<Option<String>> {
        self.times_called.fetch_add(1, Ordering::SeqCst);
        (self.body)(context, args)
    }

    fn kind_for(decl: &ArgDecl) -> Kind {
        if decl.iterable {
            return Kind::List;
        }
        if decl.incrementable {
            return Kind::Int;
        }
        match &decl.default {
            // Optional flags with bool defaults stay string-kinded so they
            // can still absorb a value token.
            Some(ArgValue::Bool(_)) if decl.optional => Kind::Str,
            Some(ArgValue::Bool(_)) => Kind::Bool,
            Some(ArgValue::Int(_)) => Kind::Int,
            Some(ArgValue::List(_)) => Kind::List,
            _ => Kind::Str,
        }
    }

    /// Build parser `Argument`s from the declarations: dashed flag names
    /// with the underscored original kept as `attr_name`, auto short flags
    /// from not-yet-taken characters, and positionals moved to the front in
    /// declaration order.
    pub fn get_arguments(&self) -> Result<Vec<Argument>, ArgError> {
        let mut taken: HashSet<String> = self.args.iter().map(|d| d.name.clone()).collect();
        let mut positionals = Vec::new();
        let mut flags = Vec::new();
        for decl in &self.args {
            let mut name = decl.name.clone();
            let mut attr_name = None;
            if name.contains('_') {
                attr_name = Some(name.clone());
                name = translate_underscores(&name);
            }
            let mut names = vec![name.clone()];
            if self.auto_shortflags {
                for c in name.chars() {
                    let candidate = c.to_string();
                    if candidate != name && !taken.contains(&candidate) {
                        names.push(candidate);
                        break;
                    }
                }
            }
            let mut arg = Argument::new(names, Self::kind_for(decl))?;
            for extra in arg.names() {
                taken.insert(extra.clone());
            }
            arg.positional = decl.is_positional();
            arg.incrementable = decl.incrementable;
            arg.default = decl.default.clone();
            arg.help = decl.help.clone();
            arg.attr_name = attr_name;
            if decl.optional {
                arg = arg.optional()?;
            }
            if arg.positional {
                positionals.push(arg);
            } else {
                flags.push(arg);
            }
        }
        positionals.extend(flags);
        Ok(positionals)
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> Task {
        Task::new(name, |_, _| Ok(None))
    }

    #[test]
    fn args_without_defaults_are_positional() {
        let task = noop("deploy").with_args(vec![
            ArgDecl::new("host"),
            ArgDecl::new("port").with_default(ArgValue::Int(22)),
        ]);
        let args = task.get_arguments().unwrap();
        assert!(args[0].positional);
        assert_eq!(args[0].name(), "host");
        assert!(!args[1].positional);
    }

    #[test]
    fn explicit_positional_overrides_derivation() {
        let task = noop("t").with_args(vec![
            ArgDecl::new("a").positional(false),
            ArgDecl::new("b").with_default(ArgValue::Bool(false)).positional(true),
        ]);
        let args = task.get_arguments().unwrap();
        // Positionals come first regardless of declaration order.
        assert_eq!(args[0].name(), "b");
        assert!(args[0].positional);
        assert!(!args[1].positional);
    }

    #[test]
    fn auto_shortflags_skip_taken_characters() {
        let task = noop("t").with_args(vec![
            ArgDecl::new("force").with_default(ArgValue::Bool(false)),
            ArgDecl::new("format").with_default(ArgValue::Str("".into())),
        ]);
        let args = task.get_arguments().unwrap();
        assert_eq!(args[0].names(), &["force".to_string(), "f".to_string()]);
        // "f" taken, "o" free ("format"'s own name occupies only "format").
        assert_eq!(args[1].names(), &["format".to_string(), "o".to_string()]);
    }

    #[test]
    fn shortflags_can_be_disabled() {
        let task = noop("t")
            .no_auto_shortflags()
            .with_args(vec![ArgDecl::new("force").with_default(ArgValue::Bool(false))]);
        let args = task.get_arguments().unwrap();
        assert_eq!(args[0].names(), &["force".to_string()]);
    }

    #[test]
    fn underscored_names_become_dashed_flags_with_attr_name() {
        let task = noop("t").with_args(vec![
            ArgDecl::new("dry_run").with_default(ArgValue::Bool(false)),
        ]);
        let args = task.get_arguments().unwrap();
        assert_eq!(args[0].name(), "dry-run");
        assert_eq!(args[0].attr_name.as_deref(), Some("dry_run"));
    }

    #[test]
    fn kinds_derive_from_defaults_and_markers() {
        let task = noop("t").with_args(vec![
            ArgDecl::new("quiet").with_default(ArgValue::Bool(false)),
            ArgDecl::new("count").with_default(ArgValue::Int(1)),
            ArgDecl::new("path").iterable(),
            ArgDecl::new("verbose").with_default(ArgValue::Int(0)).incrementable(),
            ArgDecl::new("maybe").with_default(ArgValue::Bool(true)).optional(),
        ]);
        let args = task.get_arguments().unwrap();
        let kind_of = |name: &str| {
            args.iter()
                .find(|a| a.name() == name)
                .map(|a| a.kind)
                .unwrap()
        };
        assert_eq!(kind_of("quiet"), Kind::Bool);
        assert_eq!(kind_of("count"), Kind::Int);
        assert_eq!(kind_of("path"), Kind::List);
        assert_eq!(kind_of("verbose"), Kind::Int);
        // Optional + bool default degrades to string so a value can follow.
        assert_eq!(kind_of("maybe"), Kind::Str);
    }

    #[test]
    fn call_counter_increments() {
        let task = noop("t");
        let mut ctx = Context::default();
        assert_eq!(task.times_called(), 0);
        task.call(&mut ctx, &TaskArgs::new()).unwrap();
        task.call(&mut ctx, &TaskArgs::new()).unwrap();
        assert_eq!(task.times_called(), 2);
    }

    #[test]
    fn summary_is_first_doc_line() {
        let task = noop("t").with_doc("Build the docs.\n\nLong text here.");
        assert_eq!(task.summary(), Some("Build the docs."));
    }
}
