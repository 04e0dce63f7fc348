// src/cli/program.rs
//
// The command-line entry point. A Program owns (or loads) a task namespace,
// parses core options and task invocations out of argv, assembles the
// layered configuration, and hands the resulting call list to the executor.
// Controlled exits (version, listings, parse errors, bad command exits) are
// modeled as values rather than panics so the binary decides the process
// exit code in one place.

use crate::constants::DEFAULT_COLLECTION_NAME;
use crate::core::args::{ArgError, ArgValue, Argument, Kind};
use crate::core::collection::Collection;
use crate::core::config::{Config, ValueMap};
use crate::core::executor::{Call, Executor};
use crate::core::parse_context::ParserContext;
use crate::core::parser::{ParseError, Parser};
use crate::models::ConfigValue;
use crate::system::context::ContextError;
use crate::system::runner::{Hide, RunError};
use crate::CancellationToken;
use anyhow::anyhow;
use dialoguer::Password;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

/// A request to end the process with a specific exit code, optionally
/// printing a message to stderr first.
#[derive(Debug)]
pub struct ExitRequest {
    pub code: i32,
    pub message: Option<String>,
}

#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("{}", .0.message.as_deref().unwrap_or("exit requested"))]
    Exit(ExitRequest),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn parse_exit(error: ParseError) -> ProgramError {
    ProgramError::Exit(ExitRequest {
        code: 1,
        message: Some(error.to_string()),
    })
}

fn to_err<E>(error: E) -> ProgramError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProgramError::Other(anyhow::Error::new(error))
}

/// Maps task-execution failures to exit requests: a bad command exit code
/// becomes the process exit code, authentication failures exit 1.
fn execution_exit(error: anyhow::Error) -> ProgramError {
    for cause in error.chain() {
        if let Some(run_error) = cause.downcast_ref::<RunError>() {
            if let RunError::UnexpectedExit(result) = run_error {
                return ProgramError::Exit(ExitRequest {
                    code: result.exited.unwrap_or(1),
                    message: Some(run_error.to_string()),
                });
            }
        }
        if let Some(context_error) = cause.downcast_ref::<ContextError>() {
            if matches!(context_error, ContextError::AuthFailure { .. }) {
                return ProgramError::Exit(ExitRequest {
                    code: 1,
                    message: Some(context_error.to_string()),
                });
            }
        }
    }
    ProgramError::Other(error)
}

/// Supplies a namespace at runtime for programs that don't bundle one.
pub trait CollectionLoader {
    fn load(&self, name: &str, search_root: Option<&Path>) -> anyhow::Result<Collection>;
}

pub struct Program {
    pub name: String,
    pub binary: String,
    pub version: String,
    namespace: Option<Collection>,
    loader: Option<Box<dyn CollectionLoader>>,
}

impl Program {
    pub fn new(name: &str, binary: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            binary: binary.to_string(),
            version: version.to_string(),
            namespace: None,
            loader: None,
        }
    }

    /// Bundle a fixed namespace; disables the collection/search-root options.
    pub fn with_namespace(mut self, namespace: Collection) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_loader(mut self, loader: Box<dyn CollectionLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Run with a full argv (program name in slot 0, as `std::env::args`
    /// yields it).
    pub fn run(&self, argv: &[String]) -> Result<(), ProgramError> {
        let tokens: Vec<String> = argv.iter().skip(1).cloned().collect();
        self.run_tokens(&tokens)
    }

    fn run_tokens(&self, tokens: &[String]) -> Result<(), ProgramError> {
        log::debug!("argv given to program: {:?}", tokens);

        // First pass: core options only, everything else stored as unparsed.
        let core_parser =
            Parser::new(Vec::new(), Some(self.initial_context()?), true).map_err(parse_exit)?;
        let core = core_parser.parse_argv(tokens).map_err(parse_exit)?;
        let core_context = &core.contexts[0];

        if given_bool(core_context, "version") {
            println!("{} {}", self.name, self.version);
            return Ok(());
        }

        let mut config = Config::new();
        config.load_base_conf_files().map_err(to_err)?;
        let overrides = self.config_overrides(core_context)?;
        config.load_overrides(overrides).map_err(to_err)?;
        if let Some(path) = given_str(core_context, "config") {
            config.set_runtime_path(Some(PathBuf::from(path)));
        }
        config.load_runtime().map_err(to_err)?;

        let collection = self.load_namespace(&config)?;
        if let Some(directory) = collection.loaded_from.clone() {
            config.set_project_location(Some(&directory));
            config.load_project().map_err(to_err)?;
        }
        config.load_shell_env().map_err(to_err)?;

        // Second pass: the task grammar, fed the leftovers of the first.
        let contexts = collection.to_contexts().map_err(to_err)?;
        let task_parser =
            Parser::new(contexts, Some(self.initial_context()?), false).map_err(parse_exit)?;
        let parsed = task_parser.parse_argv(&core.unparsed).map_err(parse_exit)?;
        let via_tasks = &parsed.contexts[0];

        // Core flags may be given before or after task names; later ones win.
        let lookup = |name: &str| -> Option<ArgValue> {
            given_value(via_tasks, name)
                .or_else(|| given_value(core_context, name))
                .or_else(|| core_context.value_of(name))
                .cloned()
        };

        if let Some(value) = lookup("list") {
            let scope = value.as_str().map(str::to_string);
            let format = lookup("list-format")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "flat".to_string());
            let depth = lookup("list-depth").and_then(|v| v.as_int()).unwrap_or(0);
            let listing = self.render_list(&collection, scope.as_deref(), &format, depth)?;
            println!("{}", listing);
            return Ok(());
        }

        if let Some(value) = lookup("help") {
            let text = match value {
                ArgValue::Str(task_name) => self.render_task_help(&collection, &task_name)?,
                _ => self.render_core_help(&collection)?,
            };
            println!("{}", text);
            return Ok(());
        }

        let mut calls: Vec<Call> = parsed.contexts[1..]
            .iter()
            .map(Call::from_parser_context)
            .collect();
        if calls.is_empty() {
            if collection.default.is_some() {
                calls.push(Call::new(""));
            } else {
                println!("{}", self.render_core_help(&collection)?);
                return Ok(());
            }
        }

        let cancellation: CancellationToken = Arc::new(AtomicBool::new(false));
        Executor::new(&collection, &config, cancellation)
            .execute(&calls)
            .map_err(execution_exit)
    }

    // --- SETUP ---

    fn initial_context(&self) -> anyhow::Result<ParserContext> {
        let mut args = core_args()?;
        if self.namespace.is_none() {
            args.extend(task_runner_args()?);
        }
        Ok(ParserContext::new(None, Vec::new()).with_args(args)?)
    }

    fn load_namespace(&self, config: &Config) -> Result<Collection, ProgramError> {
        if let Some(namespace) = &self.namespace {
            return Ok(namespace.clone());
        }
        let loader = self.loader.as_ref().ok_or_else(|| {
            ProgramError::Other(anyhow!(
                "No task namespace bundled and no collection loader installed"
            ))
        })?;
        let name = config
            .get_str("tasks.collection_name")
            .unwrap_or(DEFAULT_COLLECTION_NAME)
            .to_string();
        let search_root = config.get_str("tasks.search_root").map(PathBuf::from);
        loader
            .load(&name, search_root.as_deref())
            .map_err(|error| {
                ProgramError::Exit(ExitRequest {
                    code: 1,
                    message: Some(error.to_string()),
                })
            })
    }

    /// Config override layer derived from core flags.
    fn config_overrides(&self, core: &ParserContext) -> Result<ValueMap, ProgramError> {
        let mut run = HashMap::new();
        if given_bool(core, "echo") {
            run.insert("echo".to_string(), ConfigValue::Bool(true));
        }
        if given_bool(core, "warn-only") {
            run.insert("warn".to_string(), ConfigValue::Bool(true));
        }
        if given_bool(core, "pty") {
            run.insert("pty".to_string(), ConfigValue::Bool(true));
        }
        if let Some(name) = given_str(core, "hide") {
            // Validate eagerly so a typo fails the run up front.
            Hide::from_name(name).map_err(|error| {
                ProgramError::Exit(ExitRequest {
                    code: 1,
                    message: Some(error.to_string()),
                })
            })?;
            run.insert("hide".to_string(), ConfigValue::from(name));
        }

        let mut tasks = HashMap::new();
        if given_bool(core, "no-dedupe") {
            tasks.insert("dedupe".to_string(), ConfigValue::Bool(false));
        }
        if let Some(name) = given_str(core, "collection") {
            tasks.insert("collection_name".to_string(), ConfigValue::from(name));
        }
        if let Some(root) = given_str(core, "search-root") {
            tasks.insert("search_root".to_string(), ConfigValue::from(root));
        }

        let mut sudo = HashMap::new();
        if given_bool(core, "prompt-for-sudo-password") {
            let password = Password::new()
                .with_prompt("Desired 'sudo.password' config value")
                .interact()
                .map_err(|error| ProgramError::Other(anyhow::Error::new(error)))?;
            sudo.insert("password".to_string(), ConfigValue::from(password));
        }

        let mut overrides = ValueMap::new();
        if !run.is_empty() {
            overrides.insert("run".to_string(), ConfigValue::Map(run));
        }
        if !tasks.is_empty() {
            overrides.insert("tasks".to_string(), ConfigValue::Map(tasks));
        }
        if !sudo.is_empty() {
            overrides.insert("sudo".to_string(), ConfigValue::Map(sudo));
        }
        Ok(overrides)
    }

    // --- RENDERING ---

    fn render_list(
        &self,
        root: &Collection,
        scope: Option<&str>,
        format: &str,
        depth: i64,
    ) -> Result<String, ProgramError> {
        let (collection, prefix) = match scope {
            None => (root, String::new()),
            Some(path) => {
                let path = root.transform(path);
                let collection = root.subcollection_from_path(&path).ok_or_else(|| {
                    ProgramError::Exit(ExitRequest {
                        code: 1,
                        message: Some(format!("Sub-collection {:?} not found!", path)),
                    })
                })?;
                (collection, format!("{}.", path))
            }
        };
        match format {
            "flat" => Ok(render_flat(collection, &prefix, depth)),
            "nested" => Ok(render_nested(collection, depth)),
            "json" => serde_json::to_string(&collection.serialized()).map_err(to_err),
            other => Err(ProgramError::Exit(ExitRequest {
                code: 1,
                message: Some(format!(
                    "Invalid list format {:?}; please use one of: flat, nested, json",
                    other
                )),
            })),
        }
    }

    fn render_task_help(
        &self,
        collection: &Collection,
        name: &str,
    ) -> Result<String, ProgramError> {
        let task = collection.task(name).map_err(|_| {
            ProgramError::Exit(ExitRequest {
                code: 1,
                message: Some(format!("No idea what {:?} is!", name)),
            })
        })?;
        let args = task.get_arguments().map_err(to_err)?;
        let context = ParserContext::new(Some(name), Vec::new())
            .with_args(args)
            .map_err(to_err)?;
        let tuples = context.help_tuples();
        let options_hint = if tuples.is_empty() { "" } else { "[--options] " };
        let mut out = format!(
            "Usage: {} [--core-opts] {} {}[other tasks here ...]\n\nDocstring:\n",
            self.binary, name, options_hint
        );
        match &task.doc {
            Some(doc) => {
                for line in doc.lines() {
                    out.push_str("  ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            None => out.push_str("  none\n"),
        }
        out.push_str("\nOptions:\n");
        if tuples.is_empty() {
            out.push_str("  none\n");
        } else {
            out.push_str(&columns(&indent_pairs(&tuples)));
            out.push('\n');
        }
        Ok(out)
    }

    fn render_core_help(&self, collection: &Collection) -> Result<String, ProgramError> {
        let initial = self.initial_context()?;
        let tuples = initial.help_tuples();
        let mut out = format!(
            "Usage: {} [--core-opts] task1 [--task1-opts] ... taskN [--taskN-opts]\n\n\
             Core options:\n\n{}\n",
            self.binary,
            columns(&indent_pairs(&tuples))
        );
        if !collection.is_empty() {
            out.push('\n');
            out.push_str(&render_flat(collection, "", 0));
        }
        Ok(out)
    }
}

// --- CORE ARGUMENT DEFINITIONS ---

fn pair(long: &str, short: &str, kind: Kind) -> Result<Argument, ArgError> {
    Argument::new(vec![long.to_string(), short.to_string()], kind)
}

fn core_args() -> Result<Vec<Argument>, ArgError> {
    Ok(vec![
        pair("debug", "d", Kind::Bool)?.with_help("Enable debug output."),
        Argument::named("prompt-for-sudo-password", Kind::Bool)
            .with_help("Prompt at start of session for the sudo.password config value."),
        pair("echo", "e", Kind::Bool)?.with_help("Echo executed commands before running."),
        pair("config", "f", Kind::Str)?.with_help("Runtime configuration file to use."),
        pair("help", "h", Kind::Str)?
            .optional()?
            .with_help("Show core or per-task help and exit."),
        Argument::named("hide", Kind::Str)
            .with_help("Set default value of run()'s 'hide' kwarg."),
        pair("list", "l", Kind::Str)?
            .optional()?
            .with_help("List available tasks, optionally limited to a namespace."),
        pair("list-depth", "D", Kind::Int)?
            .with_default(ArgValue::Int(0))
            .with_help("When listing tasks, only show the first INT levels."),
        pair("list-format", "F", Kind::Str)?
            .with_default(ArgValue::Str("flat".to_string()))
            .with_help(
                "Change the display format used when listing tasks. \
                 Should be one of: flat (default), nested, json.",
            ),
        pair("pty", "p", Kind::Bool)?.with_help("Use a pty when executing shell commands."),
        pair("version", "V", Kind::Bool)?.with_help("Show version and exit."),
        pair("warn-only", "w", Kind::Bool)?
            .with_help("Warn, instead of failing, when shell commands fail."),
    ])
}

/// Extra core options for programs that load their namespace at runtime.
fn task_runner_args() -> Result<Vec<Argument>, ArgError> {
    Ok(vec![
        pair("collection", "c", Kind::Str)?.with_help("Specify collection name to load."),
        Argument::named("no-dedupe", Kind::Bool).with_help("Disable task deduplication."),
        pair("search-root", "r", Kind::Str)?
            .with_help("Change root directory used for finding task collections."),
    ])
}

// --- CONTEXT VALUE HELPERS ---

/// The value of an argument only if it was explicitly given on the command
/// line (defaults don't count).
fn given_value<'a>(context: &'a ParserContext, name: &str) -> Option<&'a ArgValue> {
    context
        .args()
        .find(|(arg, slot)| arg.answers_to(name) && slot.got_value())
        .and_then(|(arg, slot)| slot.value(arg))
}

fn given_bool(context: &ParserContext, name: &str) -> bool {
    given_value(context, name).and_then(ArgValue::as_bool) == Some(true)
}

fn given_str<'a>(context: &'a ParserContext, name: &str) -> Option<&'a str> {
    given_value(context, name).and_then(ArgValue::as_str)
}

// --- LISTING RENDERERS ---

/// Two-column layout with the help text aligned past the longest spec.
fn columns(pairs: &[(String, String)]) -> String {
    let width = pairs
        .iter()
        .map(|(spec, _)| spec.chars().count())
        .max()
        .unwrap_or(0);
    pairs
        .iter()
        .map(|(spec, help)| {
            if help.is_empty() {
                spec.clone()
            } else {
                format!("{:<width$}   {}", spec, help, width = width)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent_pairs(pairs: &[(String, String)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(spec, help)| (format!("  {}", spec), help.clone()))
        .collect()
}

fn render_flat(collection: &Collection, prefix: &str, depth: i64) -> String {
    let mut pairs = Vec::new();
    for (name, aliases) in collection.task_names() {
        if depth > 0 && name.matches('.').count() as i64 >= depth {
            continue;
        }
        let mut display = format!("  {}{}", prefix, name);
        if collection.default.as_deref() == Some(name.as_str()) {
            display.push('*');
        }
        if !aliases.is_empty() {
            let rendered: Vec<String> = aliases
                .iter()
                .map(|alias| format!("{}{}", prefix, alias))
                .collect();
            display.push_str(&format!(" ({})", rendered.join(", ")));
        }
        let help = collection
            .task(&name)
            .ok()
            .and_then(|task| task.summary().map(str::to_string))
            .unwrap_or_default();
        pairs.push((display, help));
    }
    pairs.sort();
    format!("Available tasks:\n\n{}\n", columns(&pairs))
}

fn render_nested(collection: &Collection, depth: i64) -> String {
    let mut pairs = Vec::new();
    nested_pairs(collection, 1, depth, &mut pairs);
    format!("Available tasks:\n\n{}\n", columns(&pairs))
}

fn nested_pairs(
    collection: &Collection,
    indent: usize,
    depth: i64,
    out: &mut Vec<(String, String)>,
) {
    let pad = "  ".repeat(indent);
    let mut tasks: Vec<_> = collection.tasks().collect();
    tasks.sort_by(|a, b| a.0.cmp(b.0));
    for (name, task) in tasks {
        let mut display = format!("{}{}", pad, name);
        if collection.default.as_deref() == Some(name.as_str()) {
            display.push('*');
        }
        out.push((display, task.summary().unwrap_or_default().to_string()));
    }
    let mut subs: Vec<_> = collection.collections().collect();
    subs.sort_by(|a, b| a.0.cmp(b.0));
    for (name, sub) in subs {
        out.push((
            format!("{}{}:", pad, name),
            sub.summary().unwrap_or_default().to_string(),
        ));
        if depth == 0 || (indent as i64) < depth {
            nested_pairs(sub, indent + 1, depth, out);
        }
    }
}

// MARK: --- UNIT TESTS ---
