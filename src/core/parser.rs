// src/core/parser.rs
//
// The command-line parser: a small state machine fed one token at a time.
// Tokens may name a context (task), a flag of the current context, a flag
// value, a positional value, or a flag of the initial (core) context; a
// pre-tokenization step splits `--foo=bar` and clustered short flags before
// dispatch, rolling back when the split would steal a pending flag value.

use crate::core::args::Kind;
use crate::core::parse_context::ParserContext;
use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub struct ParseError {
    pub message: String,
    /// Snapshot of the context being parsed when the error fired, if any.
    pub context: Option<Box<ParserContext>>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ParseError {
    fn bare(message: String) -> Self {
        Self {
            message,
            context: None,
        }
    }
}

fn is_flag(token: &str) -> bool {
    token.starts_with('-')
}

fn is_long_flag(token: &str) -> bool {
    token.starts_with("--")
}

/// The parse outcome: completed contexts in the order they were seen, the
/// post-`--` remainder, and (when unknown input is tolerated) the stored
/// leftover tokens.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub contexts: Vec<ParserContext>,
    pub remainder: String,
    pub unparsed: Vec<String>,
}

impl ParseResult {
    pub fn context_named(&self, name: &str) -> Option<&ParserContext> {
        self.contexts.iter().find(|c| c.name() == Some(name))
    }
}

#[derive(Debug)]
pub struct Parser {
    templates: Vec<ParserContext>,
    // Context name or alias -> index into templates.
    registry: IndexMap<String, usize>,
    initial: Option<ParserContext>,
    ignore_unknown: bool,
}

impl Parser {
    pub fn new(
        contexts: Vec<ParserContext>,
        initial: Option<ParserContext>,
        ignore_unknown: bool,
    ) -> Result<Self, ParseError> {
        let mut registry = IndexMap::new();
        for (index, context) in contexts.iter().enumerate() {
            let Some(name) = context.name() else {
                return Err(ParseError::bare(
                    "Non-initial contexts must have names.".to_string(),
                ));
            };
            for key in std::iter::once(name).chain(context.aliases().iter().map(String::as_str)) {
                if registry.contains_key(key) {
                    return Err(ParseError::bare(format!(
                        "A context named/aliased {:?} is already in this parser!",
                        key
                    )));
                }
                registry.insert(key.to_string(), index);
            }
        }
        Ok(Self {
            templates: contexts,
            registry,
            initial,
            ignore_unknown,
        })
    }

    /// Parse an argv-style token list (program name already stripped).
    pub fn parse_argv(&self, argv: &[String]) -> Result<ParseResult, ParseError> {
        let mut machine = ParseMachine::new(self);
        log::debug!("Starting argv: {:?}", argv);
        let ddash = argv.iter().position(|t| t == "--").unwrap_or(argv.len());
        let mut body: Vec<String> = argv[..ddash].to_vec();
        let remainder = argv[ddash..].iter().skip(1).cloned().collect::<Vec<_>>();
        let mut i = 0;
        while i < body.len() {
            let orig = body[i].clone();
            let mut token = orig.clone();
            let mut mutations: Vec<(usize, String)> = Vec::new();
            if is_flag(&token) && machine.result.unparsed.is_empty() {
                if let Some((head, value)) = token.split_once('=') {
                    log::debug!(
                        "Splitting x=y expr {:?} into tokens {:?} and {:?}",
                        orig,
                        head,
                        value
                    );
                    mutations.push((i + 1, value.to_string()));
                    token = head.to_string();
                } else if !is_long_flag(&token) && token.chars().count() > 2 {
                    // `-abc` is either `-a` with value "bc" or the cluster
                    // `-a -b -c`, depending on whether -a takes a value.
                    let mut chars = token.chars();
                    let head: String = chars.by_ref().take(2).collect();
                    let rest: String = chars.collect();
                    let have_flag = machine.state != State::Unknown
                        && machine.context_has_flag(&head);
                    if have_flag && machine.flag_takes_value(&head) {
                        log::debug!(
                            "{:?} is a flag for current context & takes a value, giving it {:?}",
                            head,
                            rest
                        );
                        mutations.push((i + 1, rest));
                    } else {
                        for c in rest.chars().rev() {
                            mutations.push((i + 1, format!("-{}", c)));
                        }
                    }
                    token = head;
                }
            }
            // When a flag is still waiting for its value, the split above
            // would steal that value; undo it unless the pending flag's
            // value is optional and the sub-token is itself a valid flag.
            if machine.waiting_for_flag_value() {
                let optional = machine.current_flag_optional();
                let subtoken_is_valid_flag = machine.context_has_flag(&token);
                if !(optional && subtoken_is_valid_flag) {
                    token = orig;
                    mutations.clear();
                }
            }
            for (index, value) in mutations {
                body.insert(index, value);
            }
            machine.handle(&token)?;
            i += 1;
        }
        machine.finish()?;
        let mut result = machine.into_result();
        result.remainder = remainder.join(" ");
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Context,
    Unknown,
    End,
}

/// Where the initial context currently lives, for late flag updates
/// (core flags given after a task name).
#[derive(Debug, Clone, Copy)]
enum InitialSlot {
    Absent,
    Current,
    Completed(usize),
}

struct ParseMachine<'p> {
    parser: &'p Parser,
    state: State,
    current: Option<ParserContext>,
    current_completed: bool,
    current_is_initial: bool,
    initial_slot: InitialSlot,
    // Index of the active flag within the current context.
    flag: Option<usize>,
    flag_got_value: bool,
    result: ParseResult,
}

impl<'p> ParseMachine<'p> {
    fn new(parser: &'p Parser) -> Self {
        let current = parser.initial.clone();
        let initial_slot = if current.is_some() {
            InitialSlot::Current
        } else {
            InitialSlot::Absent
        };
        Self {
            parser,
            state: State::Context,
            current_is_initial: current.is_some(),
            current,
            current_completed: false,
            initial_slot,
            flag: None,
            flag_got_value: false,
            result: ParseResult::default(),
        }
    }

    fn into_result(self) -> ParseResult {
        self.result
    }

    // --- INSPECTION (used by pre-tokenization) ---

    fn context_has_flag(&self, flag: &str) -> bool {
        self.current.as_ref().is_some_and(|c| c.has_flag(flag))
    }

    fn flag_takes_value(&self, flag: &str) -> bool {
        self.current
            .as_ref()
            .and_then(|c| c.flag_index(flag).map(|i| c.arg(i).takes_value()))
            .unwrap_or(false)
    }

    fn current_flag_optional(&self) -> bool {
        match (&self.current, self.flag) {
            (Some(context), Some(index)) => context.arg(index).optional,
            _ => false,
        }
    }

    /// Whether the active flag still expects a value token. List-kind flags
    /// accept one value per occurrence; other kinds only until first filled.
    fn waiting_for_flag_value(&self) -> bool {
        let (Some(context), Some(index)) = (&self.current, self.flag) else {
            return false;
        };
        let arg = context.arg(index);
        if !arg.takes_value() {
            return false;
        }
        if arg.kind == Kind::List {
            return !self.flag_got_value;
        }
        !context.slot(index).got_value()
    }

    // --- DISPATCH ---

    fn handle(&mut self, token: &str) -> Result<(), ParseError> {
        log::debug!("Handling token: {:?}", token);
        // Once input has gone unknown, everything after is stored verbatim.
        if self.state == State::Unknown {
            return self.see_unknown(token);
        }
        if self.context_has_flag(token) {
            log::debug!("Saw flag {:?}", token);
            self.switch_to_flag(token, false)
        } else if self
            .current
            .as_ref()
            .is_some_and(|c| c.has_inverse_flag(token))
        {
            log::debug!("Saw inverse flag {:?}", token);
            self.switch_to_flag(token, true)
        } else if self.waiting_for_flag_value() {
            self.see_value(token)
        } else if self
            .current
            .as_ref()
            .is_some_and(|c| c.needs_positional_arg())
        {
            // Positionals eat the token even when it happens to name a
            // valid context.
            self.see_positional_arg(token)
        } else if self.parser.registry.contains_key(token) {
            self.see_context(token)
        } else if self.initial_has_flag(token) {
            log::debug!("Saw (initial-context) flag {:?}", token);
            self.set_initial_flag(token)
        } else if self.parser.ignore_unknown {
            self.see_unknown(token)
        } else {
            Err(self.error(format!("No idea what {:?} is!", token)))
        }
    }

    fn initial_has_flag(&self, token: &str) -> bool {
        match self.initial_slot {
            InitialSlot::Absent => false,
            InitialSlot::Current => false, // covered by the current-context branch
            InitialSlot::Completed(index) => self.result.contexts[index].has_flag(token),
        }
    }

    /// A core flag seen while inside a task context: value-taking flags get
    /// the task's name as their value, others simply flip on.
    fn set_initial_flag(&mut self, token: &str) -> Result<(), ParseError> {
        let InitialSlot::Completed(index) = self.initial_slot else {
            return Ok(());
        };
        let context_name = self
            .current
            .as_ref()
            .and_then(|c| c.name())
            .unwrap_or_default()
            .to_string();
        let initial = &mut self.result.contexts[index];
        let Some(flag_index) = initial.flag_index(token) else {
            return Ok(());
        };
        let arg = initial.arg(flag_index).clone();
        if arg.takes_value() {
            initial
                .slot_mut(flag_index)
                .set_value(&arg, &context_name)
                .map_err(|e| ParseError::bare(e.to_string()))?;
        } else {
            initial.slot_mut(flag_index).set_bool(true);
        }
        Ok(())
    }

    // --- TRANSITIONS (each completes the active flag + context first) ---

    fn see_context(&mut self, name: &str) -> Result<(), ParseError> {
        self.complete_flag()?;
        self.complete_context()?;
        self.flush_current();
        let index = self.parser.registry[name];
        log::debug!("Moving to context {:?}", name);
        self.current = Some(self.parser.templates[index].clone());
        self.current_completed = false;
        self.current_is_initial = false;
        self.flag = None;
        self.flag_got_value = false;
        Ok(())
    }

    fn see_unknown(&mut self, token: &str) -> Result<(), ParseError> {
        self.complete_flag()?;
        self.complete_context()?;
        self.state = State::Unknown;
        log::debug!("Storing unknown token {:?}", token);
        self.result.unparsed.push(token.to_string());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        self.complete_flag()?;
        self.complete_context()?;
        self.flush_current();
        self.state = State::End;
        Ok(())
    }

    /// Validate the current context and mark it done. It stays current (and
    /// mutable) until a new context replaces it.
    fn complete_context(&mut self) -> Result<(), ParseError> {
        let Some(context) = &self.current else {
            return Ok(());
        };
        log::debug!("Wrapping up context {:?}", context.name());
        let missing = context.missing_positional_names();
        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(|n| format!("'{}'", n))
                .collect::<Vec<_>>()
                .join(", ");
            let message = format!(
                "'{}' did not receive required positional arguments: {}",
                context.name().unwrap_or(""),
                names
            );
            return Err(self.error(message));
        }
        self.current_completed = true;
        Ok(())
    }

    /// Move a completed current context into the result list.
    fn flush_current(&mut self) {
        if !self.current_completed {
            return;
        }
        if let Some(context) = self.current.take() {
            if self.current_is_initial {
                self.initial_slot = InitialSlot::Completed(self.result.contexts.len());
            }
            self.result.contexts.push(context);
        }
        self.current_completed = false;
    }

    fn complete_flag(&mut self) -> Result<(), ParseError> {
        let (Some(context), Some(index)) = (&mut self.current, self.flag) else {
            return Ok(());
        };
        let arg = context.arg(index).clone();
        if arg.takes_value() && !context.slot(index).got_value() {
            if !arg.optional {
                return Err(self.error(format!(
                    "Flag {:?} needed value and was not given one!",
                    crate::core::parse_context::to_flag(arg.name())
                )));
            }
            // Seen but never valued: optional flags degrade to plain bools.
            log::debug!(
                "Saw optional flag {:?} go by w/ no value; setting to True",
                arg.name()
            );
            context.slot_mut(index).set_bool(true);
        }
        Ok(())
    }

    /// Guard against ambiguity when the active flag takes an optional value:
    /// a following token that could be a positional or a context name has no
    /// single reading.
    fn check_ambiguity(&self, value: &str) -> Result<(), ParseError> {
        let (Some(context), Some(index)) = (&self.current, self.flag) else {
            return Ok(());
        };
        let arg = context.arg(index);
        if !arg.optional || context.slot(index).got_value() {
            return Ok(());
        }
        let ambiguous =
            context.needs_positional_arg() || self.parser.registry.contains_key(value);
        if ambiguous {
            return Err(self.error(format!(
                "{:?} is ambiguous when given after an optional-value flag",
                value
            )));
        }
        Ok(())
    }

    fn switch_to_flag(&mut self, token: &str, inverse: bool) -> Result<(), ParseError> {
        self.check_ambiguity(token)?;
        // Tie off any prior flag (it may have held an optional value).
        self.complete_flag()?;
        let Some(context) = &mut self.current else {
            return Ok(());
        };
        let index = if inverse {
            context.inverse_flag_index(token)
        } else {
            context.flag_index(token)
        };
        let Some(index) = index else {
            return Err(self.error(format!("No idea what {:?} is!", token)));
        };
        log::debug!("Moving to flag {:?}", context.arg(index).name());
        self.flag = Some(index);
        self.flag_got_value = false;
        if !context.arg(index).takes_value() {
            let value = !inverse;
            if context.arg(index).incrementable {
                let arg = context.arg(index).clone();
                context
                    .slot_mut(index)
                    .set_value(&arg, token)
                    .map_err(|e| ParseError::bare(e.to_string()))?;
            } else {
                context.slot_mut(index).set_bool(value);
            }
        }
        Ok(())
    }

    fn see_value(&mut self, value: &str) -> Result<(), ParseError> {
        self.check_ambiguity(value)?;
        let (Some(context), Some(index)) = (&mut self.current, self.flag) else {
            return Ok(());
        };
        let arg = context.arg(index).clone();
        if !arg.takes_value() {
            return Err(self.error(format!(
                "Flag {:?} doesn't take any value!",
                crate::core::parse_context::to_flag(arg.name())
            )));
        }
        log::debug!("Setting flag {:?} to value {:?}", arg.name(), value);
        let result = context.slot_mut(index).set_value(&arg, value);
        result.map_err(|e| self.error(e.to_string()))?;
        self.flag_got_value = true;
        Ok(())
    }

    fn see_positional_arg(&mut self, value: &str) -> Result<(), ParseError> {
        let Some(context) = &mut self.current else {
            return Ok(());
        };
        log::debug!("Context requires positional args, eating {:?}", value);
        if let Some(index) = context.missing_positional_indexes().first().copied() {
            let arg = context.arg(index).clone();
            let result = context.slot_mut(index).set_value(&arg, value);
            result.map_err(|e| self.error(e.to_string()))?;
        }
        Ok(())
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            context: self.current.clone().map(Box::new),
        }
    }
}

// MARK: --- UNIT TESTS ---
