// src/core/parse_context.rs
//
// A parsing context: the set of flags and positionals one command-line
// "segment" (core program options, or a single task) understands. Argument
// definitions and their mutable parse slots live side by side, indexed by
// position, so flag spellings and name lookups all resolve to indexes.

use crate::core::args::{ArgSlot, ArgValue, Argument, Kind};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ContextError {
    #[error("Tried to add an argument named {name:?} but one already exists!")]
    DuplicateArgument { name: String },
}

/// Replace interior underscores with dashes; leading/trailing underscores
/// are stripped rather than translated.
pub fn translate_underscores(name: &str) -> String {
    name.trim_matches('_').replace('_', "-")
}

/// Render a name as its CLI flag spelling: `--name`, or `-n` for
/// single-character names.
pub fn to_flag(name: &str) -> String {
    let name = translate_underscores(name);
    if name.chars().count() == 1 {
        format!("-{}", name)
    } else {
        format!("--{}", name)
    }
}

fn swapcase(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_uppercase() {
                c.to_lowercase().next().unwrap_or(c)
            } else if c.is_lowercase() {
                c.to_uppercase().next().unwrap_or(c)
            } else {
                c
            }
        })
        .collect()
}

/// The name an argument is sorted under in help output: its first long name,
/// or failing that its first short name.
fn sort_candidate(arg: &Argument) -> &str {
    let mut longs: Vec<&str> = Vec::new();
    let mut shorts: Vec<&str> = Vec::new();
    for name in arg.names() {
        if name.chars().count() == 1 {
            shorts.push(name);
        } else {
            longs.push(name);
        }
    }
    let pool = if longs.is_empty() { shorts } else { longs };
    pool.into_iter().min().unwrap_or("")
}

/// Composite flag sort: long flags before short, then case-insensitive
/// alphabetical, with lowercase winning ties against uppercase.
fn compare_flags(a: &Argument, b: &Argument) -> Ordering {
    let (ca, cb) = (sort_candidate(a), sort_candidate(b));
    let short = |s: &str| (s.chars().count() == 1) as u8;
    short(ca)
        .cmp(&short(cb))
        .then_with(|| ca.to_lowercase().cmp(&cb.to_lowercase()))
        .then_with(|| swapcase(ca).cmp(&swapcase(cb)))
}

#[derive(Debug, Clone, Default)]
pub struct ParserContext {
    name: Option<String>,
    aliases: Vec<String>,
    args: Vec<Argument>,
    slots: Vec<ArgSlot>,
    // Raw argument name (and attr_name) -> index.
    by_name: IndexMap<String, usize>,
    // Flag spelling ("--foo", "-f") -> index.
    flags: IndexMap<String, usize>,
    // "--no-foo" -> "--foo" for bools defaulting to true.
    inverse_flags: HashMap<String, String>,
    positionals: Vec<usize>,
}

impl ParserContext {
    pub fn new(name: Option<&str>, aliases: Vec<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            aliases,
            ..Default::default()
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(Some(name), Vec::new())
    }

    pub fn with_args(mut self, args: Vec<Argument>) -> Result<Self, ContextError> {
        for arg in args {
            self.add_arg(arg)?;
        }
        Ok(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// The context's name plus all aliases.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.name.as_deref().into_iter().collect();
        names.extend(self.aliases.iter().map(String::as_str));
        names
    }

    pub fn add_arg(&mut self, arg: Argument) -> Result<(), ContextError> {
        for name in arg.names() {
            if self.by_name.contains_key(name) {
                return Err(ContextError::DuplicateArgument { name: name.clone() });
            }
        }
        let index = self.args.len();
        for name in arg.names() {
            self.by_name.insert(name.clone(), index);
            self.flags.insert(to_flag(name), index);
        }
        if let Some(attr) = &arg.attr_name {
            if attr != arg.name() {
                self.by_name.insert(attr.clone(), index);
            }
        }
        // True-default bools grow a --no-X inverse spelling.
        if arg.kind == Kind::Bool && arg.default == Some(ArgValue::Bool(true)) {
            let inverse = to_flag(&format!("no-{}", arg.name()));
            self.inverse_flags.insert(inverse, to_flag(arg.name()));
        }
        if arg.positional {
            self.positionals.push(index);
        }
        self.slots.push(ArgSlot::new(&arg));
        self.args.push(arg);
        Ok(())
    }

    // --- LOOKUPS ---

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains_key(flag)
    }

    pub fn has_inverse_flag(&self, flag: &str) -> bool {
        self.inverse_flags.contains_key(flag)
    }

    pub fn flag_index(&self, flag: &str) -> Option<usize> {
        self.flags.get(flag).copied()
    }

    /// Resolve an inverse spelling to the index of the flag it negates.
    pub fn inverse_flag_index(&self, flag: &str) -> Option<usize> {
        self.inverse_flags
            .get(flag)
            .and_then(|original| self.flag_index(original))
    }

    pub fn arg(&self, index: usize) -> &Argument {
        &self.args[index]
    }

    pub fn slot(&self, index: usize) -> &ArgSlot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut ArgSlot {
        &mut self.slots[index]
    }

    pub fn args(&self) -> impl Iterator<Item = (&Argument, &ArgSlot)> {
        self.args.iter().zip(self.slots.iter())
    }

    /// Look up the effective value of an argument by any of its names.
    pub fn value_of(&self, name: &str) -> Option<&ArgValue> {
        let index = *self.by_name.get(name)?;
        self.slots[index].value(&self.args[index])
    }

    pub fn arg_named(&self, name: &str) -> Option<&Argument> {
        self.by_name.get(name).map(|&i| &self.args[i])
    }

    // --- POSITIONALS ---

    /// Positional args not yet given a value (in declaration order).
    /// Positionals carrying defaults count as filled.
    pub fn missing_positional_indexes(&self) -> Vec<usize> {
        self.positionals
            .iter()
            .copied()
            .filter(|&i| self.slots[i].value(&self.args[i]).is_none())
            .collect()
    }

    pub fn missing_positional_names(&self) -> Vec<&str> {
        self.missing_positional_indexes()
            .into_iter()
            .map(|i| self.args[i].name())
            .collect()
    }

    pub fn needs_positional_arg(&self) -> bool {
        !self.missing_positional_indexes().is_empty()
    }

    // --- HELP / LISTING SUPPORT ---

    fn sorted_arg_indexes(&self) -> Vec<usize> {
        let mut unique: Vec<usize> = (0..self.args.len()).collect();
        unique.sort_by(|&a, &b| compare_flags(&self.args[a], &self.args[b]));
        unique
    }

    /// All flag spellings, sorted per the composite order, inverse flags
    /// last. Used for lookahead validity checks and help.
    pub fn flag_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for index in self.sorted_arg_indexes() {
            for name in self.args[index].names() {
                names.push(to_flag(name));
            }
        }
        let mut inverses: Vec<String> = self.inverse_flags.keys().cloned().collect();
        inverses.sort();
        names.extend(inverses);
        names
    }

    /// `(flag spec, help text)` pairs for all arguments, sorted.
    pub fn help_tuples(&self) -> Vec<(String, String)> {
        self.sorted_arg_indexes()
            .into_iter()
            .map(|index| self.help_for(index))
            .collect()
    }

    fn help_for(&self, index: usize) -> (String, String) {
        let arg = &self.args[index];
        let value_label = match arg.kind {
            Kind::Str => Some("STRING"),
            Kind::Int if !arg.incrementable => Some("INT"),
            _ => None,
        };
        let mut rendered: Vec<String> = Vec::new();
        for name in arg.names() {
            let flag = to_flag(name);
            let spec = match value_label {
                Some(label) => {
                    if name.chars().count() == 1 {
                        let value = if arg.optional {
                            format!("[{}]", label)
                        } else {
                            label.to_string()
                        };
                        format!("{} {}", flag, value)
                    } else if arg.optional {
                        format!("{}[={}]", flag, label)
                    } else {
                        format!("{}={}", flag, label)
                    }
                }
                None => {
                    if self.inverse_flags.values().any(|v| v == &flag) {
                        format!("--[no-]{}", &flag[2..])
                    } else {
                        flag
                    }
                }
            };
            rendered.push(spec);
        }
        rendered.sort_by_key(|s| s.len());
        (rendered.join(", "), arg.help.clone().unwrap_or_default())
    }
}

// MARK: --- UNIT TESTS ---
