// src/core/args.rs
//
// CLI argument model. `Argument` is an immutable definition; values parsed
// from the command line live in a separate `ArgSlot`, so a single set of
// definitions can back any number of parse runs without cloning.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ArgError {
    #[error("An argument must have at least one name")]
    NoNames,
    #[error("Argument '{name}' cannot be optional: it takes no value")]
    OptionalWithoutValue { name: String },
    #[error("Invalid {kind} value {value:?} for argument '{name}'")]
    Uncastable {
        name: String,
        value: String,
        kind: &'static str,
    },
}

/// The value type a flag casts its token to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Str,
    Int,
    Bool,
    List,
}

impl Kind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::List => "list",
        }
    }
}

/// A typed argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}

impl ArgValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// One argument/flag definition.
///
/// The first entry of `names` is the primary name; the rest are nicknames
/// (typically one-character shorthands).
#[derive(Debug, Clone)]
pub struct Argument {
    names: Vec<String>,
    pub kind: Kind,
    pub default: Option<ArgValue>,
    pub help: Option<String>,
    pub positional: bool,
    pub optional: bool,
    pub incrementable: bool,
    /// Identifier the task body reads this value under, when it differs
    /// from the (dashed) primary name.
    pub attr_name: Option<String>,
}

impl Argument {
    pub fn new(names: Vec<String>, kind: Kind) -> Result<Self, ArgError> {
        if names.is_empty() {
            return Err(ArgError::NoNames);
        }
        Ok(Self {
            names,
            kind,
            default: None,
            help: None,
            positional: false,
            optional: false,
            incrementable: false,
            attr_name: None,
        })
    }

    pub fn named(name: &str, kind: Kind) -> Self {
        Self::new(vec![name.to_string()], kind).expect("one name given")
    }

    pub fn with_default(mut self, default: ArgValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }

    pub fn positional(mut self) -> Self {
        self.positional = true;
        self
    }

    pub fn incrementable(mut self) -> Self {
        self.incrementable = true;
        self
    }

    /// Mark the flag's value as optional. Only meaningful for value-taking
    /// flags.
    pub fn optional(mut self) -> Result<Self, ArgError> {
        if !self.takes_value() {
            return Err(ArgError::OptionalWithoutValue {
                name: self.name().to_string(),
            });
        }
        self.optional = true;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.names[0]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn nicknames(&self) -> &[String] {
        &self.names[1..]
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Whether the flag consumes the next token as its value. Boolean and
    /// incrementable flags never do.
    pub fn takes_value(&self) -> bool {
        !(self.kind == Kind::Bool || self.incrementable)
    }
}

/// Mutable parse state for one argument.
#[derive(Debug, Clone, Default)]
pub struct ArgSlot {
    raw: Option<String>,
    value: Option<ArgValue>,
    got_value: bool,
}

impl ArgSlot {
    pub fn new(arg: &Argument) -> Self {
        Self {
            raw: None,
            // List-kind slots accumulate, so they start as an empty list.
            value: (arg.kind == Kind::List).then(|| ArgValue::List(Vec::new())),
            got_value: false,
        }
    }

    /// Whether a value was explicitly supplied on the command line.
    pub fn got_value(&self) -> bool {
        self.got_value
    }

    pub fn raw_value(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Store a token for this argument, casting per the definition's kind.
    /// Incrementable arguments bump their count and ignore the token; list
    /// arguments append.
    pub fn set_value(&mut self, arg: &Argument, token: &str) -> Result<(), ArgError> {
        self.raw = Some(token.to_string());
        self.got_value = true;
        if arg.incrementable {
            let current = self
                .value
                .as_ref()
                .or(arg.default.as_ref())
                .and_then(ArgValue::as_int)
                .unwrap_or(0);
            self.value = Some(ArgValue::Int(current + 1));
            return Ok(());
        }
        match arg.kind {
            Kind::List => {
                if let Some(ArgValue::List(items)) = &mut self.value {
                    items.push(token.to_string());
                } else {
                    self.value = Some(ArgValue::List(vec![token.to_string()]));
                }
            }
            Kind::Str => self.value = Some(ArgValue::Str(token.to_string())),
            Kind::Int => {
                let parsed = token.parse::<i64>().map_err(|_| ArgError::Uncastable {
                    name: arg.name().to_string(),
                    value: token.to_string(),
                    kind: arg.kind.label(),
                })?;
                self.value = Some(ArgValue::Int(parsed));
            }
            Kind::Bool => {
                self.value = Some(ArgValue::Bool(!(token.is_empty() || token == "0")));
            }
        }
        Ok(())
    }

    /// Store a literal boolean, skipping the cast. Used for no-value flags
    /// and for optional flags given without a value.
    pub fn set_bool(&mut self, flag: bool) {
        self.value = Some(ArgValue::Bool(flag));
        self.got_value = true;
    }

    /// The effective value: explicitly parsed, or the definition's default.
    pub fn value<'a>(&'a self, arg: &'a Argument) -> Option<&'a ArgValue> {
        self.value.as_ref().or(arg.default.as_ref())
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_requires_a_name() {
        assert_eq!(
            Argument::new(vec![], Kind::Str).unwrap_err(),
            ArgError::NoNames
        );
        let arg = Argument::new(vec!["verbose".into(), "v".into()], Kind::Bool).unwrap();
        assert_eq!(arg.name(), "verbose");
        assert_eq!(arg.nicknames(), &["v".to_string()]);
        assert!(arg.answers_to("v"));
        assert!(!arg.answers_to("x"));
    }

    #[test]
    fn bool_and_incrementable_take_no_value() {
        assert!(!Argument::named("quiet", Kind::Bool).takes_value());
        assert!(!Argument::named("verbose", Kind::Int).incrementable().takes_value());
        assert!(Argument::named("name", Kind::Str).takes_value());
    }

    #[test]
    fn optional_requires_a_value_taking_flag() {
        let err = Argument::named("quiet", Kind::Bool).optional().unwrap_err();
        assert!(matches!(err, ArgError::OptionalWithoutValue { .. }));
        assert!(Argument::named("help", Kind::Str).optional().is_ok());
    }

    #[test]
    fn str_round_trip() {
        let arg = Argument::named("name", Kind::Str);
        let mut slot = ArgSlot::new(&arg);
        assert!(!slot.got_value());
        slot.set_value(&arg, "world").unwrap();
        assert!(slot.got_value());
        assert_eq!(slot.raw_value(), Some("world"));
        assert_eq!(slot.value(&arg), Some(&ArgValue::Str("world".into())));
    }

    #[test]
    fn int_casts_or_errors() {
        let arg = Argument::named("count", Kind::Int);
        let mut slot = ArgSlot::new(&arg);
        slot.set_value(&arg, "42").unwrap();
        assert_eq!(slot.value(&arg), Some(&ArgValue::Int(42)));
        let err = slot.set_value(&arg, "forty").unwrap_err();
        assert!(matches!(err, ArgError::Uncastable { kind: "int", .. }));
    }

    #[test]
    fn list_starts_empty_and_appends() {
        let arg = Argument::named("path", Kind::List);
        let mut slot = ArgSlot::new(&arg);
        assert_eq!(slot.value(&arg), Some(&ArgValue::List(vec![])));
        slot.set_value(&arg, "a").unwrap();
        slot.set_value(&arg, "b").unwrap();
        assert_eq!(
            slot.value(&arg),
            Some(&ArgValue::List(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn incrementable_counts_occurrences_and_ignores_tokens() {
        let arg = Argument::named("verbose", Kind::Int)
            .with_default(ArgValue::Int(0))
            .incrementable();
        let mut slot = ArgSlot::new(&arg);
        slot.set_value(&arg, "whatever").unwrap();
        slot.set_value(&arg, "ignored").unwrap();
        assert_eq!(slot.value(&arg), Some(&ArgValue::Int(2)));
    }

    #[test]
    fn value_falls_back_to_default() {
        let arg = Argument::named("shell", Kind::Str).with_default(ArgValue::Str("/bin/sh".into()));
        let slot = ArgSlot::new(&arg);
        assert!(!slot.got_value());
        assert_eq!(slot.value(&arg), Some(&ArgValue::Str("/bin/sh".into())));
    }

    #[test]
    fn set_bool_skips_the_cast() {
        let arg = Argument::named("help", Kind::Str).optional().unwrap();
        let mut slot = ArgSlot::new(&arg);
        slot.set_bool(true);
        assert_eq!(slot.value(&arg), Some(&ArgValue::Bool(true)));
        assert!(slot.got_value());
    }
}
