// src/system/watchers.rs
//
// Stream watchers scan a subprocess' accumulated output and produce
// responses to feed back into its stdin. Each watcher keeps a scan index so
// every region of the stream is examined exactly once across submissions.

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum WatcherError {
    #[error("Auto-response to r\"{pattern}\" failed with {sentinel:?}!")]
    ResponseNotAccepted { pattern: String, sentinel: String },
    #[error("Invalid watcher pattern: {0}")]
    BadPattern(String),
}

/// Observes a growing output stream and yields responses to write to the
/// subprocess.
pub trait StreamWatcher: Send {
    /// Inspect the accumulated `stream` (the whole buffer so far, not just
    /// the newest chunk) and return any responses it warrants.
    fn submit(&mut self, stream: &str) -> Result<Vec<String>, WatcherError>;
}

/// Emits a fixed response every time a regex pattern appears in the stream.
pub struct Responder {
    pattern: Regex,
    response: String,
    index: usize,
}

impl Responder {
    pub fn new(pattern: &str, response: &str) -> Result<Self, WatcherError> {
        Ok(Self {
            pattern: compile(pattern)?,
            response: response.to_string(),
            index: 0,
        })
    }

    /// Count matches of `pattern` in the not-yet-seen region, advancing
    /// `index` past it when anything matched.
    fn pattern_matches(pattern: &Regex, stream: &str, index: &mut usize) -> usize {
        let new_region = &stream[*index..];
        let matches = pattern.find_iter(new_region).count();
        if matches > 0 {
            *index = stream.len();
        }
        matches
    }
}

impl StreamWatcher for Responder {
    fn submit(&mut self, stream: &str) -> Result<Vec<String>, WatcherError> {
        let count = Self::pattern_matches(&self.pattern, stream, &mut self.index);
        Ok(vec![self.response.clone(); count])
    }
}

/// A `Responder` that also watches for a failure sentinel: once it has sent
/// a response, seeing the sentinel means the response was rejected.
pub struct FailingResponder {
    pattern: Regex,
    pattern_source: String,
    response: String,
    sentinel: Regex,
    sentinel_source: String,
    index: usize,
    failure_index: usize,
    tried: bool,
}

impl FailingResponder {
    pub fn new(pattern: &str, response: &str, sentinel: &str) -> Result<Self, WatcherError> {
        Ok(Self {
            pattern: compile(pattern)?,
            pattern_source: pattern.to_string(),
            response: response.to_string(),
            sentinel: compile(sentinel)?,
            sentinel_source: sentinel.to_string(),
            index: 0,
            failure_index: 0,
            tried: false,
        })
    }
}

impl StreamWatcher for FailingResponder {
    fn submit(&mut self, stream: &str) -> Result<Vec<String>, WatcherError> {
        let count = Responder::pattern_matches(&self.pattern, stream, &mut self.index);
        let failed =
            Responder::pattern_matches(&self.sentinel, stream, &mut self.failure_index) > 0;
        if self.tried && failed {
            return Err(WatcherError::ResponseNotAccepted {
                pattern: self.pattern_source.clone(),
                sentinel: self.sentinel_source.clone(),
            });
        }
        if count > 0 {
            self.tried = true;
        }
        Ok(vec![self.response.clone(); count])
    }
}

fn compile(pattern: &str) -> Result<Regex, WatcherError> {
    // Multi-line prompts: '.' must cross newlines like the runner's
    // accumulated buffers do.
    Regex::new(&format!("(?s){}", pattern)).map_err(|e| WatcherError::BadPattern(e.to_string()))
}

// MARK: --- UNIT TESTS ---
