// src/system/runner.rs
//
// Subprocess execution. A `Runner` spawns `shell -c command` with piped
// streams and a small crew of worker threads: one drains stdout (and feeds
// watchers), one drains stderr, and an optional one mirrors our stdin into
// the child. Each drain worker owns its buffer and hands it back through its
// join handle. The main thread polls for process exit, forwards one
// interrupt byte when the cancellation token trips, and kills the child if a
// worker dies so the sibling never blocks on a full pipe.

use crate::constants::{INPUT_SLEEP_MS, INTERRUPT_BYTE, READ_CHUNK_SIZE};
use crate::core::config::Config;
use crate::models::ConfigValue;
use crate::system::watchers::{StreamWatcher, WatcherError};
use crate::CancellationToken;
use colored::Colorize;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, Once};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Which captured streams are withheld from the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hide {
    #[default]
    Neither,
    Stdout,
    Stderr,
    Both,
}

impl Hide {
    /// Normalize the config-level representation: null/false hide nothing,
    /// true hides both, "out"/"stdout" and "err"/"stderr" hide one side.
    pub fn from_value(value: &ConfigValue) -> Result<Self, RunError> {
        match value {
            ConfigValue::Null | ConfigValue::Bool(false) => Ok(Self::Neither),
            ConfigValue::Bool(true) => Ok(Self::Both),
            ConfigValue::Str(s) => Self::from_name(s),
            other => Err(RunError::BadHide(other.to_string())),
        }
    }

    pub fn from_name(name: &str) -> Result<Self, RunError> {
        match name {
            "none" => Ok(Self::Neither),
            "out" | "stdout" => Ok(Self::Stdout),
            "err" | "stderr" => Ok(Self::Stderr),
            "both" => Ok(Self::Both),
            other => Err(RunError::BadHide(other.to_string())),
        }
    }

    fn shows_stdout(self) -> bool {
        !matches!(self, Self::Stdout | Self::Both)
    }

    fn shows_stderr(self) -> bool {
        !matches!(self, Self::Stderr | Self::Both)
    }
}

/// Per-run options, typically seeded from the `run.*` config tree.
pub struct RunOptions {
    pub warn: bool,
    pub hide: Hide,
    pub echo: bool,
    pub pty: bool,
    pub shell: String,
    pub env: HashMap<String, String>,
    pub replace_env: bool,
    /// Mirror our stdin into the subprocess.
    pub in_stream: bool,
    pub echo_stdin: bool,
    pub watchers: Vec<Box<dyn StreamWatcher>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            warn: false,
            hide: Hide::Neither,
            echo: false,
            pty: false,
            shell: "/bin/sh".to_string(),
            env: HashMap::new(),
            replace_env: false,
            in_stream: true,
            echo_stdin: false,
            watchers: Vec::new(),
        }
    }
}

impl RunOptions {
    /// Seed options from the merged `run.*` settings.
    pub fn from_config(config: &Config) -> Result<Self, RunError> {
        let mut options = Self::default();
        options.warn = config.get_bool("run.warn").unwrap_or(false);
        if let Some(value) = config.get("run.hide") {
            options.hide = Hide::from_value(value)?;
        }
        options.echo = config.get_bool("run.echo").unwrap_or(false);
        if options.hide == Hide::Both {
            // A fully hidden run stays silent, command echo included.
            options.echo = false;
        }
        options.pty = config.get_bool("run.pty").unwrap_or(false);
        if let Some(shell) = config.get_str("run.shell") {
            options.shell = shell.to_string();
        }
        options.replace_env = config.get_bool("run.replace_env").unwrap_or(false);
        options.echo_stdin = config.get_bool("run.echo_stdin").unwrap_or(false);
        if let Some(ConfigValue::Map(env)) = config.get("run.env") {
            for (key, value) in env {
                options.env.insert(key.clone(), value.to_string());
            }
        }
        Ok(options)
    }
}

/// The captured outcome of one subprocess run.
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub command: String,
    pub shell: String,
    pub stdout: String,
    pub stderr: String,
    /// Exit code; negative values are the signal that killed the process,
    /// and `None` means the run was aborted (e.g. by a watcher failure).
    pub exited: Option<i32>,
    pub pty: bool,
    pub hide: Hide,
}

impl CommandResult {
    pub fn ok(&self) -> bool {
        self.exited == Some(0)
    }

    pub fn failed(&self) -> bool {
        !self.ok()
    }

    fn stream_for_display(&self, name: &str, hidden: bool, text: &str) -> String {
        if !hidden {
            return format!("\n{}: already printed", name);
        }
        if text.is_empty() {
            return format!("\n{}: n/a", name);
        }
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(10);
        format!("\n{}:\n\n{}\n", name, lines[start..].join("\n"))
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exited = match self.exited {
            Some(code) => code.to_string(),
            None => "None".to_string(),
        };
        write!(
            f,
            "Command: {:?}\n\nExit code: {}\n{}{}",
            self.command,
            exited,
            self.stream_for_display("Stdout", !self.hide.shows_stdout(), &self.stdout),
            self.stream_for_display("Stderr", !self.hide.shows_stderr(), &self.stderr),
        )
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Encountered a bad command exit code!\n\n{0}")]
    UnexpectedExit(CommandResult),
    #[error("{error}")]
    WatcherFailure {
        result: CommandResult,
        error: WatcherError,
    },
    #[error("One or more output-handling threads failed: {0:?}")]
    ThreadException(Vec<String>),
    #[error("'hide' got {0:?} which is not a valid value")]
    BadHide(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

fn write_to_stdin(stdin: &SharedStdin, bytes: &[u8]) -> io::Result<()> {
    let mut guard = stdin.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(writer) = guard.as_mut() {
        writer.write_all(bytes)?;
        writer.flush()?;
    }
    Ok(())
}

fn apply_watchers(
    watchers: &mut [Box<dyn StreamWatcher>],
    buffer: &str,
    stdin: &SharedStdin,
) -> Result<(), WatcherError> {
    for watcher in watchers.iter_mut() {
        for response in watcher.submit(buffer)? {
            let _ = write_to_stdin(stdin, response.as_bytes());
        }
    }
    Ok(())
}

static PTY_FALLBACK_WARNING: Once = Once::new();

/// Executes commands through a shell, wiring up capture, watchers and
/// cancellation.
pub struct Runner {
    cancellation: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)))
    }
}

impl Runner {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    pub fn run(&self, command: &str, options: RunOptions) -> Result<CommandResult, RunError> {
        let RunOptions {
            warn,
            hide,
            echo,
            pty,
            shell,
            env,
            replace_env,
            in_stream,
            echo_stdin,
            watchers,
        } = options;
        if pty {
            PTY_FALLBACK_WARNING.call_once(|| {
                eprintln!("pty requested but unavailable; falling back to pipes");
            });
        }
        if echo && hide != Hide::Both {
            println!("{}", command.bold());
        }
        log::debug!("Running command {:?} via shell {:?}", command, shell);
        let mut cmd = Command::new(&shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if replace_env {
            cmd.env_clear();
        }
        cmd.envs(&env);
        let mut child = cmd.spawn()?;

        let stdin: SharedStdin = Arc::new(Mutex::new(child.stdin.take()));
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();
        let worker_failed = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        // Kill the child on any early exit so pipe-blocked workers unwind.
        let mut child = scopeguard::guard(child, |mut child| {
            let _ = child.kill();
            let _ = child.wait();
        });

        let out_handle = {
            let stdin = Arc::clone(&stdin);
            let failed = Arc::clone(&worker_failed);
            let mut watchers = watchers;
            let show = hide.shows_stdout();
            let mut reader = child_stdout;
            thread::spawn(move || {
                let mut buffer = String::new();
                let mut error = None;
                if let Some(reader) = reader.as_mut() {
                    let mut chunk = [0u8; READ_CHUNK_SIZE];
                    loop {
                        let read = match reader.read(&mut chunk) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        let text = String::from_utf8_lossy(&chunk[..read]).into_owned();
                        buffer.push_str(&text);
                        if show {
                            let mut out = io::stdout();
                            let _ = out.write_all(text.as_bytes());
                            let _ = out.flush();
                        }
                        if let Err(e) = apply_watchers(&mut watchers, &buffer, &stdin) {
                            failed.store(true, Ordering::SeqCst);
                            error = Some(e);
                            break;
                        }
                    }
                }
                (buffer, error)
            })
        };

        let err_handle = {
            let show = hide.shows_stderr();
            let mut reader = child_stderr;
            thread::spawn(move || {
                let mut buffer = String::new();
                if let Some(reader) = reader.as_mut() {
                    let mut chunk = [0u8; READ_CHUNK_SIZE];
                    loop {
                        let read = match reader.read(&mut chunk) {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        let text = String::from_utf8_lossy(&chunk[..read]).into_owned();
                        buffer.push_str(&text);
                        if show {
                            let mut err = io::stderr();
                            let _ = err.write_all(text.as_bytes());
                            let _ = err.flush();
                        }
                    }
                }
                buffer
            })
        };

        let in_handle = in_stream.then(|| {
            // The blocking stdin reader is detached on purpose: there is no
            // portable way to interrupt a read of our own stdin, so it feeds
            // a channel and the mirror worker below polls with a timeout.
            let (tx, rx) = mpsc::channel::<Vec<u8>>();
            thread::spawn(move || {
                let mut our_stdin = io::stdin();
                let mut chunk = [0u8; READ_CHUNK_SIZE];
                loop {
                    let read = match our_stdin.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    if tx.send(chunk[..read].to_vec()).is_err() {
                        break;
                    }
                }
            });
            let stdin = Arc::clone(&stdin);
            let finished = Arc::clone(&finished);
            thread::spawn(move || loop {
                match rx.recv_timeout(Duration::from_millis(INPUT_SLEEP_MS)) {
                    Ok(bytes) => {
                        let _ = write_to_stdin(&stdin, &bytes);
                        if echo_stdin {
                            let mut out = io::stdout();
                            let _ = out.write_all(&bytes);
                            let _ = out.flush();
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if finished.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })
        });

        // Wait loop: poll for exit, forward one interrupt on cancellation,
        // kill on worker failure so the sibling drain can finish.
        let mut interrupted = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.cancellation.load(Ordering::SeqCst) && !interrupted {
                log::debug!("Cancellation requested; forwarding interrupt to subprocess");
                let _ = write_to_stdin(&stdin, &[INTERRUPT_BYTE]);
                interrupted = true;
            }
            if worker_failed.load(Ordering::SeqCst) {
                let _ = child.kill();
            }
            thread::sleep(Duration::from_millis(INPUT_SLEEP_MS));
        };
        let _ = scopeguard::ScopeGuard::into_inner(child);

        // Close the child's stdin and stop the mirror worker.
        finished.store(true, Ordering::SeqCst);
        stdin.lock().unwrap_or_else(|e| e.into_inner()).take();

        let mut thread_errors = Vec::new();
        let (stdout, watcher_error) = match out_handle.join() {
            Ok(output) => output,
            Err(_) => {
                thread_errors.push("stdout worker panicked".to_string());
                (String::new(), None)
            }
        };
        let stderr = match err_handle.join() {
            Ok(output) => output,
            Err(_) => {
                thread_errors.push("stderr worker panicked".to_string());
                String::new()
            }
        };
        if let Some(handle) = in_handle {
            if handle.join().is_err() {
                thread_errors.push("stdin mirror worker panicked".to_string());
            }
        }
        if !thread_errors.is_empty() {
            return Err(RunError::ThreadException(thread_errors));
        }

        let exited = exit_code(&status);
        let mut result = CommandResult {
            command: command.to_string(),
            shell,
            stdout,
            stderr,
            exited,
            // No pty backend: requests degrade to pipes, and the result
            // reports what actually happened.
            pty: false,
            hide,
        };
        if let Some(error) = watcher_error {
            result.exited = None;
            return Err(RunError::WatcherFailure { result, error });
        }
        if result.failed() && !warn {
            return Err(RunError::UnexpectedExit(result));
        }
        Ok(result)
    }
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|s| -s))
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> Option<i32> {
    status.code()
}

// MARK: --- UNIT TESTS ---
