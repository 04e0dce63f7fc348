// src/system/context.rs
//
// The object handed to task bodies: a config handle plus command execution
// helpers (`run`, `sudo`) and command mangling state (`cd`, `prefix`).

use crate::core::config::Config;
use crate::system::runner::{CommandResult, RunError, RunOptions, Runner};
use crate::system::watchers::{FailingResponder, WatcherError};
use crate::CancellationToken;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("The password submitted to prompt {prompt:?} was rejected.")]
    AuthFailure {
        result: CommandResult,
        prompt: String,
    },
    #[error("sudo() requires a password; set sudo.password or use --prompt-for-sudo-password")]
    MissingSudoPassword,
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Watcher(#[from] WatcherError),
}

pub struct Context {
    pub config: Config,
    cancellation: CancellationToken,
    command_prefixes: Vec<String>,
    command_cwds: Vec<String>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Config::new(), Arc::new(AtomicBool::new(false)))
    }
}

impl Context {
    pub fn new(config: Config, cancellation: CancellationToken) -> Self {
        Self {
            config,
            cancellation,
            command_prefixes: Vec::new(),
            command_cwds: Vec::new(),
        }
    }

    /// Run `command` with options drawn from the `run.*` config tree.
    pub fn run(&mut self, command: &str) -> Result<CommandResult, RunError> {
        let options = RunOptions::from_config(&self.config)?;
        self.run_with(command, options)
    }

    /// Run `command` with explicit options (still applying cd/prefix state).
    pub fn run_with(
        &mut self,
        command: &str,
        options: RunOptions,
    ) -> Result<CommandResult, RunError> {
        let command = self.prefix_commands(command);
        Runner::new(Arc::clone(&self.cancellation)).run(&command, options)
    }

    /// Run `command` under sudo, auto-answering the password prompt. A
    /// rejected password surfaces as `ContextError::AuthFailure`.
    pub fn sudo(&mut self, command: &str) -> Result<CommandResult, ContextError> {
        let prompt = self
            .config
            .get_str("sudo.prompt")
            .unwrap_or("[sudo] password: ")
            .to_string();
        let password = self
            .config
            .get_str("sudo.password")
            .map(str::to_string)
            .ok_or(ContextError::MissingSudoPassword)?;
        let cmd_str = self.sudo_command(command, &prompt);
        let watcher = FailingResponder::new(
            &regex::escape(&prompt),
            &format!("{}\n", password),
            "Sorry, try again\\.\n",
        )?;
        let mut options = RunOptions::from_config(&self.config).map_err(ContextError::Run)?;
        options.watchers.push(Box::new(watcher));
        // cd/prefix state is already baked into cmd_str.
        match Runner::new(Arc::clone(&self.cancellation)).run(&cmd_str, options) {
            Ok(result) => Ok(result),
            Err(RunError::WatcherFailure { result, .. }) => {
                Err(ContextError::AuthFailure { result, prompt })
            }
            Err(other) => Err(ContextError::Run(other)),
        }
    }

    /// The full command string `sudo` will execute.
    fn sudo_command(&self, command: &str, prompt: &str) -> String {
        let user_flags = match self.config.get_str("sudo.user") {
            Some(user) => format!("-H -u {} ", user),
            None => String::new(),
        };
        let command = self.prefix_commands(command);
        format!("sudo -S -p '{}' {}{}", prompt, user_flags, command)
    }

    // --- COMMAND MANGLING ---

    /// Run `body` with `path` pushed onto the working-directory stack; every
    /// command inside is prefixed with the appropriate `cd ... &&`.
    pub fn cd<R>(&mut self, path: &str, body: impl FnOnce(&mut Self) -> R) -> R {
        self.command_cwds.push(path.to_string());
        let result = body(self);
        self.command_cwds.pop();
        result
    }

    /// Run `body` with `prefix` applied (joined with `&&`) to every command
    /// inside.
    pub fn prefix<R>(&mut self, prefix: &str, body: impl FnOnce(&mut Self) -> R) -> R {
        self.command_prefixes.push(prefix.to_string());
        let result = body(self);
        self.command_prefixes.pop();
        result
    }

    /// The effective working directory: nested relative cds join up, and an
    /// absolute cd resets the chain.
    pub fn cwd(&self) -> String {
        let mut start = 0;
        for (i, cwd) in self.command_cwds.iter().enumerate() {
            if cwd.starts_with('/') || cwd.starts_with('~') {
                start = i;
            }
        }
        let mut path = std::path::PathBuf::new();
        for cwd in &self.command_cwds[start..] {
            path.push(cwd);
        }
        path.display().to_string()
    }

    fn prefix_commands(&self, command: &str) -> String {
        let mut prefixes = Vec::new();
        let cwd = self.cwd();
        if !cwd.is_empty() {
            prefixes.push(format!("cd {}", cwd));
        }
        prefixes.extend(self.command_prefixes.iter().cloned());
        prefixes.push(command.to_string());
        prefixes.join(" && ")
    }
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigValue;
    use crate::system::runner::Hide;

    fn quiet_context() -> Context {
        let mut config = Config::new();
        config
            .set("run.hide", ConfigValue::from("both"))
            .unwrap();
        Context::new(config, Arc::new(AtomicBool::new(false)))
    }

    fn quiet_options() -> RunOptions {
        RunOptions {
            hide: Hide::Both,
            in_stream: false,
            ..Default::default()
        }
    }

    #[test]
    fn cd_prefixes_commands_and_pops_after() {
        let mut ctx = quiet_context();
        let result = ctx.cd("/tmp", |c| c.run_with("pwd", quiet_options())).unwrap();
        assert_eq!(result.stdout.trim_end(), "/tmp");
        assert_eq!(ctx.cwd(), "");
    }

    #[test]
    fn nested_relative_cds_join_and_absolute_resets() {
        let mut ctx = quiet_context();
        ctx.cd("/a", |c| {
            c.cd("b", |c| {
                assert_eq!(c.cwd(), "/a/b");
                c.cd("/fresh", |c| assert_eq!(c.cwd(), "/fresh"));
            })
        });
    }

    #[test]
    fn prefixes_apply_in_order() {
        let mut ctx = quiet_context();
        let result = ctx
            .prefix("FOO=bar", |c| {
                c.run_with("printf '%s' \"$FOO\"", quiet_options())
            })
            .unwrap();
        assert_eq!(result.stdout, "bar");
    }

    #[test]
    fn sudo_command_includes_prompt_and_user() {
        let mut ctx = quiet_context();
        ctx.config
            .set("sudo.user", ConfigValue::from("deploy"))
            .unwrap();
        let cmd = ctx.sudo_command("whoami", "[sudo] password: ");
        assert_eq!(cmd, "sudo -S -p '[sudo] password: ' -H -u deploy whoami");
    }

    #[test]
    fn sudo_without_password_errors() {
        let mut ctx = quiet_context();
        let err = ctx.sudo("whoami").unwrap_err();
        assert!(matches!(err, ContextError::MissingSudoPassword));
    }
}
