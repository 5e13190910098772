//! Capture of the user's login-shell environment.
//!
//! Ruby tooling lives wherever rbenv, asdf, chruby or Bundler put it, so the
//! process environment the host inherited is rarely the one the user's
//! terminal sees. Capturing it means running a login shell in the project
//! directory, which triggers directory hooks such as direnv, and reading the
//! result of `printenv -0`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::process::{
    Environment, ExecutionParameters, LaunchError, LaunchMode, ProcessLauncher, ShellKind,
};

/// Variables that may appear in logs. Everything else stays private.
pub const LOGGED_ENV_KEYS: [&str; 11] = [
    "GEM_HOME",
    "GEM_PATH",
    "SOLARGRAPH_CACHE",
    "SOLARGRAPH_GLOBAL_CONFIG",
    "PATH",
    "SHLVL",
    "TERM_PROGRAM",
    "PWD",
    "TERM_PROGRAM_VERSION",
    "SHELL",
    "TERM",
];

/// Returns the allow-listed subset of `environment` that is safe to log.
#[must_use]
pub fn printable(environment: &Environment) -> BTreeMap<&str, &str> {
    environment
        .iter()
        .filter(|(key, _)| LOGGED_ENV_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect()
}

/// Errors raised while capturing the user environment.
#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    /// The login shell could not be run.
    #[error("failed to run login shell: {0}")]
    Launch(#[from] LaunchError),

    /// The shell output contained no variables.
    #[error("login shell reported no environment variables")]
    Empty,
}

/// Source of the user's shell environment.
pub trait EnvironmentCapture: Send + Sync {
    /// Captures the environment a login shell sees in `directory`.
    ///
    /// # Errors
    ///
    /// Returns an [`EnvironmentError`] when the shell fails or reports
    /// nothing.
    fn capture(&self, directory: &Path) -> Result<Environment, EnvironmentError>;
}

/// Captures the environment by running the user's login shell.
pub struct ShellEnvironment {
    shell: String,
    launcher: Arc<dyn ProcessLauncher>,
    timeout: Duration,
}

impl ShellEnvironment {
    /// Creates a capture that runs `shell` through `launcher`.
    #[must_use]
    pub fn new(shell: impl Into<String>, launcher: Arc<dyn ProcessLauncher>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            launcher,
            timeout,
        }
    }

    /// Launch parameters for the capture command in `directory`.
    ///
    /// The working directory is set directly, and the script `cd`s again so
    /// shells with directory hooks fire them after their rc files load.
    #[must_use]
    pub fn capture_parameters(&self, directory: &Path) -> ExecutionParameters {
        let kind = ShellKind::detect(&self.shell);
        let target = directory.display().to_string().replace('\'', "'\\''");
        let script = match kind {
            ShellKind::Fish => format!("cd '{target}'; emit fish_prompt; printenv -0"),
            ShellKind::Nu => format!("cd '{target}'; ^printenv -0"),
            ShellKind::Bash | ShellKind::Zsh | ShellKind::Csh | ShellKind::Posix => {
                format!("cd '{target}' && printenv -0")
            }
        };

        ExecutionParameters::new(
            self.shell.clone(),
            kind.command_arguments(script),
            Environment::new(),
            directory,
        )
    }
}

impl EnvironmentCapture for ShellEnvironment {
    fn capture(&self, directory: &Path) -> Result<Environment, EnvironmentError> {
        let params = self.capture_parameters(directory);
        let output = self
            .launcher
            .run_to_completion(&params, LaunchMode::Direct, self.timeout)?;
        parse_environment(&output)
    }
}

/// Parses NUL-separated `KEY=VALUE` records.
///
/// Records without `=` are skipped; the first `=` separates key from value.
///
/// # Errors
///
/// Returns [`EnvironmentError::Empty`] when no variables are present.
pub fn parse_environment(output: &[u8]) -> Result<Environment, EnvironmentError> {
    let text = String::from_utf8_lossy(output);
    let environment: Environment = text
        .split('\0')
        .filter_map(|record| record.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect();

    if environment.is_empty() {
        return Err(EnvironmentError::Empty);
    }

    Ok(environment)
}
