//! Assembly of execution parameters for Solargraph commands.
//!
//! A [`ServerInstallation`] pairs the locator's answer with the configuration
//! override for one project. From it the host derives the parameters for the
//! language server itself and for the two maintenance commands.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::locator::LocatorOutput;
use crate::process::{
    Environment, ExecutionParameters, LaunchError, LaunchMode, ProcessLauncher, quote,
};
use crate::resolver::ConfigResolver;

const BUILDER_TARGET: &str = "garnet_host::builder";

/// Solargraph subcommands the host runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subcommand {
    /// Language server over standard input and output.
    Stdio,
    /// Downloads core Ruby documentation.
    DownloadCore,
    /// Indexes the gems of a Bundler project.
    Bundle,
}

impl Subcommand {
    /// Command-line spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::DownloadCore => "download-core",
            Self::Bundle => "bundle",
        }
    }
}

impl fmt::Display for Subcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while assembling execution parameters.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// The command could not be shell-quoted.
    #[error("cannot build parameters: {0}")]
    Quote(#[from] LaunchError),
    /// An environment value could not be shell-quoted. Only the variable name
    /// is kept.
    #[error("cannot build parameters: the value of {key} contains a NUL byte")]
    UnquotableVariable {
        /// Variable whose value was rejected.
        key: String,
    },
}

/// Errors raised by a maintenance step. Logged and discarded by startup.
#[derive(Debug, Clone, Error)]
pub enum MaintenanceError {
    /// The step's parameters could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// The step's process failed.
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Best-effort outcome of a maintenance step.
#[derive(Debug, Clone)]
pub enum Maintenance {
    /// The step ran successfully.
    Completed,
    /// The step does not apply to this installation.
    Skipped,
    /// The step failed. Startup continues regardless.
    Failed(MaintenanceError),
}

impl Maintenance {
    /// Whether the step ran successfully.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Located server plus the per-project environment it runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstallation {
    details: LocatorOutput,
    environment: Environment,
    root: PathBuf,
}

impl ServerInstallation {
    /// Combines the locator output with `config_override` for `root`.
    ///
    /// Override entries replace locator entries with the same name.
    #[must_use]
    pub fn new(details: LocatorOutput, config_override: Environment, root: &Path) -> Self {
        let mut environment = details.environment.clone().unwrap_or_default();
        environment.extend(config_override);
        Self {
            details,
            environment,
            root: root.to_path_buf(),
        }
    }

    /// Resolves the configuration override for `root` and combines it with
    /// `details`.
    ///
    /// Only the locator's environment decides whether a global configuration
    /// is defined. The captured user environment plays no part.
    #[must_use]
    pub fn configure(details: LocatorOutput, resolver: &ConfigResolver, root: &Path) -> Self {
        let config_override = match details.environment.as_ref() {
            Some(locator_env) => resolver.resolve(locator_env, root),
            None => resolver.resolve(&Environment::new(), root),
        };
        Self::new(details, config_override, root)
    }

    /// Locator answer this installation was built from.
    #[must_use]
    pub const fn details(&self) -> &LocatorOutput {
        &self.details
    }

    /// Environment the server runs with.
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Parameters for `subcommand` followed by `extra` arguments.
    ///
    /// The path is a shell fragment: sorted `KEY=VALUE` assignments followed
    /// by the command, so it must be run through a shell.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnquotableVariable`] when an environment value
    /// contains a NUL byte, or [`BuildError::Quote`] when the command does.
    pub fn execution_parameters(
        &self,
        subcommand: Subcommand,
        extra: &[String],
    ) -> Result<ExecutionParameters, BuildError> {
        let mut words = Vec::with_capacity(self.environment.len() + 1);
        for (key, value) in &self.environment {
            let quoted =
                quote(value).map_err(|_| BuildError::UnquotableVariable { key: key.clone() })?;
            words.push(format!("{key}={quoted}"));
        }
        words.push(quote(&self.details.command)?);

        let mut arguments = self.details.arguments.clone().unwrap_or_default();
        arguments.push(subcommand.as_str().to_owned());
        arguments.extend(extra.iter().cloned());

        Ok(ExecutionParameters::new(
            words.join(" "),
            arguments,
            self.environment.clone(),
            self.root.as_path(),
        ))
    }

    /// Parameters for the language server itself.
    ///
    /// # Errors
    ///
    /// See [`Self::execution_parameters`].
    pub fn start_server_parameters(&self) -> Result<ExecutionParameters, BuildError> {
        self.execution_parameters(Subcommand::Stdio, &[])
    }

    /// Downloads core documentation. Runs for every installation.
    pub fn update_documentation(
        &self,
        launcher: &dyn ProcessLauncher,
        timeout: Duration,
    ) -> Maintenance {
        self.run_maintenance(Subcommand::DownloadCore, launcher, timeout)
    }

    /// Indexes the project's bundle. Only applies when the server runs
    /// through Bundler.
    pub fn index_project(&self, launcher: &dyn ProcessLauncher, timeout: Duration) -> Maintenance {
        if !self.details.runs_through_bundler() {
            debug!(
                target: BUILDER_TARGET,
                command = %self.details.command,
                "skipping bundle indexing outside bundler"
            );
            return Maintenance::Skipped;
        }
        self.run_maintenance(Subcommand::Bundle, launcher, timeout)
    }

    fn run_maintenance(
        &self,
        subcommand: Subcommand,
        launcher: &dyn ProcessLauncher,
        timeout: Duration,
    ) -> Maintenance {
        let outcome = self
            .execution_parameters(subcommand, &[])
            .map_err(MaintenanceError::from)
            .and_then(|params| {
                launcher
                    .run_to_completion(&params, LaunchMode::UserShell, timeout)
                    .map_err(MaintenanceError::from)
            });

        match outcome {
            Ok(_) => {
                debug!(target: BUILDER_TARGET, %subcommand, "maintenance step completed");
                Maintenance::Completed
            }
            Err(error) => {
                warn!(
                    target: BUILDER_TARGET,
                    %subcommand,
                    error = %error,
                    "maintenance step failed; continuing"
                );
                Maintenance::Failed(error)
            }
        }
    }
}
