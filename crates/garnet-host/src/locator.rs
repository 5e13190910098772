//! Discovery of the Solargraph installation for a project.
//!
//! The heavy lifting happens in the bundled `locate_solargraph.sh`, which
//! knows about Bundler, RubyGems and version managers. This module runs it in
//! the captured user environment and decodes the single JSON object it
//! prints.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::process::{Environment, ExecutionParameters, LaunchError, LaunchMode, ProcessLauncher};
use crate::resources::{BundledResources, LOCATE_SCRIPT};

const LOCATOR_TARGET: &str = "garnet_host::locator";

/// How to run the discovered server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocatorOutput {
    /// Program to invoke, such as `bundle` or an absolute `solargraph` path.
    pub command: String,
    /// Extra environment the server needs.
    pub environment: Option<Environment>,
    /// Installed server version. Opaque; never parsed.
    pub version: String,
    /// Arguments placed before the subcommand, such as `exec solargraph`.
    pub arguments: Option<Vec<String>>,
}

impl LocatorOutput {
    /// Decodes the discovery script's standard output.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::EmptyOutput`] for blank output and
    /// [`LocateError::Decode`] for malformed JSON or an empty command.
    pub fn from_slice(output: &[u8]) -> Result<Self, LocateError> {
        if output.iter().all(u8::is_ascii_whitespace) {
            return Err(LocateError::EmptyOutput);
        }

        let decoded: Self = serde_json::from_slice(output).map_err(|source| LocateError::Decode {
            message: source.to_string(),
            source: Some(Arc::new(source)),
        })?;

        if decoded.command.trim().is_empty() {
            return Err(LocateError::Decode {
                message: String::from("command must not be empty"),
                source: None,
            });
        }

        Ok(decoded)
    }

    /// Whether the server is launched through Bundler.
    #[must_use]
    pub fn runs_through_bundler(&self) -> bool {
        self.command == "bundle"
    }
}

/// Errors raised while locating the server.
#[derive(Debug, Error)]
pub enum LocateError {
    /// The bundled discovery script is missing.
    #[error("setup script '{script}' not found in {}", directory.display())]
    SetupScriptNotFound {
        /// Script name that was looked up.
        script: &'static str,
        /// Resource directory that was searched.
        directory: PathBuf,
    },

    /// The discovery script failed to run or exited unsuccessfully.
    #[error("discovery script failed: {0}")]
    Launch(#[from] LaunchError),

    /// The discovery script printed nothing.
    #[error("discovery script produced no output")]
    EmptyOutput,

    /// The discovery script printed something other than the expected JSON.
    #[error("discovery script output is malformed: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
        /// Underlying JSON error, when there is one.
        #[source]
        source: Option<Arc<serde_json::Error>>,
    },
}

/// Resolves the server installation for a project.
pub trait ServerLocator: Send + Sync {
    /// Locates the server for `root` using the captured `user_env`.
    ///
    /// When `update` is set the locator reinstalls or updates the server
    /// before answering.
    ///
    /// # Errors
    ///
    /// Returns a [`LocateError`] when discovery fails; no retry is attempted.
    fn locate(
        &self,
        user_env: &Environment,
        root: &Path,
        update: bool,
    ) -> Result<LocatorOutput, LocateError>;
}

/// Locator backed by the bundled discovery script.
pub struct ScriptLocator {
    resources: BundledResources,
    launcher: Arc<dyn ProcessLauncher>,
    timeout: Duration,
}

impl ScriptLocator {
    /// Creates a locator that runs the script from `resources`.
    #[must_use]
    pub fn new(
        resources: BundledResources,
        launcher: Arc<dyn ProcessLauncher>,
        timeout: Duration,
    ) -> Self {
        Self {
            resources,
            launcher,
            timeout,
        }
    }

    /// Launch parameters for the discovery script.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::SetupScriptNotFound`] when the script is not
    /// bundled.
    pub fn script_parameters(
        &self,
        user_env: &Environment,
        root: &Path,
        update: bool,
    ) -> Result<ExecutionParameters, LocateError> {
        let script = self
            .resources
            .locate(LOCATE_SCRIPT)
            .ok_or_else(|| LocateError::SetupScriptNotFound {
                script: LOCATE_SCRIPT,
                directory: self.resources.root().to_path_buf(),
            })?;

        let mut arguments = vec![script.display().to_string()];
        if update {
            arguments.push(String::from("-u"));
        }

        Ok(ExecutionParameters::new(
            "/bin/sh",
            arguments,
            user_env.clone(),
            root,
        ))
    }
}

impl ServerLocator for ScriptLocator {
    fn locate(
        &self,
        user_env: &Environment,
        root: &Path,
        update: bool,
    ) -> Result<LocatorOutput, LocateError> {
        let params = self.script_parameters(user_env, root, update)?;

        debug!(
            target: LOCATOR_TARGET,
            root = %root.display(),
            update,
            "running discovery script"
        );

        let output = self
            .launcher
            .run_to_completion(&params, LaunchMode::UserShell, self.timeout)?;
        let located = LocatorOutput::from_slice(&output)?;

        debug!(
            target: LOCATOR_TARGET,
            command = %located.command,
            version = %located.version,
            "located solargraph"
        );

        Ok(located)
    }
}
