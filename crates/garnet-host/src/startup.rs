//! Resolution of the parameters a project's language server starts with.
//!
//! Startup walks a fixed sequence of stages:
//!
//! ```text
//! Uninitialized -> EnvironmentCaptured -> Located -> Configured -> ParametersReady
//! ```
//!
//! Any stage may instead end in `Failed`. Nothing is retried automatically.
//! Once the server parameters are built, documentation download and bundle
//! indexing run on a best-effort basis; their failures are logged and never
//! reach the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::builder::{BuildError, ServerInstallation};
use crate::context::ProjectId;
use crate::environment::{EnvironmentCapture, EnvironmentError, printable};
use crate::locator::{LocateError, LocatorOutput, ServerLocator};
use crate::process::{Environment, ExecutionParameters, ProcessLauncher};
use crate::resolver::ConfigResolver;
use crate::serializer::{RequestSerializer, SerializerError};

const STARTUP_TARGET: &str = "garnet_host::startup";

/// Startup stage, used for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupStage {
    /// Nothing has run yet.
    Uninitialized,
    /// The user environment is known.
    EnvironmentCaptured,
    /// The server installation is known.
    Located,
    /// The configuration override has been applied.
    Configured,
    /// Server parameters are ready to hand off.
    ParametersReady,
    /// Startup stopped with an error.
    Failed,
}

impl StartupStage {
    /// Lowercase label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::EnvironmentCaptured => "environment_captured",
            Self::Located => "located",
            Self::Configured => "configured",
            Self::ParametersReady => "parameters_ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort startup, named after the stage that failed.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The user environment could not be captured.
    #[error("environment capture failed: {0}")]
    EnvironmentCapture(#[from] EnvironmentError),

    /// The server installation could not be located.
    #[error("locating solargraph failed: {0}")]
    Locate(#[from] LocateError),

    /// The server parameters could not be built.
    #[error("building server parameters failed: {0}")]
    Build(#[from] BuildError),

    /// The serialized request did not complete.
    #[error("parameter request did not complete: {0}")]
    Serializer(#[from] SerializerError),
}

impl StartupError {
    /// Last stage reached before the failure.
    #[must_use]
    pub const fn stage(&self) -> StartupStage {
        match self {
            Self::EnvironmentCapture(_) | Self::Serializer(_) => StartupStage::Uninitialized,
            Self::Locate(_) => StartupStage::EnvironmentCaptured,
            Self::Build(_) => StartupStage::Configured,
        }
    }
}

/// State carried between startup stages.
#[derive(Debug)]
pub enum StartupState {
    /// Nothing has run yet.
    Uninitialized,
    /// The user environment is known.
    EnvironmentCaptured {
        /// Captured login-shell environment.
        user_env: Environment,
        /// Update request taken from the trigger when this request began.
        update: bool,
    },
    /// The server installation is known.
    Located {
        /// Locator answer.
        details: LocatorOutput,
    },
    /// The configuration override has been applied.
    Configured {
        /// Installation with its per-project environment.
        installation: ServerInstallation,
    },
    /// Server parameters are ready to hand off.
    ParametersReady(ExecutionParameters),
    /// Startup stopped with an error.
    Failed(StartupError),
}

impl StartupState {
    /// Stage this state belongs to.
    #[must_use]
    pub const fn stage(&self) -> StartupStage {
        match self {
            Self::Uninitialized => StartupStage::Uninitialized,
            Self::EnvironmentCaptured { .. } => StartupStage::EnvironmentCaptured,
            Self::Located { .. } => StartupStage::Located,
            Self::Configured { .. } => StartupStage::Configured,
            Self::ParametersReady(_) => StartupStage::ParametersReady,
            Self::Failed(_) => StartupStage::Failed,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::ParametersReady(_) | Self::Failed(_))
    }
}

/// Extension-wide request to reinstall or update the server.
///
/// Armed by an explicit force-update and consumed by exactly one parameter
/// request.
#[derive(Debug, Default)]
pub struct UpdateTrigger {
    armed: AtomicBool,
}

impl UpdateTrigger {
    /// Creates a disarmed trigger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
        }
    }

    /// Requests an update on the next parameter request.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Reads and clears the request in one step.
    #[must_use]
    pub fn take(&self) -> bool {
        self.armed.swap(false, Ordering::SeqCst)
    }

    /// Whether an update is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// Source of start parameters for a project's language server.
pub trait ExecutionParamsProvider: Send + Sync {
    /// Resolves the parameters to launch the server for `root`.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] naming the stage that failed.
    fn provide_start_parameters(&self, root: &Path) -> Result<ExecutionParameters, StartupError>;
}

/// Collaborators the orchestrator drives.
pub struct StartupCollaborators {
    /// Captures the user's login-shell environment.
    pub environment: Arc<dyn EnvironmentCapture>,
    /// Finds the server installation.
    pub locator: Arc<dyn ServerLocator>,
    /// Chooses the Solargraph configuration.
    pub resolver: ConfigResolver,
    /// Runs the maintenance commands.
    pub launcher: Arc<dyn ProcessLauncher>,
    /// Timeout for each maintenance command.
    pub maintenance_timeout: Duration,
}

/// Drives startup from an uninitialised state to ready parameters.
pub struct StartupOrchestrator {
    collaborators: StartupCollaborators,
    trigger: Arc<UpdateTrigger>,
}

impl StartupOrchestrator {
    /// Creates an orchestrator consuming `trigger` on each run.
    #[must_use]
    pub const fn new(collaborators: StartupCollaborators, trigger: Arc<UpdateTrigger>) -> Self {
        Self {
            collaborators,
            trigger,
        }
    }

    /// Advances `state` by one stage for the project at `root`.
    ///
    /// Terminal states are returned unchanged.
    #[must_use]
    pub fn advance(&self, state: StartupState, root: &Path) -> StartupState {
        match state {
            StartupState::Uninitialized => {
                let update = self.trigger.take();
                match self.collaborators.environment.capture(root) {
                    Ok(user_env) => {
                        info!(
                            target: STARTUP_TARGET,
                            root = %root.display(),
                            environment = ?printable(&user_env),
                            update,
                            "captured ruby environment"
                        );
                        StartupState::EnvironmentCaptured { user_env, update }
                    }
                    Err(error) => StartupState::Failed(error.into()),
                }
            }
            StartupState::EnvironmentCaptured { user_env, update } => {
                match self.collaborators.locator.locate(&user_env, root, update) {
                    Ok(details) => StartupState::Located { details },
                    Err(error) => StartupState::Failed(error.into()),
                }
            }
            StartupState::Located { details } => StartupState::Configured {
                installation: ServerInstallation::configure(
                    details,
                    &self.collaborators.resolver,
                    root,
                ),
            },
            StartupState::Configured { installation } => {
                match installation.start_server_parameters() {
                    Ok(params) => {
                        self.run_maintenance(&installation);
                        StartupState::ParametersReady(params)
                    }
                    Err(error) => StartupState::Failed(error.into()),
                }
            }
            terminal @ (StartupState::ParametersReady(_) | StartupState::Failed(_)) => terminal,
        }
    }

    /// Runs every stage for `root`.
    ///
    /// # Errors
    ///
    /// Returns the error of the stage that failed.
    pub fn run(&self, root: &Path) -> Result<ExecutionParameters, StartupError> {
        let mut state = StartupState::Uninitialized;
        loop {
            let from = state.stage();
            state = self.advance(state, root);
            debug!(
                target: STARTUP_TARGET,
                root = %root.display(),
                %from,
                to = %state.stage(),
                "startup transition"
            );
            match state {
                StartupState::ParametersReady(params) => return Ok(params),
                StartupState::Failed(error) => return Err(error),
                StartupState::Uninitialized
                | StartupState::EnvironmentCaptured { .. }
                | StartupState::Located { .. }
                | StartupState::Configured { .. } => {}
            }
        }
    }

    fn run_maintenance(&self, installation: &ServerInstallation) {
        let launcher = self.collaborators.launcher.as_ref();
        let timeout = self.collaborators.maintenance_timeout;
        let documentation = installation.update_documentation(launcher, timeout);
        let indexing = installation.index_project(launcher, timeout);
        debug!(
            target: STARTUP_TARGET,
            documentation_updated = documentation.is_completed(),
            bundle_indexed = indexing.is_completed(),
            "maintenance finished"
        );
    }
}

impl ExecutionParamsProvider for StartupOrchestrator {
    fn provide_start_parameters(&self, root: &Path) -> Result<ExecutionParameters, StartupError> {
        let outcome = self.run(root);
        match &outcome {
            Ok(params) => info!(
                target: STARTUP_TARGET,
                command = %params.command(),
                arguments = ?params.arguments,
                environment = ?printable(&params.environment),
                directory = %params.working_directory().display(),
                "server parameters ready"
            ),
            Err(error) => warn!(
                target: STARTUP_TARGET,
                root = %root.display(),
                stage = %error.stage(),
                error = %error,
                "startup failed"
            ),
        }
        outcome
    }
}

/// Provider that runs startup on the project's serializer lane.
pub struct SerializedProvider {
    project: ProjectId,
    serializer: Arc<RequestSerializer<ProjectId>>,
    inner: Arc<dyn ExecutionParamsProvider>,
}

impl SerializedProvider {
    /// Wraps `inner` so requests for `project` run one at a time.
    #[must_use]
    pub fn new(
        project: ProjectId,
        serializer: Arc<RequestSerializer<ProjectId>>,
        inner: Arc<dyn ExecutionParamsProvider>,
    ) -> Self {
        Self {
            project,
            serializer,
            inner,
        }
    }
}

impl ExecutionParamsProvider for SerializedProvider {
    fn provide_start_parameters(&self, root: &Path) -> Result<ExecutionParameters, StartupError> {
        let inner = Arc::clone(&self.inner);
        let owned_root: PathBuf = root.to_path_buf();
        self.serializer
            .submit(&self.project, move || {
                inner.provide_start_parameters(&owned_root)
            })?
    }
}
