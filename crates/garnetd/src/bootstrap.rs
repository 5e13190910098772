//! Daemon bootstrap orchestration.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::Serialize;
use thiserror::Error;

use garnet_config::Config;
use garnet_host::{ExecutionParameters, ProjectContext, ServiceRegistry, StartupError};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when no valid configuration can be built.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that always returns the same configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Errors surfaced while the daemon runs.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Bootstrap did not complete.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The project root holds no Ruby project.
    #[error("{} is not a Ruby project (no Gemfile)", root.display())]
    NotServed {
        /// Root that was rejected.
        root: PathBuf,
    },
    /// Start parameters could not be resolved.
    #[error(transparent)]
    Startup(#[from] StartupError),
    /// The report could not be encoded.
    #[error("failed to encode start report: {0}")]
    Encode(#[from] serde_json::Error),
    /// The report could not be written.
    #[error("failed to write start report: {0}")]
    Output(#[from] io::Error),
}

/// What the daemon prints once parameters are resolved.
#[derive(Debug, Serialize)]
pub struct StartReport<'a> {
    /// Project the parameters belong to.
    pub project: &'a str,
    /// Parameters that launch `solargraph stdio`.
    pub parameters: &'a ExecutionParameters,
    /// Initialization options to send with the LSP `initialize` request.
    pub initialization_options: serde_json::Value,
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    registry: ServiceRegistry,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the service registry.
    #[must_use]
    pub const fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Resolves Solargraph start parameters for the project at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::NotServed`] when `root` has no `Gemfile`, or
    /// [`DaemonError::Startup`] when the startup pipeline fails.
    pub fn resolve(&self, root: &Path) -> Result<ExecutionParameters, DaemonError> {
        self.reporter.resolution_starting(root);
        let result = self.resolve_project(root);
        match &result {
            Ok(params) => self.reporter.resolution_succeeded(root, params),
            Err(error) => self.reporter.resolution_failed(root, error),
        }
        result
    }

    fn resolve_project(&self, root: &Path) -> Result<ExecutionParameters, DaemonError> {
        let project = ProjectContext::new(root.display().to_string().as_str(), root);
        if !self.registry.serves(&project, None) {
            return Err(DaemonError::NotServed {
                root: root.to_path_buf(),
            });
        }
        let service = self.registry.service_for_project(&project);
        Ok(service.resolve_parameters()?)
    }

    /// Resolves parameters for the configured project root and writes a
    /// one-line JSON [`StartReport`] to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError`] when resolution fails or `out` rejects the
    /// report.
    pub fn report<W: io::Write>(&self, out: &mut W) -> Result<(), DaemonError> {
        let root = self.config.project_root();
        let params = self.resolve(&root)?;
        let project = ProjectContext::new(root.display().to_string().as_str(), root.as_path());
        let service = self.registry.service_for_project(&project);
        let report = StartReport {
            project: project.id().as_str(),
            parameters: &params,
            initialization_options: service.options().to_json(),
        };
        serde_json::to_writer(&mut *out, &report)?;
        writeln!(out)?;
        Ok(())
    }
}

/// Bootstraps the daemon with the real shell and discovery script.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry fails.
pub fn bootstrap(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    bootstrap_with(loader, reporter, ServiceRegistry::with_system_collaborators)
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// `build_registry` receives the loaded configuration. A configured forced
/// update is armed on the registry it returns.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry fails.
pub fn bootstrap_with<F>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    build_registry: F,
) -> Result<Daemon, BootstrapError>
where
    F: FnOnce(&Config) -> ServiceRegistry,
{
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let registry = build_registry(&config);
    if config.force_update() {
        registry.force_update();
    }
    reporter.bootstrap_succeeded(&config);

    Ok(Daemon {
        config,
        registry,
        telemetry,
        reporter,
    })
}
