//! Structured health reporting for daemon lifecycle events.

use std::path::Path;
use std::sync::Arc;

use garnet_config::Config;
use garnet_host::ExecutionParameters;
use garnet_host::environment::printable;

use crate::bootstrap::{BootstrapError, DaemonError};

const HEALTH_TARGET: &str = "garnetd::health";

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked before start parameters are resolved for `root`.
    fn resolution_starting(&self, root: &Path);

    /// Invoked once start parameters for `root` are known.
    fn resolution_succeeded(&self, root: &Path, params: &ExecutionParameters);

    /// Invoked when start parameters for `root` could not be resolved.
    fn resolution_failed(&self, root: &Path, error: &DaemonError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn resolution_starting(&self, root: &Path) {
        (**self).resolution_starting(root);
    }

    fn resolution_succeeded(&self, root: &Path, params: &ExecutionParameters) {
        (**self).resolution_succeeded(root, params);
    }

    fn resolution_failed(&self, root: &Path, error: &DaemonError) {
        (**self).resolution_failed(root, error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            shell = %config.shell(),
            force_update = config.force_update(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn resolution_starting(&self, root: &Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "resolution_starting",
            root = %root.display(),
            "resolving solargraph start parameters"
        );
    }

    fn resolution_succeeded(&self, root: &Path, params: &ExecutionParameters) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "resolution_succeeded",
            root = %root.display(),
            command = %params.command(),
            arguments = ?params.arguments,
            environment = ?printable(&params.environment),
            "solargraph start parameters ready"
        );
    }

    fn resolution_failed(&self, root: &Path, error: &DaemonError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "resolution_failed",
            root = %root.display(),
            error = %error,
            "could not resolve solargraph start parameters"
        );
    }
}
