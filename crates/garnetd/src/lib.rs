//! One-shot Solargraph launch resolution for Garnet.
//!
//! `garnetd` loads the layered configuration, initialises structured
//! telemetry on stderr, and runs the host's startup pipeline for the
//! configured project root. The resolved execution parameters are written to
//! stdout as a single JSON line, ready for an editor to spawn
//! `solargraph stdio` with.
//!
//! Health reporting hooks emit structured telemetry at each stage so
//! failures in the user's shell or the discovery script can be diagnosed
//! from the logs alone.

mod bootstrap;
mod health;
mod telemetry;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, DaemonError, StartReport, StaticConfigLoader,
    SystemConfigLoader, bootstrap, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};

/// Runs the daemon: bootstrap, resolve and report.
///
/// Errors are also written to `stderr`, since telemetry may not be
/// installed when bootstrap fails.
#[must_use]
pub fn run<W, E>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    stdout: &mut W,
    stderr: &mut E,
) -> ExitCode
where
    W: Write,
    E: Write,
{
    let outcome = bootstrap(loader, reporter)
        .map_err(DaemonError::from)
        .and_then(|daemon| daemon.report(stdout));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if let Err(write_error) = writeln!(stderr, "garnetd: {error}") {
                tracing::debug!(error = %write_error, "stderr unavailable");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
