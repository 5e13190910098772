use std::path::PathBuf;
use std::time::Duration;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Shell used when neither the configuration nor `$SHELL` names one.
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Seconds allowed for capturing the user's login-shell environment.
pub const DEFAULT_ENVIRONMENT_TIMEOUT_SECS: u64 = 10;

/// Seconds allowed for the discovery script, which may install gems.
pub const DEFAULT_LOCATE_TIMEOUT_SECS: u64 = 300;

/// Seconds allowed for documentation updates and project indexing.
pub const DEFAULT_MAINTENANCE_TIMEOUT_SECS: u64 = 600;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Project root used by the daemon when none is configured.
#[must_use]
pub fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

/// Timeouts applied to the external processes spawned during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTimeouts {
    /// Login-shell environment capture.
    pub environment: Duration,
    /// Discovery script execution.
    pub locate: Duration,
    /// Best-effort maintenance steps.
    pub maintenance: Duration,
}

impl Default for ProcessTimeouts {
    fn default() -> Self {
        Self {
            environment: Duration::from_secs(DEFAULT_ENVIRONMENT_TIMEOUT_SECS),
            locate: Duration::from_secs(DEFAULT_LOCATE_TIMEOUT_SECS),
            maintenance: Duration::from_secs(DEFAULT_MAINTENANCE_TIMEOUT_SECS),
        }
    }
}
