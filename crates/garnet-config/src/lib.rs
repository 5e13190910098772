//! Layered configuration shared by the Garnet host library and daemon.
//!
//! Values are resolved by `ortho_config` from built-in defaults, an optional
//! `garnet.toml` file, `GARNET_*` environment variables and command-line
//! flags, in increasing order of precedence. Every field is optional in the
//! merged layers; the accessors apply the defaults from [`defaults`] so
//! callers never see an unset value.

mod defaults;
mod logging;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_ENVIRONMENT_TIMEOUT_SECS, DEFAULT_LOCATE_TIMEOUT_SECS, DEFAULT_LOG_FILTER,
    DEFAULT_MAINTENANCE_TIMEOUT_SECS, FALLBACK_SHELL, ProcessTimeouts, default_log_filter,
    default_log_format, default_project_root,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration for the Garnet binaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "GARNET")]
pub struct Config {
    /// `tracing` filter expression such as `info` or `garnet_host=debug`.
    pub log_filter: Option<String>,
    /// Output format for structured logs.
    pub log_format: Option<LogFormat>,
    /// Directory holding the discovery script and bundled server configs.
    pub resource_dir: Option<PathBuf>,
    /// Login shell used for environment capture and server launches.
    pub shell: Option<String>,
    /// Timeout for environment capture, in seconds.
    pub environment_timeout_secs: Option<u64>,
    /// Timeout for the discovery script, in seconds.
    pub locate_timeout_secs: Option<u64>,
    /// Timeout for each maintenance step, in seconds.
    pub maintenance_timeout_secs: Option<u64>,
    /// Project root the daemon resolves start parameters for.
    pub project_root: Option<PathBuf>,
    /// Forces the discovery script to reinstall or update the server.
    pub force_update: Option<bool>,
}

impl Config {
    /// Log filter expression, falling back to [`DEFAULT_LOG_FILTER`].
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format, falling back to JSON.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Explicit resource directory, when configured.
    #[must_use]
    pub fn resource_dir(&self) -> Option<&Path> {
        self.resource_dir.as_deref()
    }

    /// Shell used to run commands in the user's environment.
    ///
    /// Prefers the configured value, then `$SHELL`, then [`FALLBACK_SHELL`].
    #[must_use]
    pub fn shell(&self) -> String {
        self.shell
            .clone()
            .filter(|shell| !shell.trim().is_empty())
            .or_else(|| std::env::var("SHELL").ok().filter(|shell| !shell.is_empty()))
            .unwrap_or_else(|| FALLBACK_SHELL.to_owned())
    }

    /// Project root for the daemon's one-shot resolution.
    #[must_use]
    pub fn project_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .unwrap_or_else(default_project_root)
    }

    /// Whether the next parameter request should force an update.
    #[must_use]
    pub fn force_update(&self) -> bool {
        self.force_update.unwrap_or(false)
    }

    /// Timeouts for the external processes spawned during startup.
    #[must_use]
    pub fn timeouts(&self) -> ProcessTimeouts {
        let defaults = ProcessTimeouts::default();
        ProcessTimeouts {
            environment: self
                .environment_timeout_secs
                .map_or(defaults.environment, Duration::from_secs),
            locate: self
                .locate_timeout_secs
                .map_or(defaults.locate, Duration::from_secs),
            maintenance: self
                .maintenance_timeout_secs
                .map_or(defaults.maintenance, Duration::from_secs),
        }
    }
}
