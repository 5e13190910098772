//! Selection of the Solargraph configuration for a project.
//!
//! Projects that bring their own `.solargraph.yml`, and users with a global
//! configuration, are left alone. Everyone else gets one of the bundled
//! configurations, chosen by whether the project configures RuboCop.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::process::Environment;
use crate::resources::{BundledResources, LINT_DISABLED_CONFIG, LINT_ENABLED_CONFIG};

const RESOLVER_TARGET: &str = "garnet_host::resolver";

/// Environment variable Solargraph reads its global configuration path from.
pub const GLOBAL_CONFIG_VAR: &str = "SOLARGRAPH_GLOBAL_CONFIG";

/// Project-local Solargraph configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".solargraph.yml";

/// Project-local RuboCop configuration file.
pub const RUBOCOP_CONFIG_FILE: &str = ".rubocop.yml";

/// Filesystem and environment facts the decision depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigInputs {
    /// The project root holds a `.solargraph.yml`.
    pub local_config: bool,
    /// The user has a global Solargraph configuration.
    pub global_config: bool,
    /// The project root holds a `.rubocop.yml`.
    pub rubocop_config: bool,
}

/// Outcome of the configuration decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChoice {
    /// Leave Solargraph's own configuration lookup untouched.
    Keep,
    /// Point Solargraph at the bundled lint-enabled configuration.
    LintEnabled,
    /// Point Solargraph at the bundled lint-disabled configuration.
    LintDisabled,
}

impl ConfigChoice {
    /// Bundled resource backing the choice, if any.
    #[must_use]
    pub const fn resource(self) -> Option<&'static str> {
        match self {
            Self::Keep => None,
            Self::LintEnabled => Some(LINT_ENABLED_CONFIG),
            Self::LintDisabled => Some(LINT_DISABLED_CONFIG),
        }
    }
}

impl ConfigInputs {
    /// Applies the decision table; the first matching row wins.
    #[must_use]
    pub const fn decide(self) -> ConfigChoice {
        if self.local_config || self.global_config {
            ConfigChoice::Keep
        } else if self.rubocop_config {
            ConfigChoice::LintEnabled
        } else {
            ConfigChoice::LintDisabled
        }
    }
}

/// Computes the configuration override for a project.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    resources: BundledResources,
    global_config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a resolver using the user's home directory for the global
    /// configuration lookup.
    #[must_use]
    pub fn new(resources: BundledResources) -> Self {
        let global_config_path = dirs::home_dir().map(|home| {
            home.join(".config")
                .join("solargraph")
                .join("config.yml")
        });
        Self::with_global_config_path(resources, global_config_path)
    }

    /// Creates a resolver with an explicit global configuration path.
    #[must_use]
    pub fn with_global_config_path(
        resources: BundledResources,
        global_config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            resources,
            global_config_path,
        }
    }

    /// Gathers the decision inputs for `root`.
    #[must_use]
    pub fn inputs(&self, locator_env: &Environment, root: &Path) -> ConfigInputs {
        let global_file = self
            .global_config_path
            .as_deref()
            .is_some_and(Path::is_file);

        ConfigInputs {
            local_config: root.join(LOCAL_CONFIG_FILE).is_file(),
            global_config: locator_env.contains_key(GLOBAL_CONFIG_VAR) || global_file,
            rubocop_config: root.join(RUBOCOP_CONFIG_FILE).is_file(),
        }
    }

    /// Environment additions for `root`: either empty, or
    /// `SOLARGRAPH_GLOBAL_CONFIG` pointing at a bundled configuration.
    ///
    /// A missing bundled file yields no override.
    #[must_use]
    pub fn resolve(&self, locator_env: &Environment, root: &Path) -> Environment {
        let inputs = self.inputs(locator_env, root);
        let choice = inputs.decide();
        let override_path = choice
            .resource()
            .and_then(|name| self.resources.locate(name));

        debug!(
            target: RESOLVER_TARGET,
            root = %root.display(),
            ?inputs,
            ?choice,
            overridden = override_path.is_some(),
            "resolved solargraph configuration"
        );

        override_path
            .map(|path| {
                Environment::from([(GLOBAL_CONFIG_VAR.to_owned(), path.display().to_string())])
            })
            .unwrap_or_default()
    }
}
