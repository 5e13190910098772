//! Bundled helper files shipped alongside the host.
//!
//! The discovery script and the two default Solargraph configurations are
//! referenced by name and resolved against a resource directory at runtime.

use std::path::{Path, PathBuf};

/// Discovery script that locates or installs Solargraph.
pub const LOCATE_SCRIPT: &str = "locate_solargraph.sh";

/// Default configuration with RuboCop diagnostics enabled.
pub const LINT_ENABLED_CONFIG: &str = "solargraph.yml";

/// Default configuration with RuboCop diagnostics disabled.
pub const LINT_DISABLED_CONFIG: &str = "solargraph_no_rubocop.yml";

/// Directory holding the bundled resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledResources {
    root: PathBuf,
}

impl BundledResources {
    /// Uses `root` as the resource directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Finds the resource directory.
    ///
    /// An explicit override wins. Otherwise `share/garnet` next to the
    /// running executable's parent directory is used when present, falling
    /// back to the `resources` directory of this crate's source tree.
    #[must_use]
    pub fn discover(explicit: Option<&Path>) -> Self {
        if let Some(root) = explicit {
            return Self::new(root);
        }

        let installed = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
            .map(|prefix| prefix.join("share").join("garnet"))
            .filter(|dir| dir.is_dir());

        installed.map_or_else(
            || Self::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("resources")),
            Self::new,
        )
    }

    /// Resource directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Path to the named resource, if it exists as a file.
    #[must_use]
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let candidate = self.root.join(name);
        candidate.is_file().then_some(candidate)
    }
}
