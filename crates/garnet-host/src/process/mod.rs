//! Host-side process execution.
//!
//! Everything Garnet runs, from the login shell that reports the user's
//! environment to the language server itself, goes through a
//! [`ProcessLauncher`]. The production [`SystemLauncher`] spawns real child
//! processes with piped stdio and enforces timeouts; tests substitute
//! recording doubles so no external tooling is required.
//!
//! [`ExecutionParameters`] is the fully resolved launch specification. When a
//! launch is requested in [`LaunchMode::UserShell`], the parameters are first
//! wrapped in a login-shell invocation so version managers and rc files take
//! effect before the command runs.

mod error;
mod launcher;
mod params;
mod shell;

pub use error::LaunchError;
pub use launcher::{LaunchMode, ProcessLauncher, SystemLauncher};
pub(crate) use params::quote;
pub use params::{Environment, ExecutionParameters};
pub use shell::ShellKind;
