//! Per-project Solargraph lifecycle management for Garnet.
//!
//! The crate decides whether a project is Ruby, keeps one language-server
//! service per open project, and works out how to launch Solargraph for it.
//! Launching is expensive and environment-sensitive, so parameter resolution
//! runs as a pipeline:
//!
//! 1. capture the user's login-shell environment in the project root;
//! 2. run the bundled discovery script to find (or install) Solargraph;
//! 3. choose a Solargraph configuration based on the project's files;
//! 4. assemble shell-ready execution parameters for `solargraph stdio`;
//! 5. refresh core documentation and the bundle index, best effort.
//!
//! Requests for the same project are serialized, so concurrent editor
//! notifications never run the pipeline twice at once.
//!
//! # Example
//!
//! ```rust,no_run
//! use garnet_config::Config;
//! use garnet_host::{ProjectContext, ServiceRegistry};
//!
//! let registry = ServiceRegistry::with_system_collaborators(&Config::default());
//! let project = ProjectContext::new("blog", "/work/blog");
//!
//! if registry.serves(&project, None) {
//!     let service = registry.service_for_project(&project);
//!     // Resolve without launching, or call `ensure_started` to spawn.
//!     let _params = service.resolve_parameters();
//! }
//! ```

pub mod builder;
pub mod capability;
pub mod context;
pub mod environment;
pub mod locator;
pub mod process;
pub mod registry;
pub mod resolver;
pub mod resources;
pub mod serializer;
pub mod service;
pub mod startup;

#[cfg(test)]
mod tests;

pub use self::builder::{BuildError, Maintenance, MaintenanceError, ServerInstallation, Subcommand};
pub use self::capability::{ServerFeature, ServerOptions};
pub use self::context::{ContentType, DocumentContext, ProjectContext, ProjectId, serves};
pub use self::environment::{EnvironmentCapture, EnvironmentError, ShellEnvironment};
pub use self::locator::{LocateError, LocatorOutput, ScriptLocator, ServerLocator};
pub use self::process::{
    Environment, ExecutionParameters, LaunchError, LaunchMode, ProcessLauncher, SystemLauncher,
};
pub use self::registry::ServiceRegistry;
pub use self::resolver::{ConfigChoice, ConfigInputs, ConfigResolver};
pub use self::resources::BundledResources;
pub use self::serializer::{RequestSerializer, SerializerError, Ticket};
pub use self::service::{Service, ServiceError, ServiceStatus};
pub use self::startup::{
    ExecutionParamsProvider, SerializedProvider, StartupCollaborators, StartupError,
    StartupOrchestrator, StartupStage, StartupState, UpdateTrigger,
};
