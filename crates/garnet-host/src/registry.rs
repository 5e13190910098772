//! One service per open project.
//!
//! The registry is the host's entry point. It answers whether a project is
//! Ruby at all, hands out the project's service, and routes the editor's
//! lifecycle notifications to it. Services are created on first use and
//! removed when their project closes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use garnet_config::Config;
use tracing::debug;

use crate::capability::ServerOptions;
use crate::context::{self, DocumentContext, ProjectContext, ProjectId};
use crate::environment::ShellEnvironment;
use crate::locator::ScriptLocator;
use crate::process::{ProcessLauncher, SystemLauncher};
use crate::resolver::ConfigResolver;
use crate::resources::BundledResources;
use crate::serializer::RequestSerializer;
use crate::service::{Service, ServiceError};
use crate::startup::{
    ExecutionParamsProvider, SerializedProvider, StartupCollaborators, StartupOrchestrator,
    UpdateTrigger,
};

const REGISTRY_TARGET: &str = "garnet_host::registry";

/// Owns the services of every open project.
pub struct ServiceRegistry {
    services: Mutex<HashMap<ProjectId, Arc<Service>>>,
    serializer: Arc<RequestSerializer<ProjectId>>,
    provider: Arc<dyn ExecutionParamsProvider>,
    launcher: Arc<dyn ProcessLauncher>,
    trigger: Arc<UpdateTrigger>,
    options: ServerOptions,
}

impl ServiceRegistry {
    /// Creates a registry whose services resolve parameters through
    /// `provider` and launch servers through `launcher`.
    ///
    /// `trigger` must be the one `provider` consumes.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ExecutionParamsProvider>,
        launcher: Arc<dyn ProcessLauncher>,
        trigger: Arc<UpdateTrigger>,
    ) -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            serializer: Arc::new(RequestSerializer::new()),
            provider,
            launcher,
            trigger,
            options: ServerOptions::default(),
        }
    }

    /// Creates a registry backed by the real shell, discovery script and
    /// bundled configurations.
    #[must_use]
    pub fn with_system_collaborators(config: &Config) -> Self {
        let shell = config.shell();
        let timeouts = config.timeouts();
        let resources = BundledResources::discover(config.resource_dir());
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(SystemLauncher::new(shell.clone()));
        let trigger = Arc::new(UpdateTrigger::new());

        debug!(
            target: REGISTRY_TARGET,
            shell = %shell,
            resources = %resources.root().display(),
            "using system collaborators"
        );

        let collaborators = StartupCollaborators {
            environment: Arc::new(ShellEnvironment::new(
                shell,
                Arc::clone(&launcher),
                timeouts.environment,
            )),
            locator: Arc::new(ScriptLocator::new(
                resources.clone(),
                Arc::clone(&launcher),
                timeouts.locate,
            )),
            resolver: ConfigResolver::new(resources),
            launcher: Arc::clone(&launcher),
            maintenance_timeout: timeouts.maintenance,
        };
        let orchestrator = StartupOrchestrator::new(collaborators, Arc::clone(&trigger));

        Self::new(Arc::new(orchestrator), launcher, trigger)
    }

    /// Whether the host handles `project`, optionally for `document`.
    #[must_use]
    #[expect(
        clippy::unused_self,
        reason = "the registry is the editor-facing entry point for the filter"
    )]
    pub fn serves(&self, project: &ProjectContext, document: Option<&DocumentContext>) -> bool {
        context::serves(project, document)
    }

    /// Returns the project's service, creating it on first use.
    ///
    /// Creating a service does not start a server.
    #[must_use]
    pub fn service_for_project(&self, project: &ProjectContext) -> Arc<Service> {
        let mut services = self.lock_services();
        if let Some(existing) = services.get(project.id()) {
            return Arc::clone(existing);
        }

        let provider = SerializedProvider::new(
            project.id().clone(),
            Arc::clone(&self.serializer),
            Arc::clone(&self.provider),
        );
        let service = Arc::new(Service::new(
            project.clone(),
            self.options,
            Arc::new(provider),
            Arc::clone(&self.launcher),
        ));
        services.insert(project.id().clone(), Arc::clone(&service));

        debug!(
            target: REGISTRY_TARGET,
            project = %project.id(),
            root = %project.root().display(),
            "service registered"
        );
        service
    }

    /// Returns the service of the document's project, if it has one.
    #[must_use]
    pub fn service_for_document(&self, document: &DocumentContext) -> Option<Arc<Service>> {
        document
            .project()
            .map(|project| self.service_for_project(project))
    }

    /// Removes the project's service and stops its server.
    ///
    /// Parameter requests already queued for the project still complete.
    pub fn close_project(&self, project: &ProjectContext) {
        let removed = self.lock_services().remove(project.id());
        self.serializer.retire(project.id());

        if let Some(service) = removed {
            service.will_close_project();
            debug!(target: REGISTRY_TARGET, project = %project.id(), "service removed");
        }
    }

    /// Forces the next parameter request to update the server.
    pub fn force_update(&self) {
        debug!(target: REGISTRY_TARGET, "server update requested");
        self.trigger.arm();
    }

    /// Registers the project's service.
    pub fn did_open_project(&self, project: &ProjectContext) {
        self.service_for_project(project).did_open_project();
    }

    /// Closes the project's service.
    pub fn will_close_project(&self, project: &ProjectContext) {
        self.close_project(project);
    }

    /// Routes an opened document to its project's service, starting the
    /// server if needed. Documents without a project are ignored.
    ///
    /// # Errors
    ///
    /// Returns the [`ServiceError`] raised while starting the server.
    pub fn did_open_document(&self, document: &DocumentContext) -> Result<(), ServiceError> {
        match self.service_for_document(document) {
            Some(service) => service.did_open_document(document),
            None => Ok(()),
        }
    }

    /// Routes a closing document to its project's service.
    pub fn will_close_document(&self, document: &DocumentContext) {
        if let Some(service) = self.service_for_document(document) {
            service.will_close_document(document);
        }
    }

    /// Moves a document from `old` to `new`, for example after a rename or
    /// a change of owning project.
    ///
    /// # Errors
    ///
    /// See [`Self::did_open_document`].
    pub fn did_change_document_context(
        &self,
        old: &DocumentContext,
        new: &DocumentContext,
    ) -> Result<(), ServiceError> {
        self.will_close_document(old);
        self.did_open_document(new)
    }

    /// Number of registered services.
    #[must_use]
    pub fn project_count(&self) -> usize {
        self.lock_services().len()
    }

    fn lock_services(&self) -> MutexGuard<'_, HashMap<ProjectId, Arc<Service>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
