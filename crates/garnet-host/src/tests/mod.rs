//! Crate-level integration and BDD tests.

use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::environment::{EnvironmentCapture, EnvironmentError};
use crate::locator::{LocateError, LocatorOutput, ServerLocator};
use crate::process::{Environment, ExecutionParameters, LaunchError, LaunchMode, ProcessLauncher};
use crate::resolver::{ConfigResolver, GLOBAL_CONFIG_VAR};
use crate::resources::{BundledResources, LINT_DISABLED_CONFIG, LINT_ENABLED_CONFIG};
use crate::startup::{StartupCollaborators, StartupOrchestrator, UpdateTrigger};


/// Environment capture that always reports the same variables.
struct FixedCapture;

impl EnvironmentCapture for FixedCapture {
    fn capture(&self, _directory: &Path) -> Result<Environment, EnvironmentError> {
        Ok(Environment::from([
            (String::from("PATH"), String::from("/gems/bin:/usr/bin")),
            (String::from("GEM_HOME"), String::from("/gems")),
        ]))
    }
}

/// Environment capture whose login shell exports a global configuration.
struct GlobalConfigCapture;

impl EnvironmentCapture for GlobalConfigCapture {
    fn capture(&self, _directory: &Path) -> Result<Environment, EnvironmentError> {
        Ok(Environment::from([
            (String::from("PATH"), String::from("/gems/bin:/usr/bin")),
            (GLOBAL_CONFIG_VAR.to_owned(), String::from("/home/dev/sg.yml")),
        ]))
    }
}

/// Locator answering with a fixed command, or failing.
struct FixedLocator {
    command: Option<String>,
    updates: Mutex<Vec<bool>>,
}

impl FixedLocator {
    fn answering(command: &str) -> Self {
        Self {
            command: Some(command.to_owned()),
            updates: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            command: None,
            updates: Mutex::new(Vec::new()),
        }
    }
}

impl ServerLocator for FixedLocator {
    fn locate(
        &self,
        _user_env: &Environment,
        _root: &Path,
        update: bool,
    ) -> Result<LocatorOutput, LocateError> {
        self.updates
            .lock()
            .expect("updates mutex poisoned")
            .push(update);
        let command = self.command.clone().ok_or(LocateError::EmptyOutput)?;
        let arguments = (command == "bundle")
            .then(|| vec![String::from("exec"), String::from("solargraph")]);
        Ok(LocatorOutput {
            command,
            environment: None,
            version: String::from("0.50.0"),
            arguments,
        })
    }
}

/// Launcher recording the arguments of every completed run.
#[derive(Default)]
struct RecordingLauncher {
    runs: Mutex<Vec<Vec<String>>>,
}

impl RecordingLauncher {
    fn subcommands(&self) -> Vec<String> {
        self.runs
            .lock()
            .expect("runs mutex poisoned")
            .iter()
            .filter_map(|args| args.last().cloned())
            .collect()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn run_to_completion(
        &self,
        params: &ExecutionParameters,
        _mode: LaunchMode,
        _timeout: Duration,
    ) -> Result<Vec<u8>, LaunchError> {
        self.runs
            .lock()
            .expect("runs mutex poisoned")
            .push(params.arguments.clone());
        Ok(Vec::new())
    }

    fn spawn(&self, params: &ExecutionParameters, _mode: LaunchMode) -> Result<Child, LaunchError> {
        Err(LaunchError::NonZeroExit {
            program: params.path.clone(),
            status: 127,
            stderr: String::from("spawning is not supported in tests"),
        })
    }
}

/// Writes both bundled configurations into `dir`.
fn seed_resources(dir: &Path) {
    for name in [LINT_ENABLED_CONFIG, LINT_DISABLED_CONFIG] {
        std::fs::write(dir.join(name), "reporters: []\n").expect("write bundled config");
    }
}

fn orchestrator(
    resources: &Path,
    locator: Arc<FixedLocator>,
    launcher: Arc<RecordingLauncher>,
    trigger: Arc<UpdateTrigger>,
) -> StartupOrchestrator {
    StartupOrchestrator::new(
        StartupCollaborators {
            environment: Arc::new(FixedCapture),
            locator,
            resolver: ConfigResolver::with_global_config_path(
                BundledResources::new(resources),
                None,
            ),
            launcher,
            maintenance_timeout: Duration::from_secs(1),
        },
        trigger,
    )
}

#[test]
fn registry_resolves_parameters_through_the_serializer() {
    use crate::context::ProjectContext;
    use crate::registry::ServiceRegistry;

    let resources = tempfile::TempDir::new().expect("resources dir");
    let project = tempfile::TempDir::new().expect("project dir");
    seed_resources(resources.path());

    let locator = Arc::new(FixedLocator::answering("bundle"));
    let launcher = Arc::new(RecordingLauncher::default());
    let trigger = Arc::new(UpdateTrigger::new());
    let registry = ServiceRegistry::new(
        Arc::new(orchestrator(
            resources.path(),
            Arc::clone(&locator),
            Arc::clone(&launcher),
            Arc::clone(&trigger),
        )),
        Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
        trigger,
    );
    let context = ProjectContext::new("app", project.path());

    registry.force_update();
    let service = registry.service_for_project(&context);
    service.resolve_parameters().expect("first request");
    service.resolve_parameters().expect("second request");

    assert_eq!(
        *locator.updates.lock().expect("updates mutex poisoned"),
        vec![true, false]
    );
    assert_eq!(
        launcher.subcommands(),
        vec!["download-core", "bundle", "download-core", "bundle"]
    );
}

#[test]
fn user_shell_global_config_keeps_the_bundled_override() {
    let resources = tempfile::TempDir::new().expect("resources dir");
    let project = tempfile::TempDir::new().expect("project dir");
    seed_resources(resources.path());
    let orchestrator = StartupOrchestrator::new(
        StartupCollaborators {
            environment: Arc::new(GlobalConfigCapture),
            locator: Arc::new(FixedLocator::answering("/gems/bin/solargraph")),
            resolver: ConfigResolver::with_global_config_path(
                BundledResources::new(resources.path()),
                None,
            ),
            launcher: Arc::new(RecordingLauncher::default()),
            maintenance_timeout: Duration::from_secs(1),
        },
        Arc::new(UpdateTrigger::new()),
    );

    let params = orchestrator.run(project.path()).expect("startup succeeds");

    assert_eq!(
        params.environment.get(GLOBAL_CONFIG_VAR).map(PathBuf::from),
        Some(resources.path().join(LINT_DISABLED_CONFIG))
    );
}
