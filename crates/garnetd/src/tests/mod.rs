//! Unit tests for daemon bootstrap and reporting.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use mockall::mock;
use ortho_config::{OrthoConfig, OrthoError};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use garnet_config::Config;
use garnet_host::{
    Environment, ExecutionParameters, ExecutionParamsProvider, ProcessLauncher, ServiceRegistry,
    StartupError, SystemLauncher, UpdateTrigger,
};

use crate::{
    BootstrapError, ConfigLoader, DaemonError, HealthReporter, StaticConfigLoader, bootstrap_with,
    run,
};

mock! {
    Provider {}
    impl ExecutionParamsProvider for Provider {
        fn provide_start_parameters(&self, root: &Path) -> Result<ExecutionParameters, StartupError>;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed,
    ResolutionStarting,
    ResolutionSucceeded,
    ResolutionFailed,
}

#[derive(Default)]
struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    fn events(&self) -> Vec<HealthEvent> {
        self.events.lock().expect("events mutex poisoned").clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events.lock().expect("events mutex poisoned").push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, _error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed);
    }

    fn resolution_starting(&self, _root: &Path) {
        self.record(HealthEvent::ResolutionStarting);
    }

    fn resolution_succeeded(&self, _root: &Path, _params: &ExecutionParameters) {
        self.record(HealthEvent::ResolutionSucceeded);
    }

    fn resolution_failed(&self, _root: &Path, _error: &DaemonError) {
        self.record(HealthEvent::ResolutionFailed);
    }
}

/// Loader that fails by passing an unparsable timeout.
struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(vec![
            OsString::from("garnetd"),
            OsString::from("--locate-timeout-secs"),
            OsString::from("soon"),
        ])
    }
}

struct Fixture {
    project: TempDir,
    reporter: Arc<RecordingHealthReporter>,
    trigger: Arc<UpdateTrigger>,
}

impl Fixture {
    fn loader(&self, force_update: bool) -> StaticConfigLoader {
        StaticConfigLoader::new(Config {
            project_root: Some(self.project.path().to_path_buf()),
            force_update: Some(force_update),
            ..Config::default()
        })
    }

    fn registry(&self, provider: MockProvider) -> ServiceRegistry {
        ServiceRegistry::new(
            Arc::new(provider),
            Arc::new(SystemLauncher::new("/bin/sh")) as Arc<dyn ProcessLauncher>,
            Arc::clone(&self.trigger),
        )
    }

    fn add_gemfile(&self) {
        fs::write(
            self.project.path().join("Gemfile"),
            "source 'https://rubygems.org'\n",
        )
        .expect("write Gemfile");
    }
}

#[fixture]
fn fixture() -> Fixture {
    Fixture {
        project: TempDir::new().expect("project dir"),
        reporter: Arc::new(RecordingHealthReporter::default()),
        trigger: Arc::new(UpdateTrigger::new()),
    }
}

fn answering_provider() -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_provide_start_parameters().returning(|root| {
        Ok(ExecutionParameters::new(
            "bundle",
            vec![
                String::from("exec"),
                String::from("solargraph"),
                String::from("stdio"),
            ],
            Environment::new(),
            root,
        ))
    });
    provider
}

#[rstest]
fn bootstrap_reports_success_without_resolving(fixture: Fixture) {
    let mut provider = MockProvider::new();
    provider.expect_provide_start_parameters().never();

    bootstrap_with(&fixture.loader(false), fixture.reporter.clone(), |_| {
        fixture.registry(provider)
    })
    .expect("bootstrap should succeed");

    assert_eq!(
        fixture.reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapSucceeded]
    );
    assert!(!fixture.trigger.is_armed());
}

#[rstest]
fn configured_force_update_arms_the_trigger(fixture: Fixture) {
    bootstrap_with(&fixture.loader(true), fixture.reporter.clone(), |_| {
        fixture.registry(MockProvider::new())
    })
    .expect("bootstrap should succeed");

    assert!(fixture.trigger.is_armed());
}

#[rstest]
fn configuration_failures_are_reported(fixture: Fixture) {
    let result = bootstrap_with(&FailingConfigLoader, fixture.reporter.clone(), |_| {
        fixture.registry(MockProvider::new())
    });

    assert!(matches!(result, Err(BootstrapError::Configuration { .. })));
    assert_eq!(
        fixture.reporter.events(),
        vec![HealthEvent::BootstrapStarting, HealthEvent::BootstrapFailed]
    );
}

#[rstest]
fn report_writes_one_json_line(fixture: Fixture) {
    fixture.add_gemfile();
    let daemon = bootstrap_with(&fixture.loader(false), fixture.reporter.clone(), |_| {
        fixture.registry(answering_provider())
    })
    .expect("bootstrap should succeed");

    let mut out = Vec::new();
    daemon.report(&mut out).expect("report should succeed");

    let text = String::from_utf8(out).expect("report is UTF-8");
    assert_eq!(text.lines().count(), 1);
    let report: serde_json::Value = serde_json::from_str(&text).expect("report is JSON");
    assert_eq!(
        report["parameters"]["arguments"],
        serde_json::json!(["exec", "solargraph", "stdio"])
    );
    assert_eq!(report["initialization_options"]["completion"], true);
    assert!(
        fixture
            .reporter
            .events()
            .contains(&HealthEvent::ResolutionSucceeded)
    );
}

#[rstest]
fn projects_without_a_gemfile_are_rejected(fixture: Fixture) {
    let mut provider = MockProvider::new();
    provider.expect_provide_start_parameters().never();
    let daemon = bootstrap_with(&fixture.loader(false), fixture.reporter.clone(), |_| {
        fixture.registry(provider)
    })
    .expect("bootstrap should succeed");

    let error = daemon
        .resolve(fixture.project.path())
        .expect_err("resolution should fail");

    assert!(matches!(error, DaemonError::NotServed { .. }));
    assert!(
        fixture
            .reporter
            .events()
            .contains(&HealthEvent::ResolutionFailed)
    );
}

#[rstest]
fn run_writes_failures_to_stderr(fixture: Fixture) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let _code = run(
        &FailingConfigLoader,
        fixture.reporter.clone(),
        &mut stdout,
        &mut stderr,
    );

    assert!(stdout.is_empty());
    let message = String::from_utf8(stderr).expect("stderr is UTF-8");
    assert!(message.starts_with("garnetd: failed to load configuration"));
}
