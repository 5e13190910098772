//! The long-lived language server service of one project.
//!
//! A service starts its server lazily, the first time a document needs it,
//! using parameters from its [`ExecutionParamsProvider`]. It owns at most one
//! child process and terminates it when the project closes or the service is
//! dropped.
//!
//! Parameter resolution can take minutes, so it runs without holding the
//! service's state lock. Closing a project while its server is still starting
//! returns at once, and the late server is terminated as soon as it spawns.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capability::ServerOptions;
use crate::context::{DocumentContext, ProjectContext};
use crate::process::{ExecutionParameters, LaunchError, LaunchMode, ProcessLauncher};
use crate::startup::{ExecutionParamsProvider, StartupError};

const SERVICE_TARGET: &str = "garnet_host::service";

/// Time a server gets to exit on its own after stdin closes.
const EXIT_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Errors raised by a project service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Start parameters could not be resolved.
    #[error("failed to resolve server parameters: {0}")]
    Startup(#[from] StartupError),

    /// The server process could not be spawned.
    #[error("failed to launch server: {0}")]
    Launch(#[from] LaunchError),

    /// The server is not running.
    #[error("server for project '{project}' is not running")]
    NotRunning {
        /// Project identifier.
        project: String,
    },

    /// The service was stopped and accepts no further work.
    #[error("service for project '{project}' has been closed")]
    Closed {
        /// Project identifier.
        project: String,
    },
}

/// Observable state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// No server has been started yet.
    NotStarted,
    /// Start parameters are being resolved or the server is being spawned.
    Starting,
    /// A server process is running.
    Running {
        /// Operating-system process identifier.
        pid: u32,
    },
    /// The service has been stopped.
    Stopped,
}

enum ProcessState {
    NotStarted,
    Starting,
    Running { child: Child },
    Stopped,
}

/// One project's language server.
pub struct Service {
    project: ProjectContext,
    options: ServerOptions,
    provider: Arc<dyn ExecutionParamsProvider>,
    launcher: Arc<dyn ProcessLauncher>,
    state: Mutex<ProcessState>,
    transitions: Condvar,
    documents: Mutex<BTreeSet<PathBuf>>,
}

impl Service {
    /// Creates a service that has not started its server.
    #[must_use]
    pub fn new(
        project: ProjectContext,
        options: ServerOptions,
        provider: Arc<dyn ExecutionParamsProvider>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        Self {
            project,
            options,
            provider,
            launcher,
            state: Mutex::new(ProcessState::NotStarted),
            transitions: Condvar::new(),
            documents: Mutex::new(BTreeSet::new()),
        }
    }

    /// Project this service belongs to.
    #[must_use]
    pub const fn project(&self) -> &ProjectContext {
        &self.project
    }

    /// Feature flags sent to the server on initialization.
    #[must_use]
    pub const fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        match &*self.lock_state() {
            ProcessState::NotStarted => ServiceStatus::NotStarted,
            ProcessState::Starting => ServiceStatus::Starting,
            ProcessState::Running { child } => ServiceStatus::Running { pid: child.id() },
            ProcessState::Stopped => ServiceStatus::Stopped,
        }
    }

    /// Starts the server unless one is already running, and returns its
    /// process identifier.
    ///
    /// A server that has exited since it was started is replaced. Callers
    /// arriving while another start is in flight wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] after [`Self::stop`], or the startup
    /// or launch error that prevented the server from running.
    pub fn ensure_started(&self) -> Result<u32, ServiceError> {
        let mut state = self
            .transitions
            .wait_while(self.lock_state(), |current| {
                matches!(current, ProcessState::Starting)
            })
            .unwrap_or_else(PoisonError::into_inner);

        match &mut *state {
            ProcessState::Stopped => return Err(self.closed()),
            ProcessState::Running { child } => match child.try_wait() {
                Ok(None) => return Ok(child.id()),
                Ok(Some(status)) => {
                    warn!(
                        target: SERVICE_TARGET,
                        project = %self.project.id(),
                        ?status,
                        "solargraph exited; starting a new instance"
                    );
                }
                Err(error) => {
                    warn!(
                        target: SERVICE_TARGET,
                        project = %self.project.id(),
                        %error,
                        "failed to poll solargraph; starting a new instance"
                    );
                    terminate_child(child);
                }
            },
            ProcessState::NotStarted | ProcessState::Starting => {}
        }
        *state = ProcessState::Starting;
        drop(state);

        let launched = self
            .provider
            .provide_start_parameters(self.project.root())
            .map_err(ServiceError::from)
            .and_then(|params| {
                self.launcher
                    .spawn(&params, LaunchMode::UserShell)
                    .map_err(ServiceError::from)
            });
        let outcome = self.finish_start(launched);
        self.transitions.notify_all();
        outcome
    }

    /// Installs a freshly launched server, unless the service was stopped
    /// while it was starting.
    fn finish_start(&self, launched: Result<Child, ServiceError>) -> Result<u32, ServiceError> {
        let mut state = self.lock_state();
        let stopped = matches!(*state, ProcessState::Stopped);

        match launched {
            Ok(mut child) if stopped => {
                drop(state);
                debug!(
                    target: SERVICE_TARGET,
                    project = %self.project.id(),
                    pid = child.id(),
                    "service closed during startup; discarding solargraph"
                );
                terminate_child(&mut child);
                Err(self.closed())
            }
            Ok(child) => {
                let pid = child.id();
                info!(
                    target: SERVICE_TARGET,
                    project = %self.project.id(),
                    pid,
                    "solargraph started"
                );
                *state = ProcessState::Running { child };
                Ok(pid)
            }
            Err(error) => {
                if !stopped {
                    *state = ProcessState::NotStarted;
                }
                Err(error)
            }
        }
    }

    /// Resolves start parameters without launching the server.
    ///
    /// # Errors
    ///
    /// Returns the [`StartupError`] of the stage that failed.
    pub fn resolve_parameters(&self) -> Result<ExecutionParameters, StartupError> {
        self.provider.provide_start_parameters(self.project.root())
    }

    /// Runs `f` with the running server process.
    ///
    /// The protocol layer uses this to reach the child's stdio handles.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotRunning`] when no server is running.
    pub fn with_running<F, T>(&self, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Child) -> T,
    {
        let mut state = self.lock_state();
        match &mut *state {
            ProcessState::Running { child } => Ok(f(child)),
            ProcessState::NotStarted
            | ProcessState::Starting
            | ProcessState::Stopped => Err(ServiceError::NotRunning {
                project: self.project.id().to_string(),
            }),
        }
    }

    /// Stops the server and refuses further work. Idempotent.
    ///
    /// Never waits for an in-flight start; that server is terminated once it
    /// spawns.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lock_state(), ProcessState::Stopped);
        self.transitions.notify_all();
        if let ProcessState::Running { mut child } = previous {
            debug!(
                target: SERVICE_TARGET,
                project = %self.project.id(),
                pid = child.id(),
                "stopping solargraph"
            );
            terminate_child(&mut child);
        }
        self.lock_documents().clear();
    }

    /// Records that the project was opened. The server starts later, on the
    /// first document.
    pub fn did_open_project(&self) {
        debug!(
            target: SERVICE_TARGET,
            project = %self.project.id(),
            root = %self.project.root().display(),
            "project opened"
        );
    }

    /// Stops the service as the project closes.
    pub fn will_close_project(&self) {
        debug!(target: SERVICE_TARGET, project = %self.project.id(), "project closing");
        self.stop();
    }

    /// Tracks `document` and starts the server if needed.
    ///
    /// # Errors
    ///
    /// See [`Self::ensure_started`].
    pub fn did_open_document(&self, document: &DocumentContext) -> Result<(), ServiceError> {
        self.ensure_started()?;
        self.lock_documents().insert(document.path().to_path_buf());
        Ok(())
    }

    /// Stops tracking `document`.
    pub fn will_close_document(&self, document: &DocumentContext) {
        self.lock_documents().remove(document.path());
    }

    /// Documents currently open in this project.
    #[must_use]
    pub fn open_documents(&self) -> Vec<PathBuf> {
        self.lock_documents().iter().cloned().collect()
    }

    /// Whether `path` is tracked as open.
    #[must_use]
    pub fn is_open(&self, path: &Path) -> bool {
        self.lock_documents().contains(path)
    }

    fn closed(&self) -> ServiceError {
        ServiceError::Closed {
            project: self.project.id().to_string(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_documents(&self) -> MutexGuard<'_, BTreeSet<PathBuf>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Closes stdin so the server can exit, then kills it after a grace period.
fn terminate_child(child: &mut Child) {
    drop(child.stdin.take());

    if let Ok(Some(status)) = child.try_wait() {
        debug!(target: SERVICE_TARGET, ?status, "solargraph exited");
        return;
    }

    thread::sleep(EXIT_GRACE_PERIOD);
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(
                target: SERVICE_TARGET,
                ?status,
                "solargraph exited during grace period"
            );
        }
        Ok(None) | Err(_) => {
            warn!(
                target: SERVICE_TARGET,
                pid = child.id(),
                "solargraph did not exit; killing"
            );
            if let Err(error) = child.kill() {
                debug!(target: SERVICE_TARGET, %error, "kill failed");
            }
            if let Err(error) = child.wait() {
                debug!(target: SERVICE_TARGET, %error, "reaping failed");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::process::{Command, Stdio};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::context::ContentType;
    use crate::locator::LocateError;
    use crate::process::Environment;

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl ExecutionParamsProvider for CountingProvider {
        fn provide_start_parameters(
            &self,
            root: &Path,
        ) -> Result<ExecutionParameters, StartupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.fail {
                return Err(StartupError::Locate(LocateError::EmptyOutput));
            }
            Ok(ExecutionParameters::new(
                "solargraph",
                vec![String::from("stdio")],
                Environment::new(),
                root,
            ))
        }
    }

    /// Spawns `cat`, which lives until its stdin closes.
    struct CatLauncher;

    impl ProcessLauncher for CatLauncher {
        fn run_to_completion(
            &self,
            _params: &ExecutionParameters,
            _mode: LaunchMode,
            _timeout: Duration,
        ) -> Result<Vec<u8>, LaunchError> {
            Ok(Vec::new())
        }

        fn spawn(&self, params: &ExecutionParameters, mode: LaunchMode) -> Result<Child, LaunchError> {
            assert_eq!(mode, LaunchMode::UserShell);
            Command::new("cat")
                .current_dir(params.working_directory())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|source| LaunchError::spawn("cat", source))
        }
    }

    fn service(fail: bool) -> (Service, Arc<CountingProvider>) {
        slow_service(fail, Duration::ZERO)
    }

    fn slow_service(fail: bool, delay: Duration) -> (Service, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            fail,
            delay,
        });
        let service = Service::new(
            ProjectContext::new("app", std::env::temp_dir()),
            ServerOptions::default(),
            Arc::clone(&provider) as Arc<dyn ExecutionParamsProvider>,
            Arc::new(CatLauncher),
        );
        (service, provider)
    }

    #[fixture]
    fn document() -> DocumentContext {
        DocumentContext::new("/work/app/main.rb", None, ContentType::RubyScript)
    }

    #[rstest]
    fn starts_lazily_and_only_once(document: DocumentContext) {
        let (service, provider) = service(false);
        assert_eq!(service.status(), ServiceStatus::NotStarted);

        service.did_open_project();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

        service.did_open_document(&document).expect("server starts");
        let first = service.status();
        service.did_open_document(&document).expect("already running");

        assert!(matches!(first, ServiceStatus::Running { .. }));
        assert_eq!(service.status(), first);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(service.is_open(document.path()));
    }

    #[rstest]
    fn closing_the_project_stops_the_server(document: DocumentContext) {
        let (service, _provider) = service(false);
        service.did_open_document(&document).expect("server starts");

        service.will_close_project();

        assert_eq!(service.status(), ServiceStatus::Stopped);
        assert!(service.open_documents().is_empty());
        assert!(matches!(
            service.ensure_started(),
            Err(ServiceError::Closed { .. })
        ));
    }

    #[rstest]
    fn startup_failures_leave_the_service_restartable(document: DocumentContext) {
        let (service, provider) = service(true);

        let error = service
            .did_open_document(&document)
            .expect_err("startup fails");

        assert!(matches!(error, ServiceError::Startup(_)));
        assert_eq!(service.status(), ServiceStatus::NotStarted);
        assert!(!service.is_open(document.path()));

        assert!(service.ensure_started().is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    fn exposes_the_running_process(document: DocumentContext) {
        let (service, _provider) = service(false);
        assert!(matches!(
            service.with_running(|child| child.id()),
            Err(ServiceError::NotRunning { .. })
        ));

        let pid = service.ensure_started().expect("server starts");
        let seen = service.with_running(|child| child.id()).expect("running");

        assert_eq!(seen, pid);
        service.will_close_document(&document);
    }

    fn wait_for_first_call(provider: &CountingProvider) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while provider.calls.load(Ordering::SeqCst) == 0 {
            assert!(Instant::now() < deadline, "startup never began");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[rstest]
    fn stopping_does_not_wait_for_an_in_flight_start() {
        let (inner, provider) = slow_service(false, Duration::from_millis(1500));
        let service = Arc::new(inner);
        let starter = Arc::clone(&service);
        let start = thread::spawn(move || starter.ensure_started());
        wait_for_first_call(&provider);
        assert_eq!(service.status(), ServiceStatus::Starting);

        let began = Instant::now();
        service.stop();
        let stop_took = began.elapsed();

        assert!(stop_took < Duration::from_millis(500), "stop blocked for {stop_took:?}");
        let late = start.join().expect("start thread");
        assert!(matches!(late, Err(ServiceError::Closed { .. })));
        assert_eq!(service.status(), ServiceStatus::Stopped);
    }

    #[rstest]
    fn concurrent_starts_share_one_server() {
        let (inner, provider) = slow_service(false, Duration::from_millis(200));
        let service = Arc::new(inner);
        let first = Arc::clone(&service);
        let leader = thread::spawn(move || first.ensure_started());
        wait_for_first_call(&provider);

        let follower_pid = service.ensure_started().expect("waits for the leader");
        let leader_pid = leader
            .join()
            .expect("start thread")
            .expect("server starts");

        assert_eq!(follower_pid, leader_pid);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
