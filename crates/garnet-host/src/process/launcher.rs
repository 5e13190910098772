//! Launching child processes.

use std::borrow::Cow;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::error::LaunchError;
use super::params::ExecutionParameters;

/// Tracing target for process operations.
const PROCESS_TARGET: &str = "garnet_host::process";

/// Interval between exit polls while waiting on a child.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a launch request should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Execute `path` directly.
    Direct,
    /// Wrap the parameters in the user's login shell first.
    UserShell,
}

/// Runs commands on behalf of the host.
///
/// The production implementation is [`SystemLauncher`]. Tests implement this
/// trait to record requests and return canned output.
pub trait ProcessLauncher: Send + Sync {
    /// Runs a command to completion and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] when the command cannot be spawned, exits
    /// unsuccessfully, or exceeds `timeout`.
    fn run_to_completion(
        &self,
        params: &ExecutionParameters,
        mode: LaunchMode,
        timeout: Duration,
    ) -> Result<Vec<u8>, LaunchError>;

    /// Spawns a long-running command with piped stdin and stdout.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] when the command cannot be spawned.
    fn spawn(&self, params: &ExecutionParameters, mode: LaunchMode) -> Result<Child, LaunchError>;
}

/// Launches real child processes.
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    shell: String,
}

impl SystemLauncher {
    /// Creates a launcher that wraps user-shell requests in `shell`.
    #[must_use]
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// Shell used for [`LaunchMode::UserShell`].
    #[must_use]
    pub fn shell(&self) -> &str {
        self.shell.as_str()
    }

    fn resolve<'a>(
        &self,
        params: &'a ExecutionParameters,
        mode: LaunchMode,
    ) -> Result<Cow<'a, ExecutionParameters>, LaunchError> {
        match mode {
            LaunchMode::Direct => Ok(Cow::Borrowed(params)),
            LaunchMode::UserShell => params.in_user_shell(&self.shell).map(Cow::Owned),
        }
    }
}

impl ProcessLauncher for SystemLauncher {
    fn run_to_completion(
        &self,
        params: &ExecutionParameters,
        mode: LaunchMode,
        timeout: Duration,
    ) -> Result<Vec<u8>, LaunchError> {
        let resolved = self.resolve(params, mode)?;
        let program = resolved.path.as_str();

        debug!(
            target: PROCESS_TARGET,
            program,
            ?mode,
            argument_count = resolved.arguments.len(),
            directory = %resolved.working_directory().display(),
            "running process to completion"
        );

        let mut command = build_command(&resolved);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|source| LaunchError::spawn(program, source))?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = wait_for_exit(program, &mut child, timeout)?;
        let output = join_reader(program, stdout)?;
        let errors = join_reader(program, stderr)?;
        let stderr_text = String::from_utf8_lossy(&errors).trim().to_owned();

        if !stderr_text.is_empty() {
            debug!(
                target: PROCESS_TARGET,
                program,
                stderr = %stderr_text,
                "process stderr output"
            );
        }

        if status.success() {
            Ok(output)
        } else {
            Err(LaunchError::NonZeroExit {
                program: program.to_owned(),
                status: status.code().unwrap_or(-1),
                stderr: stderr_text,
            })
        }
    }

    fn spawn(&self, params: &ExecutionParameters, mode: LaunchMode) -> Result<Child, LaunchError> {
        let resolved = self.resolve(params, mode)?;
        let program = resolved.path.as_str();

        let mut command = build_command(&resolved);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let child = command
            .spawn()
            .map_err(|source| LaunchError::spawn(program, source))?;

        debug!(
            target: PROCESS_TARGET,
            program,
            ?mode,
            pid = child.id(),
            "process spawned"
        );

        Ok(child)
    }
}

fn build_command(params: &ExecutionParameters) -> Command {
    let mut command = Command::new(&params.path);
    command
        .args(&params.arguments)
        .envs(&params.environment)
        .current_dir(params.working_directory());
    command
}

fn spawn_reader<R>(mut reader: R) -> JoinHandle<std::io::Result<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).map(|_| buffer)
    })
}

fn join_reader(
    program: &str,
    handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
) -> Result<Vec<u8>, LaunchError> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };

    match handle.join() {
        Ok(result) => result.map_err(|source| LaunchError::io(program, source)),
        Err(_) => Err(LaunchError::io(
            program,
            std::io::Error::other("output reader panicked"),
        )),
    }
}

/// Waits for the child to exit, killing it once `timeout` elapses.
fn wait_for_exit(
    program: &str,
    child: &mut Child,
    timeout: Duration,
) -> Result<ExitStatus, LaunchError> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: PROCESS_TARGET,
                    program,
                    ?status,
                    elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "process exited"
                );
                return Ok(status);
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    warn!(
                        target: PROCESS_TARGET,
                        program,
                        timeout_secs = timeout.as_secs(),
                        "process timed out, killing it"
                    );
                    drop(child.kill());
                    drop(child.wait());
                    return Err(LaunchError::Timeout {
                        program: program.to_owned(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => return Err(LaunchError::io(program, source)),
        }
    }
}
