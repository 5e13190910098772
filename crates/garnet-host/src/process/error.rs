//! Error types for process execution.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while launching or waiting on a child process.
#[derive(Debug, Clone, Error)]
pub enum LaunchError {
    /// The executable could not be found.
    #[error("executable not found: {program}")]
    NotFound {
        /// Program that was requested.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The process could not be spawned.
    #[error("failed to spawn '{program}': {source}")]
    SpawnFailed {
        /// Program that was requested.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Reading output from or waiting on the process failed.
    #[error("I/O error while running '{program}': {source}")]
    Io {
        /// Program being run.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The process did not finish within the allotted time and was killed.
    #[error("'{program}' timed out after {timeout_secs}s")]
    Timeout {
        /// Program being run.
        program: String,
        /// Timeout that elapsed, in seconds.
        timeout_secs: u64,
    },

    /// The process exited unsuccessfully.
    #[error("'{program}' exited with status {status}: {stderr}")]
    NonZeroExit {
        /// Program being run.
        program: String,
        /// Exit code, or `-1` when terminated by a signal.
        status: i32,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// A word could not be quoted for the shell because it contained a NUL
    /// byte. The word itself is not kept, since it may be a secret.
    #[error("cannot quote a word containing a NUL byte for the shell")]
    Unquotable,
}

impl LaunchError {
    /// Classifies a spawn failure for `program`.
    pub(crate) fn spawn(program: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                program: program.to_owned(),
                source: Arc::new(source),
            }
        } else {
            Self::SpawnFailed {
                program: program.to_owned(),
                source: Arc::new(source),
            }
        }
    }

    /// Wraps an I/O failure observed while `program` was running.
    pub(crate) fn io(program: &str, source: io::Error) -> Self {
        Self::Io {
            program: program.to_owned(),
            source: Arc::new(source),
        }
    }
}
