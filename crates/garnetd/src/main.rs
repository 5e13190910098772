//! Entry point for the Garnet daemon.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use garnetd::{StructuredHealthReporter, SystemConfigLoader};

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    garnetd::run(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &mut stdout,
        &mut stderr,
    )
}
