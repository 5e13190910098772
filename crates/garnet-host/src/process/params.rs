//! Fully resolved launch specification.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::LaunchError;
use super::shell::ShellKind;

/// Environment variables keyed by name. Ordered so generated shell text is
/// deterministic.
pub type Environment = BTreeMap<String, String>;

/// Everything the process layer needs to start a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParameters {
    /// Executable path, or shell text when the parameters target a user shell.
    pub path: String,
    /// Arguments following the executable.
    pub arguments: Vec<String>,
    /// Variables set for the child in addition to the inherited environment.
    pub environment: Environment,
    /// Directory the child starts in.
    pub working_directory: PathBuf,
}

impl ExecutionParameters {
    /// Builds a launch specification.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        arguments: Vec<String>,
        environment: Environment,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            path: path.into(),
            arguments,
            environment,
            working_directory: working_directory.into(),
        }
    }

    /// Working directory as a path.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        self.working_directory.as_path()
    }

    /// The command `path` runs, without its leading `KEY=VALUE` assignments.
    ///
    /// Assignment values may hold credentials, so this is the form that
    /// reaches logs. Unparsable shell text yields an empty string.
    #[must_use]
    pub fn command(&self) -> String {
        let Some(words) = shlex::split(&self.path) else {
            return String::new();
        };
        words
            .into_iter()
            .skip_while(|word| {
                word.split_once('=')
                    .is_some_and(|(key, _)| self.environment.contains_key(key))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Wraps these parameters in a login-shell invocation of `shell`.
    ///
    /// `path` is used verbatim as the head of the shell script so that any
    /// `KEY=VALUE` prefixes it carries apply to the command. Shells without
    /// that syntax run the script through `env`. Arguments are quoted
    /// individually.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Unquotable`] when an argument contains a NUL
    /// byte.
    pub fn in_user_shell(&self, shell: &str) -> Result<Self, LaunchError> {
        let kind = ShellKind::detect(shell);
        let mut script = String::from(kind.assignment_prefix());
        script.push_str(&self.path);
        for argument in &self.arguments {
            script.push(' ');
            script.push_str(&quote(argument)?);
        }

        Ok(Self {
            path: shell.to_owned(),
            arguments: kind.command_arguments(script),
            environment: self.environment.clone(),
            working_directory: self.working_directory.clone(),
        })
    }
}

/// Quotes a single word for POSIX shells.
pub(crate) fn quote(word: &str) -> Result<String, LaunchError> {
    shlex::try_quote(word)
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| LaunchError::Unquotable)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn parameters() -> ExecutionParameters {
        let environment = Environment::from([(String::from("X"), String::from("1"))]);
        ExecutionParameters::new(
            "X=1 bundle",
            vec![
                String::from("exec"),
                String::from("solargraph"),
                String::from("stdio"),
            ],
            environment,
            "/work/app",
        )
    }

    #[rstest]
    #[case("/bin/zsh", &["-l", "-c", "X=1 bundle exec solargraph stdio"])]
    #[case("/bin/bash", &["-l", "-c", "X=1 bundle exec solargraph stdio"])]
    #[case("/bin/tcsh", &["-c", "env X=1 bundle exec solargraph stdio"])]
    #[case("/bin/csh", &["-c", "env X=1 bundle exec solargraph stdio"])]
    fn wraps_in_login_shell(
        parameters: ExecutionParameters,
        #[case] shell: &str,
        #[case] expected: &[&str],
    ) {
        let wrapped = parameters
            .in_user_shell(shell)
            .expect("arguments are quotable");

        assert_eq!(wrapped.path, shell);
        assert_eq!(wrapped.arguments, expected);
        assert_eq!(wrapped.environment, parameters.environment);
        assert_eq!(wrapped.working_directory(), Path::new("/work/app"));
    }

    #[rstest]
    fn quotes_arguments_with_spaces(mut parameters: ExecutionParameters) {
        parameters.arguments = vec![String::from("two words")];

        let wrapped = parameters
            .in_user_shell("/bin/bash")
            .expect("arguments are quotable");

        let script = wrapped.arguments.last().expect("script argument");
        assert_eq!(
            shlex::split(script),
            Some(vec![
                String::from("X=1"),
                String::from("bundle"),
                String::from("two words"),
            ])
        );
    }

    #[rstest]
    fn rejects_nul_bytes(mut parameters: ExecutionParameters) {
        parameters.arguments = vec![String::from("bad\0word")];

        let error = parameters
            .in_user_shell("/bin/sh")
            .expect_err("NUL bytes cannot be quoted");

        assert!(matches!(error, LaunchError::Unquotable));
    }

    #[rstest]
    fn command_drops_environment_assignments() {
        let environment = Environment::from([(
            String::from("BUNDLE_GITHUB__COM"),
            String::from("x-access-token:ghp_hidden"),
        )]);
        let parameters = ExecutionParameters::new(
            "BUNDLE_GITHUB__COM=x-access-token:ghp_hidden /gems/bin/solargraph",
            vec![String::from("stdio")],
            environment,
            "/work/app",
        );

        assert_eq!(parameters.command(), "/gems/bin/solargraph");
    }

    #[rstest]
    fn command_keeps_plain_paths(parameters: ExecutionParameters) {
        let plain = ExecutionParameters::new(
            "/bin/zsh",
            Vec::new(),
            parameters.environment,
            "/work/app",
        );

        assert_eq!(plain.command(), "/bin/zsh");
    }
}
