//! Shell flavour detection.

use std::path::Path;

/// Families of login shells that need different invocation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    /// GNU Bash.
    Bash,
    /// Z shell.
    Zsh,
    /// The friendly interactive shell.
    Fish,
    /// `tcsh` or `csh`, which reject `-l` alongside `-c`.
    Csh,
    /// Nushell, which needs `^` to call external commands.
    Nu,
    /// Any other POSIX-style shell.
    Posix,
}

impl ShellKind {
    /// Detects the shell family from an executable path such as `/bin/zsh`.
    #[must_use]
    pub fn detect(shell: &str) -> Self {
        let name = Path::new(shell)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();

        match name {
            "bash" => Self::Bash,
            "zsh" => Self::Zsh,
            "fish" => Self::Fish,
            "tcsh" | "csh" => Self::Csh,
            "nu" => Self::Nu,
            _ => Self::Posix,
        }
    }

    /// Text placed before a script that starts with `KEY=VALUE` assignments.
    ///
    /// The csh family has no assignment prefix syntax, so the script is run
    /// through `env` instead.
    #[must_use]
    pub const fn assignment_prefix(self) -> &'static str {
        match self {
            Self::Csh => "env ",
            Self::Bash | Self::Zsh | Self::Fish | Self::Nu | Self::Posix => "",
        }
    }

    /// Flags that run `script` as a login shell command.
    #[must_use]
    pub fn command_arguments(self, script: String) -> Vec<String> {
        match self {
            Self::Csh => vec![String::from("-c"), script],
            Self::Bash | Self::Zsh | Self::Fish | Self::Nu | Self::Posix => {
                vec![String::from("-l"), String::from("-c"), script]
            }
        }
    }
}
