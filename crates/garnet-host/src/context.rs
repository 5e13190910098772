//! Project and document identities supplied by the editor.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Uniform type identifier the editor uses for Ruby sources.
pub const RUBY_SCRIPT_UTI: &str = "public.ruby-script";

/// File whose presence marks a directory as a Ruby project.
pub const GEMFILE: &str = "Gemfile";

/// Stable identifier of an open project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(String);

impl ProjectId {
    /// Wraps an editor-supplied identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An open project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectContext {
    id: ProjectId,
    root: PathBuf,
}

impl ProjectContext {
    /// Creates a context for the project rooted at `root`.
    #[must_use]
    pub fn new(id: impl Into<ProjectId>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    /// Project identifier.
    #[must_use]
    pub const fn id(&self) -> &ProjectId {
        &self.id
    }

    /// Project root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a file named exactly `Gemfile` sits directly in the root.
    ///
    /// The directory listing is compared byte-for-byte so case-insensitive
    /// filesystems do not match `gemfile`. Any I/O error yields `false`.
    #[must_use]
    pub fn has_gemfile(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return false;
        };

        entries
            .filter_map(Result::ok)
            .any(|entry| entry.file_name() == GEMFILE && entry.path().is_file())
    }
}

/// Content type of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Ruby source.
    RubyScript,
    /// Anything else, keyed by its type identifier.
    Other(String),
}

impl ContentType {
    /// Maps a uniform type identifier.
    #[must_use]
    pub fn from_uti(uti: &str) -> Self {
        if uti == RUBY_SCRIPT_UTI {
            Self::RubyScript
        } else {
            Self::Other(uti.to_owned())
        }
    }

    /// Infers the type from a file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let is_ruby_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| matches!(name, "Gemfile" | "Rakefile" | "Guardfile"));
        let is_ruby_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext, "rb" | "rake" | "gemspec" | "ru"));

        if is_ruby_name || is_ruby_extension {
            Self::RubyScript
        } else {
            Self::Other(
                path.extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
        }
    }

    /// Whether this is Ruby source.
    #[must_use]
    pub const fn is_ruby(&self) -> bool {
        matches!(self, Self::RubyScript)
    }
}

/// An open document and the project it belongs to, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentContext {
    path: PathBuf,
    project: Option<ProjectContext>,
    content_type: ContentType,
}

impl DocumentContext {
    /// Creates a document context.
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        project: Option<ProjectContext>,
        content_type: ContentType,
    ) -> Self {
        Self {
            path: path.into(),
            project,
            content_type,
        }
    }

    /// Creates a context whose content type is inferred from `path`.
    #[must_use]
    pub fn for_path(location: impl Into<PathBuf>, project: Option<ProjectContext>) -> Self {
        let path = location.into();
        let content_type = ContentType::from_path(&path);
        Self::new(path, project, content_type)
    }

    /// Document location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Owning project.
    #[must_use]
    pub const fn project(&self) -> Option<&ProjectContext> {
        self.project.as_ref()
    }

    /// Document content type.
    #[must_use]
    pub const fn content_type(&self) -> &ContentType {
        &self.content_type
    }
}

/// Whether the host should serve `project`, optionally for `document`.
///
/// True for Ruby documents, and for any project whose root holds a
/// `Gemfile`.
#[must_use]
pub fn serves(project: &ProjectContext, document: Option<&DocumentContext>) -> bool {
    document.is_some_and(|doc| doc.content_type().is_ruby()) || project.has_gemfile()
}
