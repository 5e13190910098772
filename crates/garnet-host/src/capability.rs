//! Editor features advertised to Solargraph during initialization.

use serde::{Deserialize, Serialize};

/// Solargraph feature switch sent in the initialization options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServerFeature {
    /// Format on save.
    Autoformat,
    /// Completion items.
    Completion,
    /// Go to definition.
    Definitions,
    /// Diagnostics reporting.
    Diagnostics,
    /// Folding ranges.
    Folding,
    /// Document formatting.
    Formatting,
    /// Hover documentation.
    Hover,
    /// Find references.
    References,
    /// Symbol rename.
    Rename,
    /// Document and workspace symbols.
    Symbols,
}

impl ServerFeature {
    /// Every feature, in option-key order.
    pub const ALL: [Self; 10] = [
        Self::Autoformat,
        Self::Completion,
        Self::Definitions,
        Self::Diagnostics,
        Self::Folding,
        Self::Formatting,
        Self::Hover,
        Self::References,
        Self::Rename,
        Self::Symbols,
    ];

    /// Key used in the initialization options object.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Autoformat => "autoformat",
            Self::Completion => "completion",
            Self::Definitions => "definitions",
            Self::Diagnostics => "diagnostics",
            Self::Folding => "folding",
            Self::Formatting => "formatting",
            Self::Hover => "hover",
            Self::References => "references",
            Self::Rename => "rename",
            Self::Symbols => "symbols",
        }
    }
}

/// Feature flags passed to Solargraph as initialization options.
///
/// The defaults enable completion, diagnostics and hover only; the other
/// features are served by the editor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "mirrors Solargraph's flat initialization options object"
)]
pub struct ServerOptions {
    /// Format on save.
    pub autoformat: bool,
    /// Completion items.
    pub completion: bool,
    /// Go to definition.
    pub definitions: bool,
    /// Diagnostics reporting.
    pub diagnostics: bool,
    /// Folding ranges.
    pub folding: bool,
    /// Document formatting.
    pub formatting: bool,
    /// Hover documentation.
    pub hover: bool,
    /// Find references.
    pub references: bool,
    /// Symbol rename.
    pub rename: bool,
    /// Document and workspace symbols.
    pub symbols: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            autoformat: false,
            completion: true,
            definitions: false,
            diagnostics: true,
            folding: false,
            formatting: false,
            hover: true,
            references: false,
            rename: false,
            symbols: false,
        }
    }
}

impl ServerOptions {
    /// Whether `feature` is switched on.
    #[must_use]
    pub const fn is_enabled(&self, feature: ServerFeature) -> bool {
        match feature {
            ServerFeature::Autoformat => self.autoformat,
            ServerFeature::Completion => self.completion,
            ServerFeature::Definitions => self.definitions,
            ServerFeature::Diagnostics => self.diagnostics,
            ServerFeature::Folding => self.folding,
            ServerFeature::Formatting => self.formatting,
            ServerFeature::Hover => self.hover,
            ServerFeature::References => self.references,
            ServerFeature::Rename => self.rename,
            ServerFeature::Symbols => self.symbols,
        }
    }

    /// Features that are switched on.
    pub fn enabled(&self) -> impl Iterator<Item = ServerFeature> + '_ {
        ServerFeature::ALL
            .into_iter()
            .filter(|feature| self.is_enabled(*feature))
    }

    /// Initialization options as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let object = ServerFeature::ALL
            .into_iter()
            .map(|feature| {
                (
                    feature.key().to_owned(),
                    serde_json::Value::Bool(self.is_enabled(feature)),
                )
            })
            .collect();
        serde_json::Value::Object(object)
    }
}
