//! Code blocks extracted from a skill document.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared language of a fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Javascript,
    Typescript,
    Bash,
    Sql,
    Yaml,
    Json,
    Unknown,
}

impl Language {
    /// Resolve a fence tag through the alias table. Unrecognized tags map to
    /// [`Language::Unknown`].
    pub fn from_fence_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "py" | "python" | "python3" => Self::Python,
            "js" | "javascript" | "mjs" | "cjs" | "node" => Self::Javascript,
            "ts" | "typescript" => Self::Typescript,
            "bash" | "sh" | "shell" => Self::Bash,
            "sql" => Self::Sql,
            "yaml" | "yml" => Self::Yaml,
            "json" => Self::Json,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Bash => "bash",
            Self::Sql => "sql",
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Unknown => "unknown",
        }
    }

    /// Languages the sandbox can execute directly.
    pub fn is_directly_executable(&self) -> bool {
        matches!(self, Self::Python | Self::Javascript | Self::Bash)
    }

    /// Languages the mocking layer knows how to instrument.
    pub fn is_mockable(&self) -> bool {
        matches!(self, Self::Python | Self::Javascript)
    }

    /// The package index that owns this language's dependencies, if any.
    pub fn ecosystem(&self) -> Option<Ecosystem> {
        match self {
            Self::Python => Some(Ecosystem::Pypi),
            Self::Javascript | Self::Typescript => Some(Ecosystem::Npm),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public package index a dependency is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ecosystem {
    Npm,
    Pypi,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pypi => "pypi",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance marker carried by a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginTag {
    Official,
    Community,
}

impl OriginTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Community => "community",
        }
    }
}

/// One fenced code sample. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    language: Language,
    source_text: String,
    declared_packages: BTreeSet<String>,
    requires_credentials: bool,
    origin_tag: OriginTag,
}

impl CodeBlock {
    pub fn new(
        language: Language,
        source_text: impl Into<String>,
        declared_packages: BTreeSet<String>,
        requires_credentials: bool,
        origin_tag: OriginTag,
    ) -> Self {
        Self {
            language,
            source_text: source_text.into(),
            declared_packages,
            requires_credentials,
            origin_tag,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn declared_packages(&self) -> &BTreeSet<String> {
        &self.declared_packages
    }

    pub fn requires_credentials(&self) -> bool {
        self.requires_credentials
    }

    pub fn origin_tag(&self) -> OriginTag {
        self.origin_tag
    }

    /// Short label used in observations, e.g. `[python|official] block #2`.
    pub fn label(&self, index: usize) -> String {
        format!(
            "[{}|{}] block #{}",
            self.language,
            self.origin_tag.as_str(),
            index + 1
        )
    }
}
