use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Category of a recovered, non-fatal problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Permission error, broken symlink or vanished entry during traversal
    Unreadable,
    /// Symlink pointing back to a directory on the current ancestor chain
    SymlinkCycle,
    /// Source file above the configured size limit
    FileTooLarge,
    /// Source file that could not be parsed
    Parse,
    /// Same qualified class name declared twice in one file
    DuplicateClass,
    /// Inference service failure or timeout
    Enrichment,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Unreadable => "unreadable",
            DiagnosticKind::SymlinkCycle => "symlink_cycle",
            DiagnosticKind::FileTooLarge => "file_too_large",
            DiagnosticKind::Parse => "parse",
            DiagnosticKind::DuplicateClass => "duplicate_class",
            DiagnosticKind::Enrichment => "enrichment",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recovered problem reported alongside the primary result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, path: Option<&Path>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.map(Path::to_path_buf),
            message: message.into(),
        }
    }

    pub fn unreadable(path: Option<&Path>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Unreadable, path, message)
    }

    pub fn symlink_cycle(path: &Path, ancestor: &Path) -> Self {
        Self::new(
            DiagnosticKind::SymlinkCycle,
            Some(path),
            format!("symlink loops back to ancestor {}", ancestor.display()),
        )
    }

    pub fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Parse, Some(path), message)
    }

    pub fn enrichment(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Enrichment, None, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "[{}] {}: {}", self.kind, path.display(), self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}
