//! Analysis configuration, loaded from `archscope.toml`.
//!
//! Every section is optional; missing keys fall back to defaults. Invalid
//! values are rejected by [`Config::validate`] before any traversal starts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArchError, Result};

pub const CONFIG_FILENAME: &str = "archscope.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ignore: IgnoreRules,
    pub analysis: AnalysisSettings,
    pub enrichment: EnrichmentSettings,
    pub diagram: DiagramSettings,
}

impl Config {
    /// Loads `explicit` if given, else `<root>/archscope.toml` if present, else defaults.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        let candidate = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = root.join(CONFIG_FILENAME);
                default_path.is_file().then_some(default_path)
            }
        };

        match candidate {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    ArchError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                tracing::debug!("Loaded config from {}", path.display());
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.ignore.validate()?;

        if self.analysis.max_depth == 0 {
            return Err(ArchError::Config("analysis.max_depth must be at least 1".to_string()));
        }
        if self.analysis.threads == Some(0) {
            return Err(ArchError::Config("analysis.threads must be at least 1".to_string()));
        }

        let e = &self.enrichment;
        if e.batch_size == 0 {
            return Err(ArchError::Config("enrichment.batch_size must be at least 1".to_string()));
        }
        if e.max_in_flight == 0 {
            return Err(ArchError::Config(
                "enrichment.max_in_flight must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&e.min_confidence) {
            return Err(ArchError::Config(format!(
                "enrichment.min_confidence must be within [0, 1], got {}",
                e.min_confidence
            )));
        }
        if e.enabled && e.endpoint.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(ArchError::Config(
                "enrichment is enabled but enrichment.endpoint is not set".to_string(),
            ));
        }

        if self.diagram.max_nodes == 0 {
            return Err(ArchError::Config("diagram.max_nodes must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Checks that `root` is an existing directory and returns its canonical path.
    pub fn resolve_root(root: &Path) -> Result<PathBuf> {
        let canonical = root
            .canonicalize()
            .map_err(|_| ArchError::InvalidRoot(root.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(ArchError::InvalidRoot(root.to_path_buf()));
        }
        Ok(canonical)
    }
}

/// Traversal filters.
///
/// `context_files` is an override layered on top of the blocklists: a name in
/// that set is always captured (as context-only) even when `dirs`, `files` or
/// `.gitignore` would reject it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreRules {
    pub dirs: BTreeSet<String>,
    pub files: BTreeSet<String>,
    /// Extensions (without the dot) of files parsed for classes
    pub source_extensions: BTreeSet<String>,
    pub context_files: BTreeSet<String>,
    pub context_extensions: BTreeSet<String>,
    pub respect_gitignore: bool,
}

impl IgnoreRules {
    pub fn validate(&self) -> Result<()> {
        if self.source_extensions.is_empty() {
            return Err(ArchError::Config(
                "ignore.source_extensions must name at least one extension".to_string(),
            ));
        }
        for ext in self.source_extensions.iter().chain(&self.context_extensions) {
            if ext.is_empty() || ext.contains('.') || ext.contains('/') || ext.contains('\\') {
                return Err(ArchError::Config(format!(
                    "invalid extension {:?}: use the bare extension, e.g. \"py\"",
                    ext
                )));
            }
        }
        for name in self.dirs.iter().chain(&self.files).chain(&self.context_files) {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(ArchError::Config(format!(
                    "invalid ignore entry {:?}: entries are plain file or directory names",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.dirs.contains(name)
    }

    pub fn is_ignored_file(&self, name: &str) -> bool {
        self.files.contains(name)
    }

    pub fn is_context_name(&self, name: &str) -> bool {
        self.context_files.contains(name)
    }

    pub fn is_source_extension(&self, ext: &str) -> bool {
        self.source_extensions.contains(ext)
    }

    pub fn is_context_extension(&self, ext: &str) -> bool {
        self.context_extensions.contains(ext)
    }
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            dirs: set(&[
                ".git", ".hg", ".svn", ".idea", ".vscode", "__pycache__", "node_modules",
                "target", "dist", "build", "coverage", ".venv", "venv", "env", ".tox", ".nox",
                ".cache", ".pytest_cache", ".mypy_cache", "site-packages", "htmlcov",
                "vendor", "third_party", "migrations", "static", "staticfiles", "assets",
                ".eggs", "eggs", "wheels", "__pypackages__", ".archscope",
            ]),
            files: set(&[
                ".DS_Store", "Thumbs.db", "desktop.ini", "package-lock.json", "yarn.lock",
                "pnpm-lock.yaml", "poetry.lock", "Pipfile.lock", "composer.lock", ".env",
                ".env.local", ".env.production", ".coverage", ".gitattributes",
                ".editorconfig",
            ]),
            source_extensions: set(&["py", "pyi", "java"]),
            context_files: set(&[
                "Dockerfile", "docker-compose.yml", "docker-compose.yaml", "Makefile",
                "Justfile", "Procfile", "Vagrantfile", "requirements.txt", "Pipfile",
                "pyproject.toml", "setup.py", "setup.cfg", "package.json", "tsconfig.json",
                "pom.xml", "build.gradle", "alembic.ini", ".env.example", ".gitignore",
                "README", "README.md", "CHANGELOG", "CHANGELOG.md", "CONTRIBUTING",
            ]),
            context_extensions: set(&["md", "rst", "toml", "ini", "cfg", "yml", "yaml"]),
            respect_gitignore: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub max_depth: usize,
    /// Source files larger than this (bytes) are skipped with a diagnostic
    pub max_file_size: u64,
    /// Parser worker threads; `None` uses all available cores
    pub threads: Option<usize>,
    /// Drop directories left empty after filtering (the root is always kept)
    pub prune_empty_dirs: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_file_size: 100_000,
            threads: None,
            prune_empty_dirs: true,
        }
    }
}

impl AnalysisSettings {
    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub enabled: bool,
    /// OpenAI-compatible base URL, e.g. `http://localhost:11434/v1`
    pub endpoint: Option<String>,
    pub model: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub request_timeout_secs: u64,
    pub overall_timeout_secs: u64,
    pub min_confidence: f32,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "ARCHSCOPE_API_KEY".to_string(),
            batch_size: 20,
            max_in_flight: 4,
            request_timeout_secs: 60,
            overall_timeout_secs: 300,
            min_confidence: 0.5,
        }
    }
}

impl EnrichmentSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }

    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    #[default]
    Mermaid,
    Plantuml,
}

impl DiagramFormat {
    pub fn file_extension(&self) -> &'static str {
        match self {
            DiagramFormat::Mermaid => "mmd",
            DiagramFormat::Plantuml => "puml",
        }
    }
}

impl std::str::FromStr for DiagramFormat {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mermaid" | "mmd" => Ok(DiagramFormat::Mermaid),
            "plantuml" | "puml" => Ok(DiagramFormat::Plantuml),
            other => Err(ArchError::Config(format!("unknown diagram format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagramSettings {
    pub format: DiagramFormat,
    pub max_nodes: usize,
    pub max_members: usize,
    pub min_connections: usize,
}

impl Default for DiagramSettings {
    fn default() -> Self {
        Self {
            format: DiagramFormat::Mermaid,
            max_nodes: 100,
            max_members: 8,
            min_connections: 1,
        }
    }
}
