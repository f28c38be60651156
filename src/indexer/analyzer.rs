use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{AnalysisSettings, Config, IgnoreRules};
use crate::error::{ArchError, Result};
use crate::indexer::extractor::{ClassExtractor, ExtractionResult};
use crate::indexer::progress::AnalysisProgress;
use crate::indexer::walker::FileWalker;
use crate::languages::LanguageRegistry;
use crate::model::{ClassEntity, Diagnostic, DiagnosticKind, FileSystemNode};

/// Merged result of walking and parsing one project root.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectAnalysis {
    pub root: PathBuf,
    pub tree: FileSystemNode,
    pub classes: Vec<ClassEntity>,
    /// Always present, empty on a clean run
    pub diagnostics: Vec<Diagnostic>,
}

impl ProjectAnalysis {
    pub fn class(&self, qualified_name: &str) -> Option<&ClassEntity> {
        self.classes.iter().find(|c| c.qualified_name == qualified_name)
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    /// Re-annotates tree nodes with the qualified names declared in each file.
    fn annotate_tree(&mut self) {
        let mut by_file: HashMap<PathBuf, Vec<String>> = HashMap::new();
        for class in &self.classes {
            by_file
                .entry(self.root.join(&class.module))
                .or_default()
                .push(class.qualified_name.clone());
        }
        for (path, names) in by_file {
            if let Some(node) = self.tree.find_mut(&path) {
                node.classes = names;
            }
        }
    }
}

pub struct ProjectAnalyzer {
    rules: IgnoreRules,
    settings: AnalysisSettings,
    progress: AnalysisProgress,
}

impl ProjectAnalyzer {
    pub fn new(config: &Config) -> Self {
        Self {
            rules: config.ignore.clone(),
            settings: config.analysis.clone(),
            progress: AnalysisProgress::new(),
        }
    }

    pub fn with_progress(mut self, progress: AnalysisProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &AnalysisProgress {
        &self.progress
    }

    /// Walks `root`, parses every source file on a bounded worker pool and
    /// merges the per-file results in tree order.
    pub fn analyze(&self, root: &Path, cancel: &CancellationToken) -> Result<ProjectAnalysis> {
        let root = Config::resolve_root(root)?;
        let walked = FileWalker::new(self.rules.clone(), self.settings.clone()).walk(&root)?;
        if cancel.is_cancelled() {
            return Err(ArchError::Cancelled);
        }

        let files: Vec<PathBuf> = walked
            .tree
            .source_files()
            .into_iter()
            .map(Path::to_path_buf)
            .collect();
        info!("Parsing {} source files", files.len());

        let results = self.parse_all(&root, &files, cancel)?;

        let mut diagnostics = walked.diagnostics;
        let mut classes = Vec::new();
        for result in results {
            diagnostics.extend(result.diagnostics);
            classes.extend(result.file.classes);
        }
        let (classes, duplicates) = dedupe_across_files(classes);
        diagnostics.extend(duplicates);

        let mut analysis = ProjectAnalysis {
            root,
            tree: walked.tree,
            classes,
            diagnostics,
        };
        analysis.annotate_tree();

        info!(
            "Analyzed {} files: {} classes, {} diagnostics",
            files.len(),
            analysis.classes.len(),
            analysis.diagnostics.len()
        );
        Ok(analysis)
    }

    /// Single-file analysis; the file's directory stands in for the root.
    pub fn analyze_file(&self, path: &Path) -> Result<ExtractionResult> {
        let path = path
            .canonicalize()
            .map_err(|_| ArchError::InvalidRoot(path.to_path_buf()))?;
        if !path.is_file() {
            return Err(ArchError::InvalidRoot(path));
        }
        let root = path.parent().unwrap_or(Path::new("/")).to_path_buf();
        Ok(ClassExtractor::new(LanguageRegistry::new(), root).extract(&path))
    }

    fn parse_all(
        &self,
        root: &Path,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<Vec<ExtractionResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.worker_threads())
            .build()
            .map_err(|e| ArchError::Config(format!("Failed to start parser pool: {}", e)))?;

        self.progress.start(files.len());
        let progress = &self.progress;

        // Each worker gets its own extractor; results keep file order.
        let results: Vec<Option<ExtractionResult>> = pool.install(|| {
            files
                .par_iter()
                .map_init(
                    || ClassExtractor::new(LanguageRegistry::new(), root),
                    |extractor, file| {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let result = extractor.extract(file);
                        if result.is_parse_failure() {
                            progress.inc_error();
                        } else {
                            progress.inc(result.file.classes.len());
                        }
                        Some(result)
                    },
                )
                .collect()
        });
        self.progress.finish();

        if cancel.is_cancelled() {
            warn!("Analysis cancelled during parsing");
            return Err(ArchError::Cancelled);
        }
        Ok(results.into_iter().flatten().collect())
    }
}

/// Later definitions of a qualified name replace earlier ones.
fn dedupe_across_files(classes: Vec<ClassEntity>) -> (Vec<ClassEntity>, Vec<Diagnostic>) {
    let mut last_seen: HashMap<&str, usize> = HashMap::new();
    for (index, class) in classes.iter().enumerate() {
        last_seen.insert(class.qualified_name.as_str(), index);
    }
    if last_seen.len() == classes.len() {
        return (classes, Vec::new());
    }

    let keep: Vec<bool> = classes
        .iter()
        .enumerate()
        .map(|(index, class)| last_seen.get(class.qualified_name.as_str()) == Some(&index))
        .collect();
    let winners: HashMap<String, String> = classes
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .map(|(c, _)| (c.qualified_name.clone(), c.module.clone()))
        .collect();

    let mut diagnostics = Vec::new();
    let mut kept = Vec::with_capacity(winners.len());
    for (class, keep) in classes.into_iter().zip(keep) {
        if keep {
            kept.push(class);
            continue;
        }
        let winner = winners.get(&class.qualified_name).cloned().unwrap_or_default();
        let diagnostic = Diagnostic::new(
            DiagnosticKind::DuplicateClass,
            Some(Path::new(&class.module)),
            format!("{} is redefined in {}; this definition is ignored", class.qualified_name, winner),
        );
        warn!("{}", diagnostic);
        diagnostics.push(diagnostic);
    }
    (kept, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn analyze(root: &Path) -> ProjectAnalysis {
        ProjectAnalyzer::new(&Config::default())
            .analyze(root, &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_analyze_merges_in_tree_order() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "b.py", "class Base:\n    pass\n");
        create_file(temp_dir.path(), "a.py", "class Foo(Base):\n    x = None\n");
        create_file(temp_dir.path(), "pkg/__init__.py", "");
        create_file(temp_dir.path(), "pkg/models.py", "class User:\n    pass\n");

        let analysis = analyze(temp_dir.path());
        let names: Vec<_> = analysis.classes.iter().map(|c| c.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["pkg.models.User", "a.Foo", "b.Base"]);
        assert!(analysis.diagnostics.is_empty());

        let file = analysis.tree.children.iter().find(|c| c.name == "a.py").unwrap();
        assert_eq!(file.classes, vec!["a.Foo"]);
        assert!(analysis.class("b.Base").is_some());
    }

    #[test]
    fn test_partial_failure_counts() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..9 {
            create_file(
                temp_dir.path(),
                &format!("m{}.py", i),
                &format!("class C{}:\n    pass\n", i),
            );
        }
        create_file(temp_dir.path(), "zz_broken.py", "class Broken(:\n");

        let analyzer = ProjectAnalyzer::new(&Config::default());
        let analysis = analyzer.analyze(temp_dir.path(), &CancellationToken::new()).unwrap();
        assert_eq!(analysis.classes.len(), 9);
        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics_of(DiagnosticKind::Parse).count(), 1);

        let snap = analyzer.progress().snapshot();
        assert_eq!(snap.files_processed, 10);
        assert_eq!(snap.parse_errors, 1);
        assert_eq!(snap.classes_extracted, 9);
    }

    #[test]
    fn test_cancelled_before_parsing() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a.py", "class A: pass\n");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ProjectAnalyzer::new(&Config::default())
            .analyze(temp_dir.path(), &cancel)
            .unwrap_err();
        assert!(matches!(err, ArchError::Cancelled));
    }

    #[test]
    fn test_invalid_root_is_fatal() {
        let err = ProjectAnalyzer::new(&Config::default())
            .analyze(Path::new("/definitely/not/here"), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ArchError::InvalidRoot(_)));
    }

    #[test]
    fn test_duplicate_across_files_later_wins() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "app/A.java", "package app;\nclass Dup { int first; }\n");
        create_file(temp_dir.path(), "app/B.java", "package app;\nclass Dup { int second; }\n");

        let analysis = analyze(temp_dir.path());
        assert_eq!(analysis.classes.len(), 1);
        assert!(analysis.classes[0].field("second").is_some());
        assert_eq!(analysis.diagnostics_of(DiagnosticKind::DuplicateClass).count(), 1);
    }

    #[test]
    fn test_analyze_file() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "svc.py", "import os\nclass Service:\n    pass\n");

        let result = ProjectAnalyzer::new(&Config::default())
            .analyze_file(&temp_dir.path().join("svc.py"))
            .unwrap();
        assert_eq!(result.file.classes[0].qualified_name, "svc.Service");
        assert_eq!(result.file.imports, vec!["os"]);
    }
}
