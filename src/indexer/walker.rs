use std::path::Path;
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use tracing::{debug, info, warn};

use crate::config::{AnalysisSettings, IgnoreRules};
use crate::error::Result;
use crate::model::{Diagnostic, DiagnosticKind, FileRole, FileSystemNode};

/// Tree produced by one traversal plus the entries that had to be skipped.
#[derive(Debug)]
pub struct WalkResult {
    pub tree: FileSystemNode,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct FileWalker {
    rules: Arc<IgnoreRules>,
    settings: AnalysisSettings,
}

impl FileWalker {
    pub fn new(rules: IgnoreRules, settings: AnalysisSettings) -> Self {
        Self {
            rules: Arc::new(rules),
            settings,
        }
    }

    /// Walks `root` (already canonical) into a sorted tree.
    ///
    /// Per-entry failures become diagnostics; traversal never aborts for a
    /// single bad entry.
    pub fn walk(&self, root: &Path) -> Result<WalkResult> {
        let gitignore = Arc::new(self.load_gitignore(root));
        let filter = EntryFilter {
            rules: Arc::clone(&self.rules),
            gitignore,
        };
        let classify = filter.clone();

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(true)
            .max_depth(Some(self.settings.max_depth))
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |t| t.is_dir());
                filter.accepts(entry.path(), is_dir)
            })
            .build();

        let mut diagnostics = Vec::new();
        // stack[d] is the open directory at depth d
        let mut stack: Vec<FileSystemNode> = Vec::new();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    let diagnostic = diagnostic_for(&err, None);
                    warn!("{}", diagnostic);
                    diagnostics.push(diagnostic);
                    continue;
                }
            };

            let depth = entry.depth();
            let path = entry.path();
            while stack.len() > depth.max(1) {
                close_directory(&mut stack);
            }

            let Some(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                let mut node = FileSystemNode::directory(path);
                if depth > 0 && depth >= self.settings.max_depth && has_entries(path, &classify) {
                    debug!("Depth limit reached at {}", path.display());
                    node.truncated = true;
                }
                stack.push(node);
                continue;
            }

            if !file_type.is_file() {
                debug!("Skipping special file {}", path.display());
                continue;
            }

            let Some(role) = classify.role(path) else {
                continue;
            };
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    let diagnostic = diagnostic_for(&err, Some(path));
                    warn!("{}", diagnostic);
                    diagnostics.push(diagnostic);
                    continue;
                }
            };
            if role == FileRole::Source && size > self.settings.max_file_size {
                let diagnostic = Diagnostic::new(
                    DiagnosticKind::FileTooLarge,
                    Some(path),
                    format!("{} bytes exceeds limit of {}", size, self.settings.max_file_size),
                );
                warn!("{}", diagnostic);
                diagnostics.push(diagnostic);
                continue;
            }

            if let Some(parent) = stack.last_mut() {
                parent.children.push(FileSystemNode::file(path, size, role));
            }
        }

        while stack.len() > 1 {
            close_directory(&mut stack);
        }
        let mut tree = stack
            .pop()
            .unwrap_or_else(|| FileSystemNode::directory(root));
        tree.sort_children();
        if self.settings.prune_empty_dirs {
            prune_empty(&mut tree);
        }

        info!(
            "Walked {}: {} files, {} diagnostics",
            root.display(),
            tree.file_count(),
            diagnostics.len()
        );
        Ok(WalkResult { tree, diagnostics })
    }

    fn load_gitignore(&self, root: &Path) -> Gitignore {
        if !self.rules.respect_gitignore {
            return Gitignore::empty();
        }
        let mut builder = GitignoreBuilder::new(root);
        if let Some(err) = builder.add(root.join(".gitignore")) {
            // a missing .gitignore is the common case
            debug!("No usable .gitignore: {}", err);
        }
        builder.build().unwrap_or_else(|err| {
            warn!("Ignoring malformed .gitignore: {}", err);
            Gitignore::empty()
        })
    }
}

#[derive(Clone)]
struct EntryFilter {
    rules: Arc<IgnoreRules>,
    gitignore: Arc<Gitignore>,
}

impl EntryFilter {
    fn accepts(&self, path: &Path, is_dir: bool) -> bool {
        if is_dir {
            let name = file_name(path);
            return !self.rules.is_ignored_dir(&name)
                && !self.gitignore.matched(path, true).is_ignore();
        }
        self.role(path).is_some()
    }

    /// Parseable sources win. The context-name override only rescues files
    /// that the blocklist, `.gitignore` or the extension allowlist would drop.
    fn role(&self, path: &Path) -> Option<FileRole> {
        let name = file_name(path);
        let ignored =
            self.rules.is_ignored_file(&name) || self.gitignore.matched(path, false).is_ignore();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !ignored && self.rules.is_source_extension(ext) {
            return Some(FileRole::Source);
        }
        if self.rules.is_context_name(&name) {
            return Some(FileRole::Context);
        }
        if !ignored && self.rules.is_context_extension(ext) {
            Some(FileRole::Context)
        } else {
            None
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn close_directory(stack: &mut Vec<FileSystemNode>) {
    if let Some(mut done) = stack.pop() {
        done.sort_children();
        if let Some(parent) = stack.last_mut() {
            parent.children.push(done);
        }
    }
}

/// True when `path` holds at least one entry the filter would keep.
fn has_entries(path: &Path, filter: &EntryFilter) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let child = entry.path();
        filter.accepts(&child, child.is_dir())
    })
}

/// Drops directories with nothing captured beneath them. Truncated
/// directories stay so the depth cut remains visible.
fn prune_empty(node: &mut FileSystemNode) {
    for child in &mut node.children {
        if child.is_dir() {
            prune_empty(child);
        }
    }
    node.children
        .retain(|c| !c.is_dir() || c.truncated || !c.children.is_empty());
}

fn diagnostic_for(err: &ignore::Error, path: Option<&Path>) -> Diagnostic {
    match err {
        ignore::Error::Loop { ancestor, child } => Diagnostic::symlink_cycle(child, ancestor),
        ignore::Error::WithPath { path, err } => diagnostic_for(err, Some(path)),
        ignore::Error::WithDepth { err, .. } => diagnostic_for(err, path),
        ignore::Error::WithLineNumber { err, .. } => diagnostic_for(err, path),
        other => Diagnostic::unreadable(path, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;
    use std::fs;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn walk_with(root: &Path, settings: AnalysisSettings) -> WalkResult {
        let root = root.canonicalize().unwrap();
        FileWalker::new(IgnoreRules::default(), settings).walk(&root).unwrap()
    }

    fn walk(root: &Path) -> WalkResult {
        walk_with(root, AnalysisSettings::default())
    }

    fn names(node: &FileSystemNode) -> Vec<&str> {
        node.children.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_walk_builds_sorted_tree() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "zeta.py", "");
        create_file(temp_dir.path(), "Alpha.java", "");
        create_file(temp_dir.path(), "pkg/models.py", "class A: pass");
        create_file(temp_dir.path(), "lib/util.py", "");

        let result = walk(temp_dir.path());
        assert!(result.diagnostics.is_empty());
        assert_eq!(names(&result.tree), vec!["lib", "pkg", "Alpha.java", "zeta.py"]);
        assert_eq!(result.tree.file_count(), 4);

        let pkg = &result.tree.children[1];
        assert_eq!(pkg.kind, NodeKind::Directory);
        assert_eq!(pkg.children[0].size, Some(13));
        assert_eq!(pkg.children[0].role, Some(FileRole::Source));
    }

    #[test]
    fn test_walk_ignores_blocklisted_dirs_and_unknown_files() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "app.py", "");
        create_file(temp_dir.path(), "node_modules/lib/index.py", "");
        create_file(temp_dir.path(), "__pycache__/app.cpython-311.pyc", "");
        create_file(temp_dir.path(), "data.json", "{}");
        create_file(temp_dir.path(), "image.png", "");

        let result = walk(temp_dir.path());
        assert_eq!(names(&result.tree), vec!["app.py"]);
    }

    #[test]
    fn test_context_override_beats_blocklist() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "app.py", "");
        create_file(temp_dir.path(), ".gitignore", "secret.py\n");
        create_file(temp_dir.path(), "secret.py", "");
        create_file(temp_dir.path(), ".env", "KEY=1");
        create_file(temp_dir.path(), ".env.example", "KEY=");
        create_file(temp_dir.path(), "Dockerfile", "FROM python");
        create_file(temp_dir.path(), "docs/guide.md", "# Guide");

        let mut rules = IgnoreRules::default();
        rules.files.insert("Dockerfile".to_string());
        let root = temp_dir.path().canonicalize().unwrap();
        let result = FileWalker::new(rules, AnalysisSettings::default())
            .walk(&root)
            .unwrap();

        assert_eq!(
            names(&result.tree),
            vec!["docs", ".env.example", ".gitignore", "app.py", "Dockerfile"]
        );
        let dockerfile = result.tree.children.iter().find(|c| c.name == "Dockerfile").unwrap();
        assert_eq!(dockerfile.role, Some(FileRole::Context));
        assert_eq!(result.tree.source_files().len(), 1);
        assert_eq!(result.tree.context_files().len(), 4);
    }

    #[test]
    fn test_context_listed_source_stays_source() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "setup.py", "class BuildExt(Base):\n    pass\n");
        create_file(temp_dir.path(), "base.py", "class Base:\n    pass\n");
        create_file(temp_dir.path(), "setup.cfg", "[metadata]\n");

        let mut rules = IgnoreRules::default();
        assert!(rules.is_context_name("setup.py"));
        let result = walk(temp_dir.path());
        let setup = result.tree.children.iter().find(|c| c.name == "setup.py").unwrap();
        assert_eq!(setup.role, Some(FileRole::Source));
        assert_eq!(result.tree.source_files().len(), 2);

        // still captured as context once an ignore rule would drop it
        rules.files.insert("setup.py".to_string());
        let root = temp_dir.path().canonicalize().unwrap();
        let ignored = FileWalker::new(rules, AnalysisSettings::default())
            .walk(&root)
            .unwrap();
        let setup = ignored.tree.children.iter().find(|c| c.name == "setup.py").unwrap();
        assert_eq!(setup.role, Some(FileRole::Context));
    }

    #[test]
    fn test_gitignore_can_be_disabled() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), ".gitignore", "generated/\n");
        create_file(temp_dir.path(), "generated/api.py", "");

        assert_eq!(walk(temp_dir.path()).tree.source_files().len(), 0);

        let mut rules = IgnoreRules::default();
        rules.respect_gitignore = false;
        let root = temp_dir.path().canonicalize().unwrap();
        let result = FileWalker::new(rules, AnalysisSettings::default())
            .walk(&root)
            .unwrap();
        assert_eq!(result.tree.source_files().len(), 1);
    }

    #[test]
    fn test_depth_limit_marks_truncated() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "a/b/c/deep.py", "");
        create_file(temp_dir.path(), "a/top.py", "");

        let settings = AnalysisSettings {
            max_depth: 2,
            ..AnalysisSettings::default()
        };
        let result = walk_with(temp_dir.path(), settings);

        let a = &result.tree.children[0];
        assert_eq!(names(a), vec!["b", "top.py"]);
        let b = &a.children[0];
        assert!(b.truncated);
        assert!(b.children.is_empty());
        assert!(result.tree.render().contains("b/ …"));
    }

    #[test]
    fn test_depth_limit_ignores_filtered_entries() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "cache/__pycache__/mod.cpython-311.pyc", "");
        create_file(temp_dir.path(), "cache/blob.bin", "");
        create_file(temp_dir.path(), "pkg/mod.py", "");

        let settings = AnalysisSettings {
            max_depth: 1,
            ..AnalysisSettings::default()
        };
        let result = walk_with(temp_dir.path(), settings);

        assert_eq!(names(&result.tree), vec!["pkg"]);
        assert!(result.tree.children[0].truncated);
    }

    #[test]
    fn test_empty_dirs_pruned() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "app.py", "");
        create_file(temp_dir.path(), "only_binaries/blob.bin", "");
        fs::create_dir_all(temp_dir.path().join("empty")).unwrap();

        let result = walk(temp_dir.path());
        assert_eq!(names(&result.tree), vec!["app.py"]);

        let settings = AnalysisSettings {
            prune_empty_dirs: false,
            ..AnalysisSettings::default()
        };
        let kept = walk_with(temp_dir.path(), settings);
        assert_eq!(names(&kept.tree), vec!["empty", "only_binaries", "app.py"]);
    }

    #[test]
    fn test_oversized_source_reported() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "big.py", &"x = 1\n".repeat(100));
        create_file(temp_dir.path(), "small.py", "x = 1\n");

        let settings = AnalysisSettings {
            max_file_size: 100,
            ..AnalysisSettings::default()
        };
        let result = walk_with(temp_dir.path(), settings);
        assert_eq!(names(&result.tree), vec!["small.py"]);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::FileTooLarge);
    }

    #[test]
    fn test_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        let result = walk(temp_dir.path());
        assert!(result.tree.children.is_empty());
        assert_eq!(result.tree.kind, NodeKind::Directory);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_recorded_once() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "pkg/mod.py", "");
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("pkg/loop")).unwrap();

        let result = walk(temp_dir.path());
        let cycles: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::SymlinkCycle)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert_eq!(result.tree.source_files().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_is_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        create_file(temp_dir.path(), "ok.py", "");
        std::os::unix::fs::symlink(
            temp_dir.path().join("missing.py"),
            temp_dir.path().join("dangling.py"),
        )
        .unwrap();

        let result = walk(temp_dir.path());
        assert_eq!(result.tree.source_files().len(), 1);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Unreadable));
    }
}
