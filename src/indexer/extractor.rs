use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ArchError;
use crate::indexer::parser::Parser;
use crate::languages::{LanguageRegistry, SourceModule};
use crate::model::{ClassEntity, Diagnostic, DiagnosticKind, FileAnalysis};

/// One file's entities plus whatever went wrong while producing them.
#[derive(Debug)]
pub struct ExtractionResult {
    pub file: FileAnalysis,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExtractionResult {
    fn failed(path: &Path, diagnostic: Diagnostic) -> Self {
        warn!("{}", diagnostic);
        Self {
            file: FileAnalysis::empty(path.to_path_buf()),
            diagnostics: vec![diagnostic],
        }
    }

    pub fn is_parse_failure(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d.kind, DiagnosticKind::Parse | DiagnosticKind::Unreadable))
    }
}

/// Parses one source file and runs its language's class visitor.
///
/// Stateless apart from the grammar registry, so one instance per worker
/// thread is enough.
pub struct ClassExtractor {
    parser: Parser,
    root: PathBuf,
}

impl ClassExtractor {
    pub fn new(registry: LanguageRegistry, root: impl Into<PathBuf>) -> Self {
        Self {
            parser: Parser::new(registry),
            root: root.into(),
        }
    }

    pub fn extract(&self, path: &Path) -> ExtractionResult {
        let Some(grammar) = self.parser.get_grammar(path) else {
            debug!("No grammar for {}, nothing to extract", path.display());
            return ExtractionResult {
                file: FileAnalysis::empty(path.to_path_buf()),
                diagnostics: Vec::new(),
            };
        };

        let parsed = match self.parser.parse_file(path) {
            Ok(parsed) => parsed,
            Err(ArchError::Io(err)) => {
                return ExtractionResult::failed(path, Diagnostic::unreadable(Some(path), err.to_string()))
            }
            Err(err) => return ExtractionResult::failed(path, Diagnostic::parse(path, err.to_string())),
        };

        if let Some(line) = parsed.first_error_line() {
            return ExtractionResult::failed(
                path,
                Diagnostic::parse(path, format!("syntax error near line {}", line)),
            );
        }

        let module = SourceModule::new(&self.root, path);
        let (classes, diagnostics) = dedupe_classes(path, grammar.extract_classes(&parsed, &module));
        for diagnostic in &diagnostics {
            warn!("{}", diagnostic);
        }

        ExtractionResult {
            file: FileAnalysis {
                path: path.to_path_buf(),
                language: grammar.name().to_string(),
                classes,
                functions: grammar.extract_functions(&parsed),
                imports: grammar.extract_imports(&parsed),
            },
            diagnostics,
        }
    }
}

/// Keeps the last definition of each qualified name, in source order.
pub(crate) fn dedupe_classes(
    path: &Path,
    classes: Vec<ClassEntity>,
) -> (Vec<ClassEntity>, Vec<Diagnostic>) {
    let mut last_seen: HashMap<String, usize> = HashMap::new();
    for (index, class) in classes.iter().enumerate() {
        last_seen.insert(class.qualified_name.clone(), index);
    }
    if last_seen.len() == classes.len() {
        return (classes, Vec::new());
    }

    let mut diagnostics = Vec::new();
    let kept = classes
        .into_iter()
        .enumerate()
        .filter_map(|(index, class)| {
            if last_seen.get(&class.qualified_name) == Some(&index) {
                Some(class)
            } else {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::DuplicateClass,
                    Some(path),
                    format!(
                        "{} defined again later in the file; line {} ignored",
                        class.qualified_name, class.line
                    ),
                ));
                None
            }
        })
        .collect();
    (kept, diagnostics)
}
