pub mod java;
pub mod python;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tree_sitter::{Query, StreamingIterator};

use crate::indexer::parser::ParsedFile;
use crate::model::{ClassEntity, FunctionSignature};

/// Where a parsed file sits inside the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceModule {
    /// Root-relative path with `/` separators
    pub path: String,
    /// Dotted module name, e.g. `pkg.models`
    pub dotted: String,
}

impl SourceModule {
    pub fn new(root: &Path, file: &Path) -> Self {
        let relative = file.strip_prefix(root).unwrap_or(file);
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut segments: Vec<String> = relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        if segments.len() > 1 && segments.last().map(String::as_str) == Some("__init__") {
            segments.pop();
        }

        Self {
            path,
            dotted: segments.join("."),
        }
    }

    pub fn qualify(&self, nested_name: &str) -> String {
        if self.dotted.is_empty() {
            nested_name.to_string()
        } else {
            format!("{}.{}", self.dotted, nested_name)
        }
    }
}

pub trait LanguageGrammar: Send + Sync {
    fn name(&self) -> &'static str;
    fn file_extensions(&self) -> &[&'static str];
    fn language(&self) -> tree_sitter::Language;
    fn imports_query(&self) -> &str;

    /// Get cached imports query (compiled once)
    fn cached_imports_query(&self) -> Option<&'static Query> {
        None
    }

    /// Names that never count as project types (primitives, stdlib containers)
    fn is_builtin_type(&self, name: &str) -> bool;

    /// Class-like declarations in source order
    fn extract_classes(&self, parsed: &ParsedFile, module: &SourceModule) -> Vec<ClassEntity>;

    /// Top-level functions
    fn extract_functions(&self, _parsed: &ParsedFile) -> Vec<FunctionSignature> {
        Vec::new()
    }

    /// Imported module paths, deduplicated and sorted
    fn extract_imports(&self, parsed: &ParsedFile) -> Vec<String> {
        let Some(query) = self.cached_imports_query() else {
            tracing::warn!("Invalid imports query for {}", self.name());
            return Vec::new();
        };

        let mut imports = Vec::new();
        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(query, parsed.root_node(), parsed.source_bytes());

        while let Some(m) = matches.next() {
            let mut module: Option<&str> = None;
            let mut name: Option<&str> = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                let text = parsed.node_text(&capture.node);
                match capture_name {
                    "module" => module = Some(text),
                    "import_path" | "name" => name = Some(text),
                    _ => {}
                }
            }

            let import = match (module, name) {
                (Some(m), Some(n)) => format!("{}.{}", m.trim_end_matches('.'), n),
                (Some(m), None) => m.to_string(),
                (None, Some(n)) => n.to_string(),
                (None, None) => continue,
            };
            imports.push(clean_import(&import));
        }

        imports.sort();
        imports.dedup();
        imports
    }
}

fn clean_import(raw: &str) -> String {
    let s = raw.trim();
    let s = s.strip_prefix("import ").unwrap_or(s).trim_start();
    let s = s.strip_prefix("static ").unwrap_or(s);
    s.trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("")
}

/// Type-name heuristic for usage candidates: starts uppercase and is not an
/// all-caps constant. Acronym classes (`API`, `DB`) only qualify through
/// [`looks_like_type_in_type_position`].
pub fn looks_like_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => name.chars().any(|c| c.is_ascii_lowercase()),
        _ => false,
    }
}

/// Looser check for identifiers the grammar already puts in a type position
/// (annotations, constructor calls, Java type identifiers): any capitalized
/// name of two or more characters, all-caps included. Single letters stay
/// out as generic parameters.
pub fn looks_like_type_in_type_position(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_uppercase())
        && chars.next().is_some()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub struct LanguageRegistry {
    languages: HashMap<String, Arc<dyn LanguageGrammar>>,
    extension_map: HashMap<String, String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            languages: HashMap::new(),
            extension_map: HashMap::new(),
        };

        registry.register(Arc::new(python::PythonGrammar));
        registry.register(Arc::new(java::JavaGrammar));

        registry
    }

    pub fn register(&mut self, grammar: Arc<dyn LanguageGrammar>) {
        let name = grammar.name().to_string();
        for ext in grammar.file_extensions() {
            self.extension_map.insert(ext.to_string(), name.clone());
        }
        self.languages.insert(name, grammar);
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn LanguageGrammar>> {
        self.languages.get(name).cloned()
    }

    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn LanguageGrammar>> {
        self.extension_map
            .get(ext)
            .and_then(|name| self.languages.get(name))
            .cloned()
    }

    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn LanguageGrammar>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get_by_extension(ext))
    }

    pub fn supported_extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.extension_map.keys().map(|s| s.as_str()).collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
