use std::path::Path;
use std::sync::Arc;

use crate::error::{ArchError, Result};
use crate::languages::{LanguageGrammar, LanguageRegistry};

pub struct Parser {
    registry: LanguageRegistry,
}

impl Parser {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    pub fn parse_file(&self, path: &Path) -> Result<ParsedFile> {
        let grammar = self
            .registry
            .get_for_file(path)
            .ok_or_else(|| ArchError::UnsupportedLanguage(path.display().to_string()))?;

        let bytes = std::fs::read(path)?;
        let source = String::from_utf8_lossy(&bytes);
        self.parse_source(&source, grammar)
    }

    pub fn parse_source(&self, source: &str, grammar: Arc<dyn LanguageGrammar>) -> Result<ParsedFile> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&grammar.language())
            .map_err(|e| ArchError::Parse(e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ArchError::Parse("Failed to parse source".to_string()))?;

        Ok(ParsedFile {
            tree,
            source: source.to_string(),
            language: grammar.name().to_string(),
            grammar,
        })
    }

    pub fn get_grammar(&self, path: &Path) -> Option<Arc<dyn LanguageGrammar>> {
        self.registry.get_for_file(path)
    }
}

pub struct ParsedFile {
    pub tree: tree_sitter::Tree,
    pub source: String,
    pub language: String,
    pub grammar: Arc<dyn LanguageGrammar>,
}

impl ParsedFile {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn node_text(&self, node: &tree_sitter::Node) -> &str {
        node.utf8_text(self.source_bytes()).unwrap_or("")
    }

    /// First line of the node's text, trimmed
    pub fn node_line(&self, node: &tree_sitter::Node) -> String {
        self.node_text(node).lines().next().unwrap_or("").trim().to_string()
    }

    pub fn has_syntax_errors(&self) -> bool {
        self.root_node().has_error()
    }

    /// 1-based line of the first ERROR or MISSING node, if any
    pub fn first_error_line(&self) -> Option<usize> {
        let root = self.root_node();
        if !root.has_error() {
            return None;
        }

        let mut cursor = root.walk();
        loop {
            let node = cursor.node();
            if node.is_error() || node.is_missing() {
                return Some(node.start_position().row + 1);
            }
            // Only descend into subtrees that contain the error
            if node.has_error() && cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Some(root.start_position().row + 1);
                }
            }
        }
    }
}
