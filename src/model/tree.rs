use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

/// Why a file was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// Parsed for class declarations
    Source,
    /// Captured for configuration/runtime context only, never parsed
    Context,
}

/// A file or directory in the analysed project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemNode {
    pub name: String,
    pub path: PathBuf,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<FileRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Directory sits at the depth limit; its children were not enumerated
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileSystemNode>,
    /// Qualified names of the classes declared in this file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
}

impl FileSystemNode {
    pub fn directory(path: &Path) -> Self {
        Self {
            name: display_name(path),
            path: path.to_path_buf(),
            kind: NodeKind::Directory,
            role: None,
            size: None,
            truncated: false,
            children: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn file(path: &Path, size: u64, role: FileRole) -> Self {
        Self {
            name: display_name(path),
            path: path.to_path_buf(),
            kind: NodeKind::File,
            role: Some(role),
            size: Some(size),
            truncated: false,
            children: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_source(&self) -> bool {
        self.role == Some(FileRole::Source)
    }

    /// Orders children directories-first, then case-insensitively by name.
    pub fn sort_children(&mut self) {
        self.children.sort_by(compare_nodes);
    }

    /// Source files in depth-first tree order.
    pub fn source_files(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        self.collect_files(&mut out, |n| n.is_source());
        out
    }

    /// Context-only files in depth-first tree order.
    pub fn context_files(&self) -> Vec<&Path> {
        let mut out = Vec::new();
        self.collect_files(&mut out, |n| n.role == Some(FileRole::Context));
        out
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a Path>, keep: fn(&FileSystemNode) -> bool) {
        if self.kind == NodeKind::File {
            if keep(self) {
                out.push(&self.path);
            }
            return;
        }
        for child in &self.children {
            child.collect_files(out, keep);
        }
    }

    pub fn find_mut(&mut self, path: &Path) -> Option<&mut FileSystemNode> {
        if self.path == path {
            return Some(self);
        }
        if !self.is_dir() || !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter_mut().find_map(|c| c.find_mut(path))
    }

    pub fn file_count(&self) -> usize {
        match self.kind {
            NodeKind::File => 1,
            NodeKind::Directory => self.children.iter().map(|c| c.file_count()).sum(),
        }
    }

    /// Renders the tree with box-drawing connectors.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        self.render_into(&mut lines, "", true);
        lines.join("\n")
    }

    fn render_into(&self, lines: &mut Vec<String>, prefix: &str, is_last: bool) {
        let connector = if is_last { "└── " } else { "├── " };
        let suffix = match (self.kind, self.role) {
            (NodeKind::Directory, _) if self.truncated => "/ …",
            (NodeKind::Directory, _) => "/",
            (NodeKind::File, Some(FileRole::Context)) => " (context)",
            _ => "",
        };
        lines.push(format!("{}{}{}{}", prefix, connector, self.name, suffix));

        let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });
        let count = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            child.render_into(lines, &child_prefix, i + 1 == count);
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn compare_nodes(a: &FileSystemNode, b: &FileSystemNode) -> Ordering {
    let a_dir = a.is_dir();
    let b_dir = b.is_dir();
    b_dir
        .cmp(&a_dir)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> FileSystemNode {
        let mut root = FileSystemNode::directory(Path::new("/p"));
        root.children.push(FileSystemNode::file(Path::new("/p/b.py"), 10, FileRole::Source));
        root.children.push(FileSystemNode::file(Path::new("/p/README.md"), 5, FileRole::Context));
        let mut pkg = FileSystemNode::directory(Path::new("/p/pkg"));
        pkg.children.push(FileSystemNode::file(Path::new("/p/pkg/a.py"), 3, FileRole::Source));
        root.children.push(pkg);
        root.sort_children();
        root
    }

    #[test]
    fn test_sort_children_directories_first() {
        let root = sample_tree();
        let names: Vec<_> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["pkg", "b.py", "README.md"]);
    }

    #[test]
    fn test_source_files_in_tree_order() {
        let root = sample_tree();
        assert_eq!(
            root.source_files(),
            vec![Path::new("/p/pkg/a.py"), Path::new("/p/b.py")]
        );
        assert_eq!(root.context_files(), vec![Path::new("/p/README.md")]);
        assert_eq!(root.file_count(), 3);
    }

    #[test]
    fn test_find_mut() {
        let mut root = sample_tree();
        let node = root.find_mut(Path::new("/p/pkg/a.py")).unwrap();
        node.classes.push("pkg.a.Foo".to_string());
        assert_eq!(root.children[0].children[0].classes, vec!["pkg.a.Foo"]);
        assert!(root.find_mut(Path::new("/elsewhere/x.py")).is_none());
    }

    #[test]
    fn test_render() {
        let root = sample_tree();
        let rendered = root.render();
        let expected = "└── p/\n    ├── pkg/\n    │   └── a.py\n    ├── b.py\n    └── README.md (context)";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_serialize_omits_empty_fields() {
        let node = FileSystemNode::file(Path::new("/p/a.py"), 1, FileRole::Source);
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("children").is_none());
        assert!(json.get("truncated").is_none());
        assert_eq!(json["role"], "source");
    }
}
