pub mod extractor;
pub mod patterns;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

pub use extractor::RelationshipExtractor;
pub use patterns::{find_patterns, Confidence, PatternKind, PatternMatch};

/// Edges of one class, keyed by qualified names of other project classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassRelationship {
    pub qualified_name: String,
    pub name: String,
    pub module: String,
    pub inherits: BTreeSet<String>,
    pub uses: BTreeSet<String>,
    pub inherited_by: BTreeSet<String>,
    pub used_by: BTreeSet<String>,
    /// Declared bases that are not project classes (library types)
    pub unresolved_bases: Vec<String>,
    /// Distinct neighbours across all four edge sets
    pub connections: usize,
    /// 1-based position in the connection ranking
    pub rank: usize,
}

impl ClassRelationship {
    pub(crate) fn new(qualified_name: &str, name: &str, module: &str) -> Self {
        Self {
            qualified_name: qualified_name.to_string(),
            name: name.to_string(),
            module: module.to_string(),
            inherits: BTreeSet::new(),
            uses: BTreeSet::new(),
            inherited_by: BTreeSet::new(),
            used_by: BTreeSet::new(),
            unresolved_bases: Vec::new(),
            connections: 0,
            rank: 0,
        }
    }

    pub fn neighbours(&self) -> BTreeSet<&str> {
        self.inherits
            .iter()
            .chain(&self.uses)
            .chain(&self.inherited_by)
            .chain(&self.used_by)
            .map(String::as_str)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Inherits,
    Uses,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Inherits => "inherits",
            EdgeKind::Uses => "uses",
        }
    }
}

/// Directed edge; for `Inherits` the source is the child class.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// Project-wide class graph, computed fresh for each analysis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelationshipGraph {
    nodes: BTreeMap<String, ClassRelationship>,
    ranking: Vec<String>,
}

impl RelationshipGraph {
    pub(crate) fn from_nodes(mut nodes: BTreeMap<String, ClassRelationship>) -> Self {
        for node in nodes.values_mut() {
            node.connections = node.neighbours().len();
        }

        let mut ranking: Vec<&ClassRelationship> = nodes.values().collect();
        ranking.sort_by(|a, b| {
            b.connections
                .cmp(&a.connections)
                .then_with(|| a.qualified_name.cmp(&b.qualified_name))
        });
        let ranking: Vec<String> = ranking.into_iter().map(|n| n.qualified_name.clone()).collect();

        for (index, name) in ranking.iter().enumerate() {
            if let Some(node) = nodes.get_mut(name) {
                node.rank = index + 1;
            }
        }
        Self { nodes, ranking }
    }

    pub fn get(&self, qualified_name: &str) -> Option<&ClassRelationship> {
        self.nodes.get(qualified_name)
    }

    /// Nodes in qualified-name order.
    pub fn nodes(&self) -> impl Iterator<Item = &ClassRelationship> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Qualified names by connections descending, ties by name ascending.
    pub fn ranking(&self) -> &[String] {
        &self.ranking
    }

    pub fn ranked(&self) -> impl Iterator<Item = &ClassRelationship> {
        self.ranking.iter().filter_map(|name| self.nodes.get(name))
    }

    pub fn core_classes(&self, min_connections: usize) -> Vec<&ClassRelationship> {
        self.ranked()
            .filter(|n| n.connections >= min_connections)
            .collect()
    }

    /// All edges sorted by (source, target, kind).
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for node in self.nodes.values() {
            for target in &node.inherits {
                edges.push(Edge {
                    source: node.qualified_name.clone(),
                    target: target.clone(),
                    kind: EdgeKind::Inherits,
                });
            }
            for target in &node.uses {
                edges.push(Edge {
                    source: node.qualified_name.clone(),
                    target: target.clone(),
                    kind: EdgeKind::Uses,
                });
            }
        }
        edges.sort();
        edges
    }
}
