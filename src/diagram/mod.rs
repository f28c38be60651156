//! Diagram Emitter: deterministic text renderings of a [`RelationshipGraph`].
//!
//! Classes are always emitted in qualified-name order and edges in
//! `(source, target, kind)` order, so repeated runs over the same input
//! produce byte-identical output. When a graph exceeds `max_nodes` the
//! top-ranked classes are kept and edges to dropped classes are omitted.

mod export;
mod mermaid;
mod plantuml;
mod summary;

use std::collections::{BTreeSet, HashMap, HashSet};

pub use export::{ExportNode, GraphExport};
pub use summary::render_summary;

use crate::config::{DiagramFormat, DiagramSettings};
use crate::error::Result;
use crate::graph::{ClassRelationship, Edge, RelationshipGraph};
use crate::model::{ClassEntity, TypeRef};

/// Renders relationship graphs as Mermaid or PlantUML class diagrams.
pub struct DiagramEmitter {
    format: DiagramFormat,
    max_nodes: usize,
    max_members: usize,
}

impl DiagramEmitter {
    pub fn new(format: DiagramFormat) -> Self {
        Self {
            format,
            max_nodes: 100,
            max_members: 8,
        }
    }

    pub fn from_settings(settings: &DiagramSettings) -> Self {
        Self::new(settings.format)
            .with_max_nodes(settings.max_nodes)
            .with_max_members(settings.max_members)
    }

    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = max;
        self
    }

    pub fn with_max_members(mut self, max: usize) -> Self {
        self.max_members = max;
        self
    }

    pub fn format(&self) -> DiagramFormat {
        self.format
    }

    /// Diagram text in the configured format, newline-terminated.
    ///
    /// `classes` supplies member listings; classes missing from it are drawn
    /// without members.
    pub fn render(&self, graph: &RelationshipGraph, classes: &[ClassEntity]) -> String {
        let view = DiagramView::new(graph, classes, self.max_nodes, self.max_members);
        match self.format {
            DiagramFormat::Mermaid => mermaid::render(&view),
            DiagramFormat::Plantuml => plantuml::render(&view),
        }
    }

    /// Pretty JSON export of the whole graph (never truncated).
    pub fn export_json(&self, graph: &RelationshipGraph) -> Result<String> {
        GraphExport::from_graph(graph).to_json()
    }
}

impl Default for DiagramEmitter {
    fn default() -> Self {
        Self::new(DiagramFormat::Mermaid)
    }
}

/// Replaces characters diagram syntaxes reject in identifiers.
///
/// Not injective on its own (`a_b.C` and `a.b_C` agree); diagrams go through
/// [`DiagramView::id`], which disambiguates.
pub fn node_id(qualified_name: &str) -> String {
    qualified_name
        .chars()
        .map(|c| match c {
            '.' | '/' | '-' | ':' | '$' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// One rendered class member.
pub(crate) enum Member<'a> {
    Field { name: &'a str, type_ref: &'a TypeRef },
    Method { signature: String, returns: Option<&'a TypeRef> },
}

/// The subset of a graph that fits into one diagram.
pub(crate) struct DiagramView<'a> {
    pub nodes: Vec<&'a ClassRelationship>,
    pub edges: Vec<Edge>,
    pub total: usize,
    ids: HashMap<&'a str, String>,
    entities: HashMap<&'a str, &'a ClassEntity>,
    max_members: usize,
}

impl<'a> DiagramView<'a> {
    fn new(
        graph: &'a RelationshipGraph,
        classes: &'a [ClassEntity],
        max_nodes: usize,
        max_members: usize,
    ) -> Self {
        let kept: BTreeSet<&str> = graph
            .ranking()
            .iter()
            .take(max_nodes)
            .map(String::as_str)
            .collect();

        let nodes: Vec<&ClassRelationship> = graph
            .nodes()
            .filter(|n| kept.contains(n.qualified_name.as_str()))
            .collect();
        let edges: Vec<Edge> = graph
            .edges()
            .into_iter()
            .filter(|e| kept.contains(e.source.as_str()) && kept.contains(e.target.as_str()))
            .collect();
        let entities = classes
            .iter()
            .map(|c| (c.qualified_name.as_str(), c))
            .collect();
        let ids = assign_ids(&nodes);

        Self {
            nodes,
            edges,
            total: graph.len(),
            ids,
            entities,
            max_members,
        }
    }

    /// Diagram identifier of a kept class, unique within this view.
    pub fn id(&self, qualified_name: &str) -> String {
        self.ids
            .get(qualified_name)
            .cloned()
            .unwrap_or_else(|| node_id(qualified_name))
    }

    pub fn is_truncated(&self) -> bool {
        self.nodes.len() < self.total
    }

    /// Fields first, then methods, capped at `max_members`.
    pub fn members(&self, qualified_name: &str) -> Vec<Member<'a>> {
        let Some(&entity) = self.entities.get(qualified_name) else {
            return Vec::new();
        };
        let fields = entity.fields.iter().map(|f| Member::Field {
            name: &f.name,
            type_ref: &f.type_ref,
        });
        let methods = entity.methods.iter().map(|m| Member::Method {
            signature: m.display_params(),
            returns: m.returns.as_ref(),
        });
        fields.chain(methods).take(self.max_members).collect()
    }
}

/// Sanitized ids in qualified-name order; a clash gets the first free
/// `_2`, `_3`, ... suffix.
fn assign_ids<'a>(nodes: &[&'a ClassRelationship]) -> HashMap<&'a str, String> {
    let mut taken = HashSet::new();
    let mut ids = HashMap::with_capacity(nodes.len());
    for node in nodes {
        let base = node_id(&node.qualified_name);
        let mut id = base.clone();
        let mut n = 2;
        while taken.contains(&id) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        taken.insert(id.clone());
        ids.insert(node.qualified_name.as_str(), id);
    }
    ids
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::graph::{RelationshipExtractor, RelationshipGraph};
    use crate::model::{ClassEntity, MethodSignature, Parameter, TypeRef};

    /// `models.User(Base)` holding a `repo.Repository`, plus the base.
    pub fn sample() -> (Vec<ClassEntity>, RelationshipGraph) {
        let base = ClassEntity::new("Base", "models.Base", "models.py", "python", 1);

        let mut user = ClassEntity::new("User", "models.User", "models.py", "python", 4);
        user.bases.push("Base".to_string());
        user.add_field("repo", TypeRef::named("Repository"), None);
        user.add_field("name", TypeRef::named("str"), None);
        user.methods.push(MethodSignature {
            name: "save".to_string(),
            params: vec![Parameter {
                name: "force".to_string(),
                type_ref: TypeRef::named("bool"),
            }],
            returns: Some(TypeRef::named("None")),
            decorators: Vec::new(),
            description: None,
        });

        let repo = ClassEntity::new("Repository", "repo.Repository", "repo.py", "python", 1);

        let classes = vec![base, user, repo];
        let graph = RelationshipExtractor::new(&classes).build();
        (classes, graph)
    }
}
