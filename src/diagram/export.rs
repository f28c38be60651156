use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::Result;
use crate::graph::{Edge, RelationshipGraph};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportNode {
    /// Qualified class name
    pub id: String,
    pub name: String,
    pub module: String,
    pub inherits: BTreeSet<String>,
    pub uses: BTreeSet<String>,
    pub used_by: BTreeSet<String>,
    pub inherited_by: BTreeSet<String>,
    pub unresolved_bases: Vec<String>,
    pub connections: usize,
    pub rank: usize,
}

/// Serializable form of a relationship graph: nodes by id, edges sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<Edge>,
}

impl GraphExport {
    pub fn from_graph(graph: &RelationshipGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|n| ExportNode {
                id: n.qualified_name.clone(),
                name: n.name.clone(),
                module: n.module.clone(),
                inherits: n.inherits.clone(),
                uses: n.uses.clone(),
                used_by: n.used_by.clone(),
                inherited_by: n.inherited_by.clone(),
                unresolved_bases: n.unresolved_bases.clone(),
                connections: n.connections,
                rank: n.rank,
            })
            .collect();
        Self {
            nodes,
            edges: graph.edges(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::fixtures;

    #[test]
    fn test_export_shape() {
        let (_, graph) = fixtures::sample();
        let export = GraphExport::from_graph(&graph);
        let ids: Vec<_> = export.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["models.Base", "models.User", "repo.Repository"]);

        let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        assert_eq!(value["edges"][0]["source"], "models.User");
        assert_eq!(value["edges"][0]["target"], "models.Base");
        assert_eq!(value["edges"][0]["kind"], "inherits");
        assert_eq!(value["edges"][1]["kind"], "uses");
        assert_eq!(value["nodes"][1]["connections"], 2);
        assert_eq!(value["nodes"][1]["rank"], 1);
        assert_eq!(value["nodes"][0]["inherited_by"][0], "models.User");
    }

    #[test]
    fn test_export_is_stable() {
        let (_, graph) = fixtures::sample();
        let first = GraphExport::from_graph(&graph).to_json().unwrap();
        let second = GraphExport::from_graph(&graph).to_json().unwrap();
        assert_eq!(first, second);
    }
}
