use std::collections::{BTreeMap, BTreeSet};

use crate::enrich::EnrichmentReport;
use crate::graph::{EdgeKind, RelationshipGraph};
use crate::indexer::ProjectAnalysis;

const TOP_CLASSES: usize = 10;

/// Markdown overview of one analysis: totals, most connected classes and
/// diagnostics by kind.
pub fn render_summary(
    analysis: &ProjectAnalysis,
    graph: &RelationshipGraph,
    enrichment: Option<&EnrichmentReport>,
) -> String {
    let edges = graph.edges();
    let inherits = edges.iter().filter(|e| e.kind == EdgeKind::Inherits).count();
    let uses = edges.len() - inherits;

    let mut out = String::from("# Architecture Summary\n\n");
    out.push_str(&format!("- Root: `{}`\n", analysis.root.display()));
    out.push_str(&format!(
        "- Source files: {}\n",
        analysis.tree.source_files().len()
    ));
    out.push_str(&format!(
        "- Context files: {}\n",
        analysis.tree.context_files().len()
    ));
    out.push_str(&format!("- Classes: {}\n", graph.len()));
    out.push_str(&format!(
        "- Relationships: {} inheritance, {} usage\n",
        inherits, uses
    ));
    if let Some(report) = enrichment {
        out.push_str(&format!(
            "- Enrichment: {} of {} unknown types resolved\n",
            report.resolved, report.requested
        ));
    }
    out.push_str(&format!("- Diagnostics: {}\n", analysis.diagnostics.len()));

    out.push_str("\n## Core Classes\n\n");
    if graph.is_empty() {
        out.push_str("No classes found.\n");
    } else {
        out.push_str("| Rank | Class | Module | Connections | Inherits | Uses |\n");
        out.push_str("|---:|---|---|---:|---|---|\n");
        for node in graph.ranked().take(TOP_CLASSES) {
            out.push_str(&format!(
                "| {} | `{}` | {} | {} | {} | {} |\n",
                node.rank,
                node.qualified_name,
                node.module,
                node.connections,
                short_list(&node.inherits),
                short_list(&node.uses)
            ));
        }
    }

    if !analysis.diagnostics.is_empty() {
        let mut by_kind: BTreeMap<_, usize> = BTreeMap::new();
        for diagnostic in &analysis.diagnostics {
            *by_kind.entry(diagnostic.kind).or_default() += 1;
        }
        out.push_str("\n## Diagnostics\n\n");
        for (kind, count) in by_kind {
            out.push_str(&format!("- {}: {}\n", kind, count));
        }
    }
    out
}

fn short_list(names: &BTreeSet<String>) -> String {
    if names.is_empty() {
        return "-".to_string();
    }
    names
        .iter()
        .map(|n| n.rsplit('.').next().unwrap_or(n))
        .collect::<Vec<_>>()
        .join(", ")
}
