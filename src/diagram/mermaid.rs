use super::{DiagramView, Member};
use crate::graph::EdgeKind;
use crate::model::TypeRef;

pub(crate) fn render(view: &DiagramView) -> String {
    let mut lines = vec!["classDiagram".to_string()];

    if view.nodes.is_empty() {
        lines.push("    note \"No classes found\"".to_string());
        return finish(lines);
    }
    if view.is_truncated() {
        lines.push(format!(
            "    %% showing {} of {} classes",
            view.nodes.len(),
            view.total
        ));
    }

    for node in &view.nodes {
        let id = view.id(&node.qualified_name);
        lines.push(format!("    class {}[\"{}\"]", id, node.name));
        for member in view.members(&node.qualified_name) {
            lines.push(format!("    {} : {}", id, member_line(&member)));
        }
    }

    for edge in &view.edges {
        let source = view.id(&edge.source);
        let target = view.id(&edge.target);
        match edge.kind {
            EdgeKind::Inherits => lines.push(format!("    {} <|-- {}", target, source)),
            EdgeKind::Uses => lines.push(format!("    {} --> {}", source, target)),
        }
    }

    finish(lines)
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn member_line(member: &Member) -> String {
    match member {
        Member::Field { name, type_ref } => format!("+{} {}", name, generic(type_ref)),
        Member::Method { signature, returns: Some(ret) } => {
            format!("+{} {}", signature, generic(ret))
        }
        Member::Method { signature, returns: None } => format!("+{}", signature),
    }
}

/// Mermaid writes generics as `List~User~`.
fn generic(type_ref: &TypeRef) -> String {
    type_ref
        .as_str()
        .chars()
        .map(|c| match c {
            '[' | ']' | '<' | '>' => '~',
            other => other,
        })
        .collect()
}
