use super::{DiagramView, Member};
use crate::graph::EdgeKind;

pub(crate) fn render(view: &DiagramView) -> String {
    let mut out = String::from("@startuml\n");

    if view.nodes.is_empty() {
        out.push_str("note \"No classes found\" as empty\n");
        out.push_str("@enduml\n");
        return out;
    }
    if view.is_truncated() {
        out.push_str(&format!(
            "' showing {} of {} classes\n",
            view.nodes.len(),
            view.total
        ));
    }

    for node in &view.nodes {
        let members = view.members(&node.qualified_name);
        let header = format!("class \"{}\" as {}", node.name, view.id(&node.qualified_name));
        if members.is_empty() {
            out.push_str(&header);
            out.push('\n');
            continue;
        }
        out.push_str(&header);
        out.push_str(" {\n");
        for member in &members {
            let line = match member {
                Member::Field { name, type_ref } => format!("+{} : {}", name, type_ref),
                Member::Method { signature, returns: Some(ret) } => format!("+{} : {}", signature, ret),
                Member::Method { signature, returns: None } => format!("+{}", signature),
            };
            out.push_str("  ");
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str("}\n");
    }

    for edge in &view.edges {
        let source = view.id(&edge.source);
        let target = view.id(&edge.target);
        let line = match edge.kind {
            EdgeKind::Inherits => format!("{} <|-- {}\n", target, source),
            EdgeKind::Uses => format!("{} --> {}\n", source, target),
        };
        out.push_str(&line);
    }

    out.push_str("@enduml\n");
    out
}

#[cfg(test)]
mod tests {
    use crate::config::DiagramFormat;
    use crate::diagram::{fixtures, DiagramEmitter};
    use crate::graph::RelationshipGraph;

    #[test]
    fn test_render_sample() {
        let (classes, graph) = fixtures::sample();
        let out = DiagramEmitter::new(DiagramFormat::Plantuml)
            .with_max_members(2)
            .render(&graph, &classes);
        let expected = "\
@startuml
class \"Base\" as models_Base
class \"User\" as models_User {
  +repo : Repository
  +name : str
}
class \"Repository\" as repo_Repository
models_Base <|-- models_User
models_User --> repo_Repository
@enduml
";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_render_empty_graph() {
        let out = DiagramEmitter::new(DiagramFormat::Plantuml).render(&RelationshipGraph::default(), &[]);
        assert!(out.starts_with("@startuml\n"));
        assert!(out.ends_with("@enduml\n"));
        assert!(out.contains("No classes found"));
    }
}
