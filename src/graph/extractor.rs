use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::{ClassRelationship, RelationshipGraph};
use crate::model::{ClassEntity, TypeRef};

/// Identifier-like tokens (optionally dotted) inside a type expression.
static TYPE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*")
        .expect("type token pattern is valid")
});

/// Builds the class graph in two phases: index every class, then resolve
/// each class's bases, types and references against that index.
pub struct RelationshipExtractor<'a> {
    classes: &'a [ClassEntity],
    by_qualified: HashMap<&'a str, usize>,
    by_name: HashMap<&'a str, Vec<usize>>,
}

impl<'a> RelationshipExtractor<'a> {
    pub fn new(classes: &'a [ClassEntity]) -> Self {
        let mut by_qualified = HashMap::new();
        let mut by_name: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, class) in classes.iter().enumerate() {
            by_qualified.insert(class.qualified_name.as_str(), index);
            by_name.entry(class.name.as_str()).or_default().push(index);
        }
        Self {
            classes,
            by_qualified,
            by_name,
        }
    }

    pub fn build(&self) -> RelationshipGraph {
        let mut nodes: BTreeMap<String, ClassRelationship> = BTreeMap::new();

        for (index, class) in self.classes.iter().enumerate() {
            let mut relationship = ClassRelationship::new(&class.qualified_name, &class.name, &class.module);

            for base in &class.bases {
                match self.resolve(strip_generics(base), index) {
                    Some(target) if target != index => {
                        relationship
                            .inherits
                            .insert(self.classes[target].qualified_name.clone());
                    }
                    Some(_) => {}
                    None => relationship.unresolved_bases.push(base.clone()),
                }
                if let Some(args) = generic_arguments(base) {
                    self.add_type_uses(&mut relationship, args, index);
                }
            }

            for field in &class.fields {
                self.add_type_ref_uses(&mut relationship, &field.type_ref, index);
            }
            for method in &class.methods {
                for param in &method.params {
                    self.add_type_ref_uses(&mut relationship, &param.type_ref, index);
                }
                if let Some(returns) = &method.returns {
                    self.add_type_ref_uses(&mut relationship, returns, index);
                }
            }

            // body references never duplicate an inheritance edge
            for reference in &class.references {
                if let Some(target) = self.resolve(reference, index) {
                    let qualified = &self.classes[target].qualified_name;
                    if target != index && !relationship.inherits.contains(qualified) {
                        relationship.uses.insert(qualified.clone());
                    }
                }
            }

            nodes.insert(class.qualified_name.clone(), relationship);
        }

        // transposes over the completed edge set
        let forward: Vec<(String, Vec<String>, Vec<String>)> = nodes
            .values()
            .map(|n| {
                (
                    n.qualified_name.clone(),
                    n.inherits.iter().cloned().collect(),
                    n.uses.iter().cloned().collect(),
                )
            })
            .collect();
        for (source, inherits, uses) in forward {
            for parent in inherits {
                if let Some(node) = nodes.get_mut(&parent) {
                    node.inherited_by.insert(source.clone());
                }
            }
            for used in uses {
                if let Some(node) = nodes.get_mut(&used) {
                    node.used_by.insert(source.clone());
                }
            }
        }

        let graph = RelationshipGraph::from_nodes(nodes);
        info!(
            "Relationship graph: {} classes, {} edges",
            graph.len(),
            graph.edges().len()
        );
        graph
    }

    fn add_type_ref_uses(&self, relationship: &mut ClassRelationship, type_ref: &TypeRef, from: usize) {
        if let TypeRef::Named(expr) = type_ref {
            self.add_type_uses(relationship, expr, from);
        }
    }

    fn add_type_uses(&self, relationship: &mut ClassRelationship, expr: &str, from: usize) {
        for token in TYPE_TOKEN.find_iter(expr) {
            if let Some(target) = self.resolve(token.as_str(), from) {
                if target != from {
                    relationship
                        .uses
                        .insert(self.classes[target].qualified_name.clone());
                }
            }
        }
    }

    /// Exact qualified name, then dotted suffix, then bare name. Ambiguous
    /// matches prefer the referencing class's module and otherwise stay
    /// unresolved.
    fn resolve(&self, reference: &str, from: usize) -> Option<usize> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if let Some(&index) = self.by_qualified.get(reference) {
            return Some(index);
        }

        if reference.contains('.') {
            let suffix = format!(".{}", reference);
            let candidates: Vec<usize> = self
                .classes
                .iter()
                .enumerate()
                .filter(|(_, c)| c.qualified_name.ends_with(&suffix))
                .map(|(i, _)| i)
                .collect();
            if !candidates.is_empty() {
                return self.disambiguate(&candidates, from, reference);
            }
        }

        let bare = reference.rsplit('.').next().unwrap_or(reference);
        let candidates = self.by_name.get(bare)?;
        self.disambiguate(candidates, from, reference)
    }

    fn disambiguate(&self, candidates: &[usize], from: usize, reference: &str) -> Option<usize> {
        if let [only] = candidates {
            return Some(*only);
        }
        let module = &self.classes[from].module;
        let local: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| &self.classes[i].module == module)
            .collect();
        if let [only] = local.as_slice() {
            return Some(*only);
        }
        debug!(
            "Ambiguous reference {} from {} ({} candidates)",
            reference,
            self.classes[from].qualified_name,
            candidates.len()
        );
        None
    }
}

/// `Repository[Product]` / `List<T>` → `Repository` / `List`
fn strip_generics(base: &str) -> &str {
    base.split(['[', '<', '('])
        .next()
        .unwrap_or(base)
        .trim()
}

fn generic_arguments(base: &str) -> Option<&str> {
    let start = base.find(['[', '<'])?;
    Some(&base[start..])
}
