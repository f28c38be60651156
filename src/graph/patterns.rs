use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ArchError;
use crate::model::ClassEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Factory,
    Singleton,
    Service,
    Visitor,
    Strategy,
}

impl PatternKind {
    pub const ALL: [PatternKind; 5] = [
        PatternKind::Factory,
        PatternKind::Singleton,
        PatternKind::Service,
        PatternKind::Visitor,
        PatternKind::Strategy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Factory => "factory",
            PatternKind::Singleton => "singleton",
            PatternKind::Service => "service",
            PatternKind::Visitor => "visitor",
            PatternKind::Strategy => "strategy",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternKind {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        PatternKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lowered)
            .ok_or_else(|| {
                let supported: Vec<_> = PatternKind::ALL.iter().map(|k| k.as_str()).collect();
                ArchError::Config(format!(
                    "unsupported pattern {:?}; supported: {}",
                    s,
                    supported.join(", ")
                ))
            })
    }
}

/// Ordered so that `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub qualified_name: String,
    pub name: String,
    pub module: String,
    pub confidence: Confidence,
    pub evidence: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Classes showing signs of `kind`, most confident first, then by name.
pub fn find_patterns(classes: &[ClassEntity], kind: PatternKind) -> Vec<PatternMatch> {
    let mut matches: Vec<PatternMatch> = classes
        .iter()
        .filter_map(|class| {
            let (confidence, evidence) = match kind {
                PatternKind::Factory => factory(class),
                PatternKind::Singleton => singleton(class),
                PatternKind::Service => service(class),
                PatternKind::Visitor => visitor(class),
                PatternKind::Strategy => strategy(class, classes),
            };
            if evidence.is_empty() {
                return None;
            }
            Some(PatternMatch {
                qualified_name: class.qualified_name.clone(),
                name: class.name.clone(),
                module: class.module.clone(),
                confidence,
                evidence,
                description: class.description.clone(),
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        a.confidence
            .cmp(&b.confidence)
            .then_with(|| a.qualified_name.cmp(&b.qualified_name))
    });
    matches
}

fn method_names(class: &ClassEntity) -> impl Iterator<Item = &str> {
    class.methods.iter().map(|m| m.name.as_str())
}

fn factory(class: &ClassEntity) -> (Confidence, Vec<String>) {
    let mut evidence = Vec::new();
    let mut confidence = Confidence::Low;

    let builders: Vec<&str> = method_names(class)
        .filter(|m| {
            let lower = m.to_lowercase();
            ["create", "build", "make", "get_", "new_"]
                .iter()
                .any(|prefix| lower.starts_with(prefix))
        })
        .collect();

    let named = class.name.contains("Factory");
    if named {
        evidence.push("Name contains 'Factory'".to_string());
        confidence = Confidence::High;
    }
    if builders.len() >= 2 {
        let shown: Vec<&str> = builders.iter().take(3).copied().collect();
        evidence.push(format!(
            "Has {} factory methods: {}",
            builders.len(),
            shown.join(", ")
        ));
        if !named {
            confidence = Confidence::Medium;
        }
    }
    (confidence, evidence)
}

fn singleton(class: &ClassEntity) -> (Confidence, Vec<String>) {
    let mut evidence = Vec::new();
    let mut confidence = Confidence::Low;

    let accessor = method_names(class)
        .any(|m| matches!(m, "get_instance" | "getInstance" | "instance"));
    let holder = class.fields.iter().any(|f| {
        matches!(f.name.as_str(), "_instance" | "instance" | "INSTANCE" | "__instance")
    });

    if accessor || holder {
        evidence.push("Has an instance accessor or holder".to_string());
        confidence = Confidence::High;
    }
    if method_names(class).any(|m| m == "__new__") {
        evidence.push("Overrides __new__".to_string());
        if confidence == Confidence::Low {
            confidence = Confidence::Medium;
        }
    }
    (confidence, evidence)
}

fn service(class: &ClassEntity) -> (Confidence, Vec<String>) {
    let mut evidence = Vec::new();
    let mut confidence = Confidence::Low;

    if class.name.ends_with("Service") {
        evidence.push("Name ends with 'Service'".to_string());
        confidence = Confidence::High;
    }
    if class.module.to_lowercase().contains("service") {
        evidence.push("Located in a services module".to_string());
        if confidence == Confidence::Low {
            confidence = Confidence::Medium;
        }
    }
    // only supporting evidence on its own
    let public = method_names(class).filter(|m| !m.starts_with('_')).count();
    if !evidence.is_empty() && public >= 3 {
        evidence.push(format!("Has {} public methods", public));
    }
    (confidence, evidence)
}

fn visitor(class: &ClassEntity) -> (Confidence, Vec<String>) {
    let mut evidence = Vec::new();
    let mut confidence = Confidence::Low;

    if class.name.contains("Visitor") {
        evidence.push("Name contains 'Visitor'".to_string());
        confidence = Confidence::High;
    }
    let visitor_bases: Vec<&str> = class
        .bases
        .iter()
        .filter(|b| b.contains("Visitor"))
        .map(String::as_str)
        .collect();
    if !visitor_bases.is_empty() {
        evidence.push(format!("Inherits from {}", visitor_bases.join(", ")));
        confidence = Confidence::High;
    }
    let visits = method_names(class)
        .filter(|m| m.starts_with("visit_") || (m.starts_with("visit") && m.len() > 5))
        .count();
    if visits >= 2 {
        evidence.push(format!("Has {} visit methods", visits));
        if confidence == Confidence::Low {
            confidence = Confidence::Medium;
        }
    }
    (confidence, evidence)
}

/// Siblings sharing the same bases and at least three method names.
fn strategy(class: &ClassEntity, all: &[ClassEntity]) -> (Confidence, Vec<String>) {
    if class.bases.is_empty() {
        return (Confidence::Low, Vec::new());
    }
    let bases: BTreeSet<&str> = class.bases.iter().map(String::as_str).collect();
    let methods: BTreeSet<&str> = method_names(class).collect();

    let evidence: Vec<String> = all
        .iter()
        .filter(|other| other.qualified_name != class.qualified_name)
        .filter(|other| other.bases.iter().map(String::as_str).collect::<BTreeSet<_>>() == bases)
        .filter(|other| method_names(other).filter(|m| methods.contains(m)).count() >= 3)
        .map(|other| format!("Shares interface with {}", other.name))
        .collect();
    (Confidence::Medium, evidence)
}
