use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const UNKNOWN: &str = "Unknown";

/// Declared or inferred type of a field, parameter or return value.
///
/// `Unknown` is an explicit marker rather than an absent value, so graph
/// resolution stays total and enrichment is an in-place upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeRef {
    Named(String),
    #[default]
    Unknown,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() || name == UNKNOWN {
            TypeRef::Unknown
        } else {
            TypeRef::Named(name)
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeRef::Unknown)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name) => Some(name),
            TypeRef::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &str {
        self.name().unwrap_or(UNKNOWN)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TypeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TypeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TypeRef::named(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    /// Source line the field was first seen on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<Parameter>,
    /// `None` for constructs without a return type, such as constructors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<TypeRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MethodSignature {
    /// Rendered as `name(a, b)`, used in diagrams
    pub fn display_params(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

/// Module-level function, reported by single-file analysis only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<Parameter>,
    pub returns: TypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One type/class declaration extracted from a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntity {
    pub name: String,
    pub qualified_name: String,
    /// Root-relative path of the declaring file
    pub module: String,
    pub language: String,
    pub line: u32,
    pub bases: Vec<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<MethodSignature>,
    /// Capitalized identifiers referenced in the class body (usage candidates)
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ClassEntity {
    pub fn new(
        name: impl Into<String>,
        qualified_name: impl Into<String>,
        module: impl Into<String>,
        language: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
            module: module.into(),
            language: language.into(),
            line,
            bases: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            references: Vec::new(),
            description: None,
        }
    }

    /// Records a field, keeping first-seen order.
    ///
    /// A repeated field only changes when it upgrades `Unknown` to a known type.
    pub fn add_field(&mut self, name: &str, type_ref: TypeRef, hint: Option<String>) {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == name) {
            if existing.type_ref.is_unknown() && !type_ref.is_unknown() {
                existing.type_ref = type_ref;
            }
            return;
        }
        self.fields.push(Field {
            name: name.to_string(),
            type_ref,
            hint,
        });
    }

    pub fn add_reference(&mut self, name: &str) {
        if !self.references.iter().any(|r| r == name) {
            self.references.push(name.to_string());
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn unknown_count(&self) -> usize {
        let fields = self.fields.iter().filter(|f| f.type_ref.is_unknown()).count();
        let params = self
            .methods
            .iter()
            .flat_map(|m| &m.params)
            .filter(|p| p.type_ref.is_unknown())
            .count();
        fields + params
    }
}

/// Result of analysing one source file in isolation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: PathBuf,
    pub language: String,
    pub classes: Vec<ClassEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionSignature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
}

impl FileAnalysis {
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    pub fn method_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }
}
