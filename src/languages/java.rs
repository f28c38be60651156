use once_cell::sync::OnceCell;
use tree_sitter::{Node, Query};

use super::{looks_like_type_in_type_position, looks_like_type_name, LanguageGrammar, SourceModule};
use crate::indexer::parser::ParsedFile;
use crate::model::{ClassEntity, MethodSignature, Parameter, TypeRef};

pub struct JavaGrammar;

static JAVA_IMPORTS_QUERY: OnceCell<Query> = OnceCell::new();

const JAVA_PRIMITIVES: &[&str] = &[
    "int", "long", "short", "byte", "char", "boolean", "float", "double", "void", "var",
];

const JAVA_BUILTINS: &[&str] = &[
    "String", "Object", "Integer", "Long", "Short", "Byte", "Character", "Boolean", "Float",
    "Double", "Void", "Number", "Class", "Enum", "Record", "CharSequence", "StringBuilder",
    "List", "ArrayList", "LinkedList", "Map", "HashMap", "LinkedHashMap", "TreeMap", "Set",
    "HashSet", "TreeSet", "Collection", "Collections", "Arrays", "Iterable", "Iterator",
    "Optional", "Stream", "Collectors", "Objects", "Math", "System", "Thread", "Runnable",
    "Comparable", "Comparator", "Function", "BiFunction", "Supplier", "Consumer", "Predicate",
    "Exception", "RuntimeException", "IllegalArgumentException", "IllegalStateException",
    "NullPointerException", "IOException", "Throwable", "Error", "Override", "Deprecated",
    "FunctionalInterface", "SuppressWarnings", "SafeVarargs", "UUID", "BigDecimal",
    "BigInteger", "LocalDate", "LocalDateTime", "Instant", "Duration",
];

const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

impl LanguageGrammar for JavaGrammar {
    fn name(&self) -> &'static str {
        "java"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["java"]
    }

    fn language(&self) -> tree_sitter::Language {
        tree_sitter_java::LANGUAGE.into()
    }

    fn imports_query(&self) -> &str {
        r#"
        (import_declaration) @import_path
        "#
    }

    fn cached_imports_query(&self) -> Option<&'static Query> {
        JAVA_IMPORTS_QUERY.get_or_try_init(|| {
            Query::new(&self.language(), self.imports_query())
        }).ok()
    }

    fn is_builtin_type(&self, name: &str) -> bool {
        JAVA_PRIMITIVES.contains(&name) || JAVA_BUILTINS.contains(&name)
    }

    fn extract_classes(&self, parsed: &ParsedFile, module: &SourceModule) -> Vec<ClassEntity> {
        let root = parsed.root_node();
        let package = children(&root)
            .into_iter()
            .find(|c| c.kind() == "package_declaration")
            .and_then(|p| {
                children(&p)
                    .into_iter()
                    .find(|c| matches!(c.kind(), "scoped_identifier" | "identifier"))
            })
            .map(|n| parsed.node_text(&n).to_string());

        let mut visitor = JavaVisitor {
            grammar: self,
            parsed,
            module,
            package,
            classes: Vec::new(),
        };
        for child in children(&root) {
            if TYPE_DECLARATIONS.contains(&child.kind()) {
                visitor.visit_type(&child, &[]);
            }
        }
        visitor.classes
    }
}

struct JavaVisitor<'a> {
    grammar: &'a JavaGrammar,
    parsed: &'a ParsedFile,
    module: &'a SourceModule,
    package: Option<String>,
    classes: Vec<ClassEntity>,
}

impl<'a> JavaVisitor<'a> {
    fn qualify(&self, nested: &str) -> String {
        match &self.package {
            Some(pkg) => format!("{}.{}", pkg, nested),
            None => self.module.qualify(nested),
        }
    }

    fn visit_type(&mut self, node: &Node, outer: &[String]) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.parsed.node_text(&name_node).to_string();
        let mut chain = outer.to_vec();
        chain.push(name.clone());

        let mut entity = ClassEntity::new(
            name,
            self.qualify(&chain.join(".")),
            self.module.path.clone(),
            "java",
            node.start_position().row as u32 + 1,
        );
        entity.description = javadoc(self.parsed, node);
        entity.bases = self.bases(node);

        if node.kind() == "record_declaration" {
            if let Some(params) = node.child_by_field_name("parameters") {
                for (name, type_ref) in self.formal_parameters(&params) {
                    entity.add_field(&name, type_ref, Some(self.parsed.node_line(&params)));
                }
            }
        }

        let mut nested = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_body(&mut entity, &body, &mut nested);
            self.collect_references(&mut entity, &body);
        }

        self.classes.push(entity);
        for inner in nested {
            self.visit_type(&inner, &chain);
        }
    }

    /// Superclass first, then implemented or extended interfaces in order.
    fn bases(&self, node: &Node) -> Vec<String> {
        let mut bases = Vec::new();
        for child in children(node) {
            match child.kind() {
                "superclass" => {
                    if let Some(ty) = children(&child).into_iter().next() {
                        bases.push(type_text(self.parsed, &ty));
                    }
                }
                "super_interfaces" | "extends_interfaces" => {
                    for list in children(&child).into_iter().filter(|c| c.kind() == "type_list") {
                        for ty in children(&list) {
                            bases.push(type_text(self.parsed, &ty));
                        }
                    }
                }
                _ => {}
            }
        }
        bases
    }

    fn visit_body<'t>(&self, entity: &mut ClassEntity, body: &Node<'t>, nested: &mut Vec<Node<'t>>) {
        for member in children(body) {
            match member.kind() {
                kind if TYPE_DECLARATIONS.contains(&kind) => nested.push(member),
                "field_declaration" | "constant_declaration" => self.visit_field(entity, &member),
                "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
                    self.visit_method(entity, &member)
                }
                // enum constants come first, members live in enum_body_declarations
                "enum_body_declarations" => self.visit_body(entity, &member, nested),
                _ => {}
            }
        }
    }

    fn visit_field(&self, entity: &mut ClassEntity, field: &Node) {
        let type_ref = field
            .child_by_field_name("type")
            .map(|t| TypeRef::named(type_text(self.parsed, &t)))
            .unwrap_or_default();
        let hint = Some(self.parsed.node_line(field));

        let mut cursor = field.walk();
        for declarator in field.children_by_field_name("declarator", &mut cursor) {
            if let Some(name) = declarator.child_by_field_name("name") {
                entity.add_field(self.parsed.node_text(&name), type_ref.clone(), hint.clone());
            }
        }
    }

    fn visit_method(&self, entity: &mut ClassEntity, method: &Node) {
        let Some(name_node) = method.child_by_field_name("name") else {
            return;
        };

        let params = method
            .child_by_field_name("parameters")
            .map(|p| self.formal_parameters(&p))
            .unwrap_or_default()
            .into_iter()
            .map(|(name, type_ref)| Parameter { name, type_ref })
            .collect();

        let returns = method
            .child_by_field_name("type")
            .map(|t| TypeRef::named(type_text(self.parsed, &t)));

        entity.methods.push(MethodSignature {
            name: self.parsed.node_text(&name_node).to_string(),
            params,
            returns,
            decorators: annotations(self.parsed, method),
            description: javadoc(self.parsed, method),
        });
    }

    fn formal_parameters(&self, params: &Node) -> Vec<(String, TypeRef)> {
        let mut out = Vec::new();
        for param in children(params) {
            match param.kind() {
                "formal_parameter" => {
                    let name = param.child_by_field_name("name");
                    let ty = param.child_by_field_name("type");
                    if let Some(name) = name {
                        let type_ref = ty
                            .map(|t| TypeRef::named(type_text(self.parsed, &t)))
                            .unwrap_or_default();
                        out.push((self.parsed.node_text(&name).to_string(), type_ref));
                    }
                }
                "spread_parameter" => {
                    let parts = children(&param);
                    let ty = parts
                        .iter()
                        .find(|c| !matches!(c.kind(), "modifiers" | "variable_declarator"));
                    let name = parts
                        .iter()
                        .find(|c| c.kind() == "variable_declarator")
                        .and_then(|d| d.child_by_field_name("name"));
                    if let Some(name) = name {
                        let type_ref = ty
                            .map(|t| TypeRef::named(format!("{}...", type_text(self.parsed, t))))
                            .unwrap_or_default();
                        out.push((self.parsed.node_text(&name).to_string(), type_ref));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn collect_references(&self, entity: &mut ClassEntity, node: &Node) {
        for child in children(node) {
            let kind = child.kind();
            if TYPE_DECLARATIONS.contains(&kind) {
                continue;
            }
            if kind == "type_identifier" || kind == "identifier" {
                let text = self.parsed.node_text(&child);
                let candidate = if kind == "type_identifier" {
                    looks_like_type_in_type_position(text)
                } else {
                    looks_like_type_name(text)
                };
                if candidate && !self.grammar.is_builtin_type(text) {
                    entity.add_reference(text);
                }
                continue;
            }
            self.collect_references(entity, &child);
        }
    }
}

fn children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn type_text(parsed: &ParsedFile, node: &Node) -> String {
    parsed.node_text(node).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Annotation names from the declaration's modifiers, without `@` or arguments.
fn annotations(parsed: &ParsedFile, decl: &Node) -> Vec<String> {
    children(decl)
        .into_iter()
        .filter(|c| c.kind() == "modifiers")
        .flat_map(|m| children(&m))
        .filter(|c| matches!(c.kind(), "marker_annotation" | "annotation"))
        .filter_map(|a| a.child_by_field_name("name"))
        .map(|n| parsed.node_text(&n).to_string())
        .collect()
}

/// A `/** ... */` comment directly before the declaration, first paragraph only.
fn javadoc(parsed: &ParsedFile, decl: &Node) -> Option<String> {
    let prev = decl.prev_named_sibling()?;
    if prev.kind() != "block_comment" {
        return None;
    }
    let raw = parsed.node_text(&prev);
    let body = raw.strip_prefix("/**")?.strip_suffix("*/")?;
    let text = body
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .take_while(|l| !l.starts_with('@'))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
