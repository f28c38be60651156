use std::collections::HashMap;

use once_cell::sync::OnceCell;
use tree_sitter::{Node, Query};

use super::{looks_like_type_in_type_position, looks_like_type_name, LanguageGrammar, SourceModule};
use crate::indexer::parser::ParsedFile;
use crate::model::{ClassEntity, FunctionSignature, MethodSignature, Parameter, TypeRef};

pub struct PythonGrammar;

static PYTHON_IMPORTS_QUERY: OnceCell<Query> = OnceCell::new();

const PYTHON_BUILTINS: &[&str] = &[
    "True", "False", "None", "Self", "Any", "Optional", "Union", "List", "Dict", "Set",
    "FrozenSet", "Tuple", "Callable", "Type", "TypeVar", "Generic", "Iterable", "Iterator",
    "Generator", "Sequence", "Mapping", "MutableMapping", "Literal", "ClassVar", "Final",
    "Protocol", "Awaitable", "Coroutine", "AsyncIterator", "NotImplemented", "Ellipsis",
    "Exception", "BaseException", "ValueError", "TypeError", "KeyError", "IndexError",
    "RuntimeError", "AttributeError", "NotImplementedError", "StopIteration", "OSError",
    "IOError", "ABC", "ABCMeta", "Enum", "IntEnum", "NamedTuple", "TypedDict", "Path",
];

impl LanguageGrammar for PythonGrammar {
    fn name(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["py", "pyi"]
    }

    fn language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn imports_query(&self) -> &str {
        r#"
        (import_statement
            name: (dotted_name) @import_path)

        (import_statement
            name: (aliased_import
                name: (dotted_name) @import_path))

        (import_from_statement
            module_name: (_) @module
            name: (dotted_name) @name)

        (import_from_statement
            module_name: (_) @module
            name: (aliased_import
                name: (dotted_name) @name))
        "#
    }

    fn cached_imports_query(&self) -> Option<&'static Query> {
        PYTHON_IMPORTS_QUERY.get_or_try_init(|| {
            Query::new(&self.language(), self.imports_query())
        }).ok()
    }

    fn is_builtin_type(&self, name: &str) -> bool {
        matches!(
            name,
            "str" | "int" | "float" | "bool" | "bytes" | "list" | "dict" | "set" | "tuple"
                | "object" | "type" | "complex" | "frozenset" | "bytearray"
        ) || PYTHON_BUILTINS.contains(&name)
    }

    fn extract_classes(&self, parsed: &ParsedFile, module: &SourceModule) -> Vec<ClassEntity> {
        let mut visitor = PythonVisitor {
            grammar: self,
            parsed,
            module,
            classes: Vec::new(),
        };
        let root = parsed.root_node();
        for child in named_children(&root) {
            if let Some(class_node) = as_class(&child) {
                visitor.visit_class(&class_node, &[]);
            }
        }
        visitor.classes
    }

    fn extract_functions(&self, parsed: &ParsedFile) -> Vec<FunctionSignature> {
        let root = parsed.root_node();
        named_children(&root)
            .iter()
            .filter_map(|child| {
                let (func, _) = as_function(parsed, child)?;
                let (params, _) = read_parameters(parsed, &func, false);
                Some(FunctionSignature {
                    name: parsed.node_text(&func.child_by_field_name("name")?).to_string(),
                    params,
                    returns: return_type(parsed, &func),
                    description: docstring(parsed, &func),
                })
            })
            .collect()
    }
}

struct PythonVisitor<'a> {
    grammar: &'a PythonGrammar,
    parsed: &'a ParsedFile,
    module: &'a SourceModule,
    classes: Vec<ClassEntity>,
}

impl<'a> PythonVisitor<'a> {
    fn visit_class(&mut self, node: &Node, outer: &[String]) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.parsed.node_text(&name_node).to_string();
        let mut chain = outer.to_vec();
        chain.push(name.clone());

        let mut entity = ClassEntity::new(
            name,
            self.module.qualify(&chain.join(".")),
            self.module.path.clone(),
            "python",
            node.start_position().row as u32 + 1,
        );
        entity.description = docstring(self.parsed, node);

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            for arg in named_children(&superclasses) {
                // keyword arguments such as metaclass=ABCMeta are not bases
                if matches!(arg.kind(), "keyword_argument" | "comment" | "dictionary_splat" | "list_splat") {
                    continue;
                }
                entity.bases.push(collapse_whitespace(self.parsed.node_text(&arg)));
            }
        }

        let mut nested = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            for stmt in named_children(&body) {
                if let Some(inner) = as_class(&stmt) {
                    nested.push(inner);
                } else if let Some((func, decorators)) = as_function(self.parsed, &stmt) {
                    self.visit_method(&mut entity, &func, decorators);
                } else if stmt.kind() == "expression_statement" {
                    for expr in named_children(&stmt) {
                        if expr.kind() == "assignment" {
                            self.visit_class_assignment(&mut entity, &expr);
                        }
                    }
                }
            }
            self.collect_references(&mut entity, &body);
        }

        self.classes.push(entity);
        for inner in nested {
            self.visit_class(&inner, &chain);
        }
    }

    fn visit_method(&self, entity: &mut ClassEntity, func: &Node, decorators: Vec<String>) {
        let Some(name_node) = func.child_by_field_name("name") else {
            return;
        };
        let name = self.parsed.node_text(&name_node).to_string();

        if decorators.iter().any(|d| d.ends_with(".setter") || d.ends_with(".deleter")) {
            return;
        }

        let is_static = decorators.iter().any(|d| d == "staticmethod");
        let (params, scope) = read_parameters(self.parsed, func, !is_static);
        let returns = if name == "__init__" && func.child_by_field_name("return_type").is_none() {
            TypeRef::named("None")
        } else {
            return_type(self.parsed, func)
        };

        if decorators.iter().any(|d| is_property_decorator(d)) {
            entity.add_field(&name, returns, Some(self.parsed.node_line(func)));
            return;
        }

        if let Some(body) = func.child_by_field_name("body") {
            self.collect_self_assignments(entity, &body, &scope);
        }

        entity.methods.push(MethodSignature {
            name,
            params,
            returns: Some(returns),
            decorators,
            description: docstring(self.parsed, func),
        });
    }

    /// Class-level `x: T = v`, `x: T` and `x = v`
    fn visit_class_assignment(&self, entity: &mut ClassEntity, assignment: &Node) {
        let (targets, value) = flatten_assignment(assignment);
        let annotated = assignment
            .child_by_field_name("type")
            .map(|t| annotation_type(self.parsed.node_text(&t)));
        let hint = Some(self.parsed.node_line(assignment));

        for target in targets {
            let mut names = Vec::new();
            flatten_target(&target, &mut names);
            let single = names.len() == 1;
            for name_node in names {
                if name_node.kind() != "identifier" {
                    continue;
                }
                let type_ref = match (&annotated, single, value) {
                    (Some(t), _, _) => t.clone(),
                    (None, true, Some(v)) => infer_value_type(self.parsed, &v, &HashMap::new()),
                    _ => TypeRef::Unknown,
                };
                entity.add_field(self.parsed.node_text(&name_node), type_ref, hint.clone());
            }
        }
    }

    /// `self.x = v` and `self.x: T = v` anywhere in a method body, nested
    /// functions and classes excluded.
    fn collect_self_assignments(
        &self,
        entity: &mut ClassEntity,
        node: &Node,
        scope: &HashMap<String, TypeRef>,
    ) {
        for child in named_children(node) {
            match child.kind() {
                "function_definition" | "class_definition" | "decorated_definition" | "lambda" => {}
                "assignment" => {
                    self.visit_self_assignment(entity, &child, scope);
                    if let Some(right) = child.child_by_field_name("right") {
                        self.collect_self_assignments(entity, &right, scope);
                    }
                }
                _ => self.collect_self_assignments(entity, &child, scope),
            }
        }
    }

    fn visit_self_assignment(
        &self,
        entity: &mut ClassEntity,
        assignment: &Node,
        scope: &HashMap<String, TypeRef>,
    ) {
        let (targets, value) = flatten_assignment(assignment);
        let annotated = assignment
            .child_by_field_name("type")
            .map(|t| annotation_type(self.parsed.node_text(&t)));
        let hint = Some(self.parsed.node_line(assignment));

        for target in targets {
            let mut names = Vec::new();
            flatten_target(&target, &mut names);
            let single = names.len() == 1;
            for node in names {
                let Some(attr) = self_attribute(self.parsed, &node) else {
                    continue;
                };
                let type_ref = match (&annotated, single, value) {
                    (Some(t), _, _) => t.clone(),
                    (None, true, Some(v)) => infer_value_type(self.parsed, &v, scope),
                    _ => TypeRef::Unknown,
                };
                entity.add_field(attr, type_ref, hint.clone());
            }
        }
    }

    fn collect_references(&self, entity: &mut ClassEntity, node: &Node) {
        for child in named_children(node) {
            match child.kind() {
                "class_definition" => continue,
                "decorated_definition" if as_class(&child).is_some() => continue,
                "identifier" => {
                    let text = self.parsed.node_text(&child);
                    let candidate = if in_type_position(&child) {
                        looks_like_type_in_type_position(text)
                    } else {
                        looks_like_type_name(text)
                    };
                    if candidate && !self.grammar.is_builtin_type(text) {
                        entity.add_reference(text);
                    }
                }
                "string" => {
                    // forward references written as string annotations
                    if child.parent().map_or(false, |p| p.kind() == "type" || p.kind() == "subscript") {
                        let inner = strip_string_literal(self.parsed.node_text(&child));
                        if is_identifier(inner)
                            && looks_like_type_name(inner)
                            && !self.grammar.is_builtin_type(inner)
                        {
                            entity.add_reference(inner);
                        }
                    }
                }
                _ => self.collect_references(entity, &child),
            }
        }
    }
}

fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Unwraps `decorated_definition` around a class.
fn as_class<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    match node.kind() {
        "class_definition" => Some(*node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|d| d.kind() == "class_definition"),
        _ => None,
    }
}

/// Unwraps `decorated_definition` around a function, returning decorator names.
fn as_function<'t>(parsed: &ParsedFile, node: &Node<'t>) -> Option<(Node<'t>, Vec<String>)> {
    match node.kind() {
        "function_definition" => Some((*node, Vec::new())),
        "decorated_definition" => {
            let def = node
                .child_by_field_name("definition")
                .filter(|d| d.kind() == "function_definition")?;
            let decorators = named_children(node)
                .into_iter()
                .filter(|c| c.kind() == "decorator")
                .map(|c| decorator_name(parsed, &c))
                .collect();
            Some((def, decorators))
        }
        _ => None,
    }
}

/// `@functools.lru_cache(maxsize=1)` → `functools.lru_cache`
fn decorator_name(parsed: &ParsedFile, decorator: &Node) -> String {
    let text = parsed.node_text(decorator).trim_start_matches('@').trim();
    let name = text.split('(').next().unwrap_or(text);
    name.trim().to_string()
}

fn is_property_decorator(name: &str) -> bool {
    matches!(name, "property" | "cached_property" | "functools.cached_property")
}

/// Parameters with `self`/`cls` dropped, plus a name → type scope for inference.
fn read_parameters(
    parsed: &ParsedFile,
    func: &Node,
    skip_receiver: bool,
) -> (Vec<Parameter>, HashMap<String, TypeRef>) {
    let mut params = Vec::new();
    let mut scope = HashMap::new();
    let Some(list) = func.child_by_field_name("parameters") else {
        return (params, scope);
    };

    for (index, param) in named_children(&list).into_iter().enumerate() {
        let (name, type_ref) = match param.kind() {
            "identifier" => (parsed.node_text(&param).to_string(), TypeRef::Unknown),
            "typed_parameter" => {
                let name = named_children(&param)
                    .into_iter()
                    .find(|c| c.kind() != "type")
                    .map(|c| splat_name(parsed, &c))
                    .unwrap_or_default();
                let type_ref = param
                    .child_by_field_name("type")
                    .map(|t| annotation_type(parsed.node_text(&t)))
                    .unwrap_or_default();
                (name, type_ref)
            }
            "default_parameter" => {
                let name = param
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(&n).to_string())
                    .unwrap_or_default();
                let type_ref = param
                    .child_by_field_name("value")
                    .map(|v| literal_type(&v))
                    .unwrap_or_default();
                (name, type_ref)
            }
            "typed_default_parameter" => {
                let name = param
                    .child_by_field_name("name")
                    .map(|n| parsed.node_text(&n).to_string())
                    .unwrap_or_default();
                let type_ref = param
                    .child_by_field_name("type")
                    .map(|t| annotation_type(parsed.node_text(&t)))
                    .unwrap_or_default();
                (name, type_ref)
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                (splat_name(parsed, &param), TypeRef::Unknown)
            }
            _ => continue,
        };

        if name.is_empty() {
            continue;
        }
        if skip_receiver && index == 0 && (name == "self" || name == "cls") {
            continue;
        }
        scope.insert(name.clone(), type_ref.clone());
        params.push(Parameter { name, type_ref });
    }

    (params, scope)
}

fn splat_name(parsed: &ParsedFile, node: &Node) -> String {
    parsed.node_text(node).trim_start_matches('*').to_string()
}

fn return_type(parsed: &ParsedFile, func: &Node) -> TypeRef {
    func.child_by_field_name("return_type")
        .map(|t| annotation_type(parsed.node_text(&t)))
        .unwrap_or_default()
}

/// Left-hand targets of a (possibly chained) assignment and its final value.
fn flatten_assignment<'t>(assignment: &Node<'t>) -> (Vec<Node<'t>>, Option<Node<'t>>) {
    let mut targets = Vec::new();
    let mut current = *assignment;
    loop {
        if let Some(left) = current.child_by_field_name("left") {
            targets.push(left);
        }
        match current.child_by_field_name("right") {
            Some(right) if right.kind() == "assignment" => current = right,
            right => return (targets, right),
        }
    }
}

fn flatten_target<'t>(node: &Node<'t>, out: &mut Vec<Node<'t>>) {
    match node.kind() {
        "pattern_list" | "tuple_pattern" | "list_pattern" | "tuple" | "list"
        | "parenthesized_expression" => {
            for child in named_children(node) {
                flatten_target(&child, out);
            }
        }
        _ => out.push(*node),
    }
}

/// `self.name` → `name`
fn self_attribute<'s>(parsed: &'s ParsedFile, node: &Node) -> Option<&'s str> {
    if node.kind() != "attribute" {
        return None;
    }
    let object = node.child_by_field_name("object")?;
    if object.kind() != "identifier" || parsed.node_text(&object) != "self" {
        return None;
    }
    node.child_by_field_name("attribute")
        .map(|a| parsed.node_text(&a))
}

/// Annotations and the callee of a call expression.
fn in_type_position(node: &Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "type" => true,
        "call" => parent
            .child_by_field_name("function")
            .map_or(false, |callee| callee.id() == node.id()),
        _ => false,
    }
}

/// Annotation text with whitespace collapsed and string forward references
/// unquoted. Anything containing a call is not a simple name.
pub(crate) fn annotation_type(raw: &str) -> TypeRef {
    let collapsed = collapse_whitespace(raw);
    let unquoted: String = collapsed.chars().filter(|c| *c != '\'' && *c != '"').collect();
    let cleaned = unquoted.trim();
    if cleaned.is_empty() || cleaned.contains('(') || cleaned.starts_with("lambda") {
        TypeRef::Unknown
    } else {
        TypeRef::named(cleaned)
    }
}

fn infer_value_type(parsed: &ParsedFile, value: &Node, scope: &HashMap<String, TypeRef>) -> TypeRef {
    match value.kind() {
        "call" => value
            .child_by_field_name("function")
            .filter(|f| matches!(f.kind(), "identifier" | "attribute"))
            .map(|f| TypeRef::named(parsed.node_text(&f)))
            .unwrap_or_default(),
        "identifier" => scope
            .get(parsed.node_text(value))
            .cloned()
            .unwrap_or_default(),
        _ => literal_type(value),
    }
}

fn literal_type(value: &Node) -> TypeRef {
    let name = match value.kind() {
        "string" | "concatenated_string" => "str",
        "integer" => "int",
        "float" => "float",
        "true" | "false" => "bool",
        "list" | "list_comprehension" => "list",
        "dictionary" | "dictionary_comprehension" => "dict",
        "set" | "set_comprehension" => "set",
        "tuple" => "tuple",
        _ => return TypeRef::Unknown,
    };
    TypeRef::named(name)
}

fn docstring(parsed: &ParsedFile, definition: &Node) -> Option<String> {
    let body = definition.child_by_field_name("body")?;
    let first = named_children(&body).into_iter().next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = named_children(&first).into_iter().next()?;
    if expr.kind() != "string" {
        return None;
    }
    let text = strip_string_literal(parsed.node_text(&expr)).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn strip_string_literal(raw: &str) -> &str {
    let s = raw.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'b' | 'B' | 'u' | 'U' | 'f' | 'F'));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}
