//! Data model shared by every analysis stage.

mod diagnostic;
mod entity;
mod tree;

pub use diagnostic::{Diagnostic, DiagnosticKind};
pub use entity::{ClassEntity, Field, FileAnalysis, FunctionSignature, MethodSignature, Parameter, TypeRef};
pub use tree::{FileRole, FileSystemNode, NodeKind};
