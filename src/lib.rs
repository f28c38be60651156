pub mod config;
pub mod diagram;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod languages;
pub mod model;
pub mod pipeline;

pub use config::{Config, DiagramFormat};
pub use diagram::{node_id, DiagramEmitter, GraphExport};
pub use enrich::{EnrichmentReport, InferenceRequest, InferenceResponse, TypeEnricher, TypeInferenceService};
pub use error::{ArchError, Result};
pub use graph::{ClassRelationship, Edge, EdgeKind, RelationshipExtractor, RelationshipGraph};
pub use indexer::{FileWalker, ProjectAnalysis, ProjectAnalyzer};
pub use languages::LanguageRegistry;
pub use model::{ClassEntity, Diagnostic, DiagnosticKind, FileSystemNode, TypeRef};
pub use pipeline::{ArchitectureReport, Pipeline};
