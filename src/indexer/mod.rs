pub mod analyzer;
pub mod extractor;
pub mod parser;
pub mod progress;
pub mod walker;

pub use analyzer::{ProjectAnalysis, ProjectAnalyzer};
pub use extractor::{ClassExtractor, ExtractionResult};
pub use parser::{ParsedFile, Parser};
pub use progress::{AnalysisProgress, ProgressSnapshot};
pub use walker::{FileWalker, WalkResult};
