//! End-to-end run: analyze, optionally enrich, build the graph, render.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, DiagramFormat};
use crate::diagram::{render_summary, DiagramEmitter};
use crate::enrich::{ChatInferenceService, EnrichmentReport, TypeEnricher, TypeInferenceService};
use crate::error::{ArchError, Result};
use crate::graph::{RelationshipExtractor, RelationshipGraph};
use crate::indexer::{AnalysisProgress, ProjectAnalysis, ProjectAnalyzer};

pub const PROJECT_CONTEXT_FILE: &str = "project_context.json";
pub const RELATIONSHIPS_FILE: &str = "class_relationships.json";
pub const SUMMARY_FILE: &str = "architecture_summary.md";

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct ArchitectureReport {
    pub analysis: ProjectAnalysis,
    pub graph: RelationshipGraph,
    pub diagram: String,
    pub diagram_format: DiagramFormat,
    pub export_json: String,
    pub summary: String,
    /// `None` when no inference service was configured
    pub enrichment: Option<EnrichmentReport>,
}

impl ArchitectureReport {
    /// Writes the four output artifacts into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let mut context = serde_json::to_string_pretty(&self.analysis)?;
        context.push('\n');
        let diagram_file = format!("class_diagram.{}", self.diagram_format.file_extension());

        let outputs = [
            (PROJECT_CONTEXT_FILE, context.as_str()),
            (RELATIONSHIPS_FILE, self.export_json.as_str()),
            (diagram_file.as_str(), self.diagram.as_str()),
            (SUMMARY_FILE, self.summary.as_str()),
        ];

        let mut written = Vec::with_capacity(outputs.len());
        for (name, content) in outputs {
            let path = dir.join(name);
            fs::write(&path, content)?;
            written.push(path);
        }
        info!("Wrote {} artifacts to {}", written.len(), dir.display());
        Ok(written)
    }
}

pub struct Pipeline {
    config: Config,
    service: Option<Arc<dyn TypeInferenceService>>,
    progress: AnalysisProgress,
}

impl Pipeline {
    /// Validates `config`; builds the chat inference client when enrichment
    /// is enabled.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let service: Option<Arc<dyn TypeInferenceService>> = if config.enrichment.enabled {
            Some(Arc::new(ChatInferenceService::from_settings(&config.enrichment)?))
        } else {
            None
        };
        Ok(Self {
            config,
            service,
            progress: AnalysisProgress::new(),
        })
    }

    /// Uses `service` for enrichment regardless of `enrichment.enabled`.
    pub fn with_inference_service(mut self, service: Arc<dyn TypeInferenceService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_progress(mut self, progress: AnalysisProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, root: &Path, cancel: &CancellationToken) -> Result<ArchitectureReport> {
        let analyzer = ProjectAnalyzer::new(&self.config).with_progress(self.progress.clone());
        let owned_root = root.to_path_buf();
        let token = cancel.clone();
        let mut analysis = tokio::task::spawn_blocking(move || analyzer.analyze(&owned_root, &token))
            .await
            .map_err(|e| ArchError::Io(std::io::Error::other(e)))??;

        let enrichment = match &self.service {
            Some(service) => {
                let enricher = TypeEnricher::new(Arc::clone(service), self.config.enrichment.clone());
                let report = enricher
                    .enrich(&mut analysis.classes, &mut analysis.diagnostics, cancel)
                    .await;
                Some(report)
            }
            None => None,
        };
        if cancel.is_cancelled() {
            return Err(ArchError::Cancelled);
        }

        let graph = RelationshipExtractor::new(&analysis.classes).build();
        let emitter = DiagramEmitter::from_settings(&self.config.diagram);
        let diagram = emitter.render(&graph, &analysis.classes);
        let export_json = emitter.export_json(&graph)?;
        let summary = render_summary(&analysis, &graph, enrichment.as_ref());

        info!(
            "Built graph: {} classes, {} edges",
            graph.len(),
            graph.edges().len()
        );
        Ok(ArchitectureReport {
            analysis,
            graph,
            diagram,
            diagram_format: emitter.format(),
            export_json,
            summary,
            enrichment,
        })
    }
}
