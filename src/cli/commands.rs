use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use archscope::config::Config;
use archscope::error::{ArchError, Result};
use archscope::graph::{find_patterns, PatternKind};
use archscope::indexer::{AnalysisProgress, FileWalker, ProjectAnalyzer};
use archscope::pipeline::{ArchitectureReport, Pipeline};

use super::GlobalOptions;

const DEFAULT_OUT_DIR: &str = ".archscope";

/// Loads the config for `root` and applies command-line overrides.
pub fn load_config(root: &Path, options: &GlobalOptions) -> Result<Config> {
    let mut config = Config::load(root, options.config.as_deref())?;
    if let Some(depth) = options.max_depth {
        config.analysis.max_depth = depth;
    }
    if let Some(threads) = options.threads {
        config.analysis.threads = Some(threads);
    }
    if options.enrich {
        config.enrichment.enabled = true;
    }
    if let Some(format) = options.format {
        config.diagram.format = format;
    }
    config.validate()?;
    Ok(config)
}

pub async fn analyze(
    path: &Path,
    out: Option<PathBuf>,
    options: &GlobalOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = load_config(path, options)?;
    let report = run_pipeline(path, config, cancel).await?;
    let out = out.unwrap_or_else(|| path.join(DEFAULT_OUT_DIR));
    let written = report.write_to(&out)?;

    print!("{}", report.summary);
    println!();
    for file in written {
        println!("Wrote {}", file.display());
    }
    Ok(())
}

pub fn tree(path: &Path, options: &GlobalOptions) -> Result<()> {
    let config = load_config(path, options)?;
    let root = Config::resolve_root(path)?;
    let walked = FileWalker::new(config.ignore, config.analysis).walk(&root)?;

    println!("{}", walked.tree.render());
    if !walked.diagnostics.is_empty() {
        println!();
        println!("Diagnostics ({}):", walked.diagnostics.len());
        for diagnostic in &walked.diagnostics {
            println!("  {}", diagnostic);
        }
    }
    Ok(())
}

pub fn file(path: &Path, options: &GlobalOptions) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let config = load_config(dir, options)?;
    let result = ProjectAnalyzer::new(&config).analyze_file(path)?;

    let document = serde_json::json!({
        "file": result.file,
        "diagnostics": result.diagnostics,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

pub async fn diagram(path: &Path, options: &GlobalOptions, cancel: &CancellationToken) -> Result<()> {
    let config = load_config(path, options)?;
    let report = run_pipeline(path, config, cancel).await?;
    print!("{}", report.diagram);
    Ok(())
}

pub async fn core(
    path: &Path,
    min_connections: Option<usize>,
    options: &GlobalOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = load_config(path, options)?;
    let min = min_connections.unwrap_or(config.diagram.min_connections);
    let report = run_pipeline(path, config, cancel).await?;
    let core = report.graph.core_classes(min);

    if core.is_empty() {
        println!("No classes with at least {} connections", min);
        return Ok(());
    }
    println!("{:>4}  {:>5}  {:<40}  {}", "RANK", "CONN", "CLASS", "MODULE");
    for node in core {
        println!(
            "{:>4}  {:>5}  {:<40}  {}",
            node.rank, node.connections, node.qualified_name, node.module
        );
    }
    Ok(())
}

pub async fn patterns(
    path: &Path,
    kind: PatternKind,
    options: &GlobalOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = load_config(path, options)?;
    let progress = AnalysisProgress::new();
    let analyzer = ProjectAnalyzer::new(&config).with_progress(progress.clone());
    let display = ProgressDisplay::spawn(progress);

    let root = path.to_path_buf();
    let token = cancel.clone();
    let analysis = tokio::task::spawn_blocking(move || analyzer.analyze(&root, &token))
        .await
        .map_err(|e| ArchError::Io(std::io::Error::other(e)))?;
    display.finish().await;
    let analysis = analysis?;

    let matches = find_patterns(&analysis.classes, kind);
    if matches.is_empty() {
        println!("No {} pattern candidates found", kind);
        return Ok(());
    }
    println!("Found {} {} candidates:", matches.len(), kind);
    for m in matches {
        println!();
        println!("{} ({}) [{:?}]", m.qualified_name, m.module, m.confidence);
        for evidence in &m.evidence {
            println!("  - {}", evidence);
        }
        if let Some(description) = &m.description {
            println!("  {}", description);
        }
    }
    Ok(())
}

async fn run_pipeline(
    path: &Path,
    config: Config,
    cancel: &CancellationToken,
) -> Result<ArchitectureReport> {
    let progress = AnalysisProgress::new();
    let pipeline = Pipeline::new(config)?.with_progress(progress.clone());

    let display = ProgressDisplay::spawn(progress);
    let report = pipeline.run(path, cancel).await;
    display.finish().await;
    report
}

/// Progress bar on stderr, polled from the analyzer's shared counters.
struct ProgressDisplay {
    bar: ProgressBar,
    poller: JoinHandle<()>,
}

impl ProgressDisplay {
    fn spawn(progress: AnalysisProgress) -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }

        let handle = bar.clone();
        let poller = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(100));
            loop {
                tick.tick().await;
                let snapshot = progress.snapshot();
                handle.set_length(snapshot.files_total as u64);
                handle.set_position(snapshot.files_processed as u64);
                handle.set_message(format!(
                    "({} classes, {} parse errors)",
                    snapshot.classes_extracted, snapshot.parse_errors
                ));
            }
        });
        Self { bar, poller }
    }

    async fn finish(self) {
        self.poller.abort();
        let _ = self.poller.await;
        self.bar.finish_and_clear();
    }
}
