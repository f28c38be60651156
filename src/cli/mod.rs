mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use archscope::config::DiagramFormat;
use archscope::graph::PatternKind;

pub use commands::*;

#[derive(Parser)]
#[command(name = "archscope")]
#[command(about = "Static architecture analysis: class extraction and relationship diagrams using tree-sitter")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Analyze the current directory and write artifacts to ./.archscope
    archscope analyze

    # Analyze a project into a custom output directory
    archscope analyze ./my-project --out ./arch

    # Print the filtered project tree
    archscope tree ./my-project --max-depth 3

    # Print a PlantUML class diagram
    archscope diagram ./my-project --format plantuml

    # List the most connected classes
    archscope core ./my-project --min-connections 3

    # Look for factory classes
    archscope patterns ./my-project factory

    # Resolve unknown types through an inference endpoint
    archscope analyze ./my-project --enrich
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub options: GlobalOptions,
}

/// Overrides applied on top of the loaded configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Config file (default: <path>/archscope.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Maximum traversal depth
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,

    /// Parser worker threads
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Enable type enrichment through the configured endpoint
    #[arg(long, global = true)]
    pub enrich: bool,

    /// Diagram format (mermaid, plantuml)
    #[arg(long, global = true)]
    pub format: Option<DiagramFormat>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline and write all artifacts
    Analyze {
        /// Project root
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output directory (default: <path>/.archscope)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Print the filtered file tree
    Tree {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Extract classes, functions and imports from a single file
    File {
        path: PathBuf,
    },

    /// Print the class diagram
    Diagram {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// List classes ranked by connection count
    Core {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Minimum connections to report (default from config)
        #[arg(long)]
        min_connections: Option<usize>,
    },

    /// Search for a design pattern (factory, singleton, service, visitor, strategy)
    Patterns {
        path: PathBuf,

        pattern: PatternKind,
    },
}
