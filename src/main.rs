mod cli;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "archscope=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling analysis");
            on_interrupt.cancel();
        }
    });

    let options = &cli.options;
    match cli.command {
        Commands::Analyze { path, out } => {
            cli::analyze(&path, out, options, &cancel).await?;
        }
        Commands::Tree { path } => {
            cli::tree(&path, options)?;
        }
        Commands::File { path } => {
            cli::file(&path, options)?;
        }
        Commands::Diagram { path } => {
            cli::diagram(&path, options, &cancel).await?;
        }
        Commands::Core { path, min_connections } => {
            cli::core(&path, min_connections, options, &cancel).await?;
        }
        Commands::Patterns { path, pattern } => {
            cli::patterns(&path, pattern, options, &cancel).await?;
        }
    }

    Ok(())
}
