use anyhow::Result;
use clap::Parser;
use ekz_tesla::cli::Args;
use ekz_tesla::commands;
use ekz_tesla::logging::init_logging;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, store) = commands::load_config(&args.global)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    if let Some(path) = store.path() {
        debug!("Using configuration {}", path.display());
    }

    // Ctrl+C cancels long-running loops; they shut down cleanly
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal_cancel.cancel();
        }
    });

    commands::run(args, config, store, cancel).await?;
    Ok(())
}
