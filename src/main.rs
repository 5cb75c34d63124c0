//! Muster server binary

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use muster::{config::Args, logging, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args)?;

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Muster - volunteer organization");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Store: {:?}", args.store_backend);
    info!("Documents: {}", args.storage_dir.display());
    info!("======================================");

    let store = server::connect_store(&args).await?;
    let state = server::AppState::new(args, store)?;
    state.prepare().await?;

    let workers = state.spawn_workers()?;
    info!("Started {} background workers", workers.len());

    server::run(Arc::new(state)).await?;

    for worker in workers {
        worker.abort();
    }
    info!("Muster stopped");
    Ok(())
}
