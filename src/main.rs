mod api;
mod config;
mod engine;
mod models;
mod storage;
mod types;

use std::io::stderr;
use std::net::SocketAddr;
use std::process::exit;
use std::sync::Arc;

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use crate::config::{Settings, USAGE};
use crate::engine::PointsService;
use crate::storage::MemoryLedger;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let settings = match Settings::load(&args, |key| std::env::var(key).ok()) {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("{error}");
            eprintln!("{USAGE}");
            exit(1);
        }
    };

    setup_logging(settings.log_level);

    let ledger = Arc::new(MemoryLedger::open(&settings.journal_path)?);
    let service = Arc::new(PointsService::new(ledger, settings.lock_timeout));
    let address = SocketAddr::from(([0, 0, 0, 0], settings.port));

    info!("Listening on port {}", settings.port);

    axum::Server::try_bind(&address)?
        .serve(api::router(service).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");

    Ok(())
}

fn setup_logging(level: LevelFilter) {
    let terminal_log = fmt::layer()
        .with_target(false)
        .with_writer(stderr)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(terminal_log)
        .init();
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }

    info!("Shutdown signal received");
}
