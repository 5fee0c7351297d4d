use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod aws;
mod classifier;
mod config;
mod error;
mod event;
mod images;
mod ocr;
mod paths;
mod service;
mod status;
mod storage;
#[cfg(test)]
mod testing;
mod trigger;
mod upload;
mod workflow;

use crate::config::load_config;
use crate::service::PipelineService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!("Starting docflow service v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        engine = ?config.workflow.engine,
        "Configuration loaded"
    );

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install metrics recorder");
            None
        }
    };

    // Scratch space is shared by every extraction on this host
    std::fs::create_dir_all(&config.extraction.scratch_dir)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let service = Arc::new(PipelineService::new(config)?);
    let app = api::router(service.clone(), metrics);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await?;

    Ok(())
}

async fn shutdown_signal(service: Arc<PipelineService>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    service.shutdown();
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docflow_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
