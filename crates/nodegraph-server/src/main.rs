//! Node graph server
//!
//! Serves a service dependency graph, built from Linkerd proxy metrics in
//! Prometheus, to a node graph panel.

use anyhow::{Context, Result};
use clap::Parser;
use nodegraph_core::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    source::{PrometheusSource, SnapshotBuilder},
    GraphService,
};
use nodegraph_server::{api, config::ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(
    name = "nodegraph-server",
    version,
    about = "Service dependency graphs for the node graph panel"
)]
struct Args {
    /// YAML config file; skipped when absent
    #[arg(long, default_value = "./config.yaml")]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::load(&args.config_file)?;

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .context("invalid log level")?,
        )
        .with(fmt::layer().json())
        .init();

    info!(config_file = %args.config_file.display(), "Starting nodegraph-server");

    let prometheus = PrometheusSource::new(&config.prometheus_config())
        .context("failed to create Prometheus client")?;
    let backend = prometheus.base_url().to_string();

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_BACKEND).await;
    health_registry.register(components::GRAPH_ASSEMBLER).await;

    let builder = SnapshotBuilder::new(Arc::new(prometheus), config.query_set());
    let service = GraphService::new(builder, health_registry.clone());

    let logger = StructuredLogger::new("nodegraph");
    logger.log_startup(SERVER_VERSION, &config.server.addr, &backend);

    let app_state = Arc::new(api::AppState::new(
        service,
        config.request_timeout(),
        config.step(),
    ));

    health_registry.set_ready(true).await;

    let shutdown = {
        let logger = logger.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            logger.log_shutdown("SIGINT received");
        }
    };

    api::serve(&config.server.addr, app_state, shutdown).await?;
    info!("Shut down");

    Ok(())
}
