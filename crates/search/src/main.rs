//! docindex index bootstrap
//!
//! Prepares the search engine for the adapter:
//! - waits for the cluster to become ready
//! - creates missing indices with the configured mapping
//! - reports schema drift on existing indices

use anyhow::Context;
use docindex_common::{config::AppConfig, metrics::register_metrics, VERSION};
use docindex_search::{create_document_index, wait_for_engine, ElasticsearchClient, SearchEngine};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        service = %config.observability.service_name,
        "Starting docindex bootstrap v{}", VERSION
    );
    register_metrics();

    // Cluster startup can outlast the request timeout
    let probe = ElasticsearchClient::without_timeout(&config.elasticsearch)?;
    info!(url = %config.elasticsearch.url, "Waiting for search engine...");
    wait_for_engine(
        &probe,
        Duration::from_secs(config.elasticsearch.readiness_wait_interval_secs),
        Duration::from_secs(config.elasticsearch.readiness_wait_limit_secs),
        None,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Search engine did not become ready");
        e
    })?;

    let engine: Arc<dyn SearchEngine> = Arc::new(ElasticsearchClient::new(&config.elasticsearch)?);
    let index = create_document_index(&config, engine)?;
    index.ensure_indices_exist().await?;

    for target in config.index_targets() {
        wait_for_engine(
            &probe,
            Duration::from_secs(config.elasticsearch.readiness_wait_interval_secs),
            Duration::from_secs(config.elasticsearch.readiness_wait_limit_secs),
            Some(&target.name),
        )
        .await?;
    }

    info!("Index bootstrap complete");
    Ok(())
}
