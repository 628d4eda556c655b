//! Engine readiness probe

use crate::engine::SearchEngine;
use docindex_common::errors::{IndexError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Poll cluster health until the engine (and the index, when given) is green
/// or yellow, giving up after `limit`.
pub async fn wait_for_engine(
    engine: &dyn SearchEngine,
    interval: Duration,
    limit: Duration,
    index: Option<&str>,
) -> Result<()> {
    let started = Instant::now();
    loop {
        let status = match engine.cluster_health(index).await {
            Ok(health) if health.is_ready() => {
                info!(index = ?index, status = %health.status, "Search engine is ready");
                return Ok(());
            }
            Ok(health) => health.status,
            Err(e) => e.to_string(),
        };

        let elapsed = started.elapsed();
        if elapsed >= limit {
            return Err(IndexError::EngineUnavailable {
                message: format!("not ready after {}s: {}", elapsed.as_secs(), status),
            });
        }
        warn!(index = ?index, status = %status, elapsed_secs = elapsed.as_secs(), "Search engine not ready yet");
        tokio::time::sleep(interval.min(limit - elapsed)).await;
    }
}
