//! Retrieval Engine
//!
//! Four retrieval modes, each a single request/response:
//! - Id-based (individual or batched `terms` queries)
//! - Hybrid (keyword leg fused with k-NN through RRF)
//! - Admin (title-first boost ladder)
//! - Random (engine-side random scoring)
//!
//! Hits come back in stored form; callers run them through
//! [`crate::codec::cleanup_chunks`] before returning them.

mod hit;
mod id_based;
mod queries;

pub use hit::{hit_to_chunk, process_dynamic_summary};
pub use id_based::{sort_by_request_order, IdRetrieval};
pub use queries::{
    admin_search_body, hybrid_search_body, id_search_body, keyword_leg, random_search_body,
    RankingProfile,
};

use crate::engine::{RetryPolicy, SearchEngine, SearchResponse};
use docindex_common::errors::Result;
use docindex_common::models::UncleanedChunk;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Retrieval mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    IdBased,
    Hybrid,
    Admin,
    Random,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::IdBased => "id_based",
            RetrievalMode::Hybrid => "hybrid",
            RetrievalMode::Admin => "admin",
            RetrievalMode::Random => "random",
        }
    }

    /// Modes whose hits carry no meaningful relevance score
    pub fn null_score(&self) -> bool {
        matches!(self, RetrievalMode::IdBased)
    }
}

/// Matching chunk count when an id-based search came back cut short.
///
/// Id-based retrieval reads one page, so anything past it is lost.
pub fn truncated_total(mode: RetrievalMode, response: &SearchResponse) -> Option<u64> {
    if mode != RetrievalMode::IdBased {
        return None;
    }
    response
        .total
        .filter(|&total| total > response.hits.len() as u64)
}

/// Run one search with read retries and convert the hits
pub async fn search_chunks(
    engine: &dyn SearchEngine,
    index: &str,
    body: &Value,
    mode: RetrievalMode,
    retry: &RetryPolicy,
) -> Result<Vec<UncleanedChunk>> {
    let response = retry
        .run(mode.as_str(), || engine.search(index, body))
        .await?;
    if let Some(total) = truncated_total(mode, &response) {
        warn!(
            index,
            total,
            returned = response.hits.len(),
            "Id-based search matched more chunks than one page holds, results are incomplete"
        );
    }
    if response.hits.is_empty() {
        debug!(index, mode = mode.as_str(), "Search returned no hits");
    }
    Ok(response
        .hits
        .into_iter()
        .filter_map(|hit| hit_to_chunk(hit, mode.null_score()))
        .collect())
}
