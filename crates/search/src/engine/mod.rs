//! Search engine client seam
//!
//! The index adapter never talks HTTP directly. Everything goes through the
//! [`SearchEngine`] trait so that:
//! - the production client ([`ElasticsearchClient`]) is injected at construction
//! - tests run against the deterministic [`InMemoryEngine`]
//! - read paths share one retry policy ([`RetryPolicy`])

mod http;
mod memory;

pub use http::ElasticsearchClient;
pub use memory::InMemoryEngine;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use docindex_common::config::RetrievalConfig;
use docindex_common::errors::{IndexError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Bulk requests
// ============================================================================

/// Operation type of a bulk action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOp {
    Index,
    Update,
    Delete,
}

impl BulkOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOp::Index => "index",
            BulkOp::Update => "update",
            BulkOp::Delete => "delete",
        }
    }
}

/// One action of a bulk request, addressed by chunk id
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Create or replace the whole document
    Index { index: String, id: String, source: Value },
    /// Merge `doc` into the stored document
    Update { index: String, id: String, doc: Value },
    Delete { index: String, id: String },
}

impl BulkAction {
    pub fn op(&self) -> BulkOp {
        match self {
            BulkAction::Index { .. } => BulkOp::Index,
            BulkAction::Update { .. } => BulkOp::Update,
            BulkAction::Delete { .. } => BulkOp::Delete,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkAction::Index { id, .. }
            | BulkAction::Update { id, .. }
            | BulkAction::Delete { id, .. } => id,
        }
    }

    pub fn index(&self) -> &str {
        match self {
            BulkAction::Index { index, .. }
            | BulkAction::Update { index, .. }
            | BulkAction::Delete { index, .. } => index,
        }
    }

    /// Append the NDJSON lines of this action to a bulk body
    pub fn write_ndjson(&self, body: &mut String) -> Result<()> {
        let header = json!({ self.op().as_str(): { "_index": self.index(), "_id": self.id() } });
        body.push_str(&serde_json::to_string(&header)?);
        body.push('\n');

        match self {
            BulkAction::Index { source, .. } => {
                body.push_str(&serde_json::to_string(source)?);
                body.push('\n');
            }
            BulkAction::Update { doc, .. } => {
                body.push_str(&serde_json::to_string(&json!({ "doc": doc }))?);
                body.push('\n');
            }
            BulkAction::Delete { .. } => {}
        }
        Ok(())
    }
}

/// Per-action result of a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub op: BulkOp,
    pub id: String,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItem {
    /// Whether this action failed.
    ///
    /// Deleting a document that is already gone is not a failure.
    pub fn is_failure(&self) -> bool {
        if self.op == BulkOp::Delete && self.status == 404 {
            return false;
        }
        self.error.is_some() || self.status >= 300
    }
}

/// Result of a bulk request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    pub fn failures(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| item.is_failure())
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| !item.is_failure()).count()
    }

    /// Parse the engine's `_bulk` response body
    pub fn from_json(body: &Value) -> Self {
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_bulk_item).collect())
            .unwrap_or_default();
        Self { items }
    }
}

fn parse_bulk_item(item: &Value) -> Option<BulkItem> {
    let object = item.as_object()?;
    let (op_name, result) = object.iter().next()?;
    let op = match op_name.as_str() {
        "index" | "create" => BulkOp::Index,
        "update" => BulkOp::Update,
        "delete" => BulkOp::Delete,
        _ => return None,
    };
    let error = result.get("error").map(|error| {
        error
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string())
    });
    Some(BulkItem {
        op,
        id: result.get("_id").and_then(Value::as_str).unwrap_or_default().to_string(),
        status: result.get("status").and_then(Value::as_u64).unwrap_or(0) as u16,
        error,
    })
}

// ============================================================================
// Search responses
// ============================================================================

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// Hits of a search response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total: Option<u64>,
}

impl SearchResponse {
    /// Parse the engine's `_search` response body
    pub fn from_json(body: &Value) -> Result<Self> {
        let hits_value = body.get("hits").cloned().unwrap_or(Value::Null);
        let hits: Vec<SearchHit> = match hits_value.get("hits") {
            Some(hits) => serde_json::from_value(hits.clone())?,
            None => Vec::new(),
        };
        let total = hits_value
            .get("total")
            .and_then(|total| total.get("value").or(Some(total)))
            .and_then(Value::as_u64);
        Ok(Self { hits, total })
    }
}

/// Cluster or index health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub status: String,
}

impl ClusterHealth {
    /// Green and yellow clusters serve reads and writes
    pub fn is_ready(&self) -> bool {
        matches!(self.status.as_str(), "green" | "yellow")
    }
}

// ============================================================================
// Engine trait
// ============================================================================

/// Operations the index adapter needs from a search engine
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Whether an index exists
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create an index from a `{settings, mappings}` body
    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;

    /// Field mapping (`properties`) of an existing index
    async fn get_mapping(&self, index: &str) -> Result<Value>;

    /// Apply settings to an existing index
    async fn put_settings(&self, index: &str, settings: &Value) -> Result<()>;

    /// Whether a document with this id exists
    async fn document_exists(&self, index: &str, id: &str) -> Result<bool>;

    /// Submit a bulk request; `refresh` makes the writes searchable on return
    async fn bulk(&self, actions: Vec<BulkAction>, refresh: bool) -> Result<BulkResponse>;

    /// Run a search request body against an index
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse>;

    /// Make all prior writes searchable
    async fn refresh(&self, index: &str) -> Result<()>;

    /// Health of the cluster, or of one index when given
    async fn cluster_health(&self, index: Option<&str>) -> Result<ClusterHealth>;
}

// ============================================================================
// Read retries
// ============================================================================

/// Bounded exponential backoff for read requests
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            max_attempts: config.read_retry_attempts.max(1),
            initial_interval: Duration::from_millis(config.retry_initial_interval_ms),
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: Duration::ZERO,
        }
    }

    /// Run a read operation, retrying transient errors
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.max_attempts;
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();

        retry(backoff, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_transient() && attempt < max_attempts => {
                        warn!(operation, attempt, error = %err, "Transient engine error, retrying");
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        })
        .await
    }
}

/// Convert a non-success engine response into an error
pub(crate) fn engine_error(status: u16, body: &str) -> IndexError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/reason")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(500).collect());
    IndexError::engine(status, message)
}
