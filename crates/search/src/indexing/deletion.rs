//! Bulk chunk deletion

use crate::engine::{BulkAction, SearchEngine};
use docindex_common::errors::Result;
use tracing::{debug, error};
use uuid::Uuid;

/// Delete chunks by id in a single bulk request.
///
/// Per-item failures are logged and not retried; ids that are already gone
/// count as neither deleted nor failed. A transport or protocol failure of
/// the request itself propagates. Returns the number of chunks deleted.
pub async fn delete_chunks(
    engine: &dyn SearchEngine,
    index: &str,
    chunk_ids: &[Uuid],
    refresh: bool,
) -> Result<usize> {
    if chunk_ids.is_empty() {
        debug!(index, "No chunks to delete");
        return Ok(0);
    }

    let actions = chunk_ids
        .iter()
        .map(|id| BulkAction::Delete {
            index: index.to_string(),
            id: id.to_string(),
        })
        .collect();

    let response = engine.bulk(actions, refresh).await.map_err(|e| {
        error!(index, error = %e, "Bulk deletion failed");
        e
    })?;

    let failures: Vec<_> = response.failures().collect();
    if !failures.is_empty() {
        error!(
            index,
            failed = failures.len(),
            first_error = failures[0].error.as_deref().unwrap_or("unknown"),
            "Failed to delete chunks"
        );
    }

    let deleted = response
        .items
        .iter()
        .filter(|item| item.status < 300 && item.error.is_none())
        .count();
    debug!(index, requested = chunk_ids.len(), deleted, "Deleted chunks");
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use serde_json::json;

    #[tokio::test]
    async fn test_delete_counts_existing_only() {
        let engine = InMemoryEngine::new();
        let present = Uuid::new_v4();
        let absent = Uuid::new_v4();
        engine
            .bulk(
                vec![BulkAction::Index {
                    index: "chunks".into(),
                    id: present.to_string(),
                    source: json!({}),
                }],
                true,
            )
            .await
            .unwrap();

        let deleted = delete_chunks(&engine, "chunks", &[present, absent], true).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(engine.document_count("chunks").await, 0);
    }

    #[tokio::test]
    async fn test_empty_delete_skips_engine() {
        let engine = InMemoryEngine::new();
        assert_eq!(delete_chunks(&engine, "chunks", &[], true).await.unwrap(), 0);
        assert_eq!(engine.bulk_request_count(), 0);
    }
}
