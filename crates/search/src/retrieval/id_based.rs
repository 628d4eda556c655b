//! Id-based chunk retrieval
//!
//! Individual mode sends one query per requested document. Batch mode packs
//! up to [`MAX_TERMS`] document ids into a `terms` query and routes hits back
//! to their request client-side; a sub-batch that errors is retried in
//! individual mode instead of failing the call.

use super::hit::hit_to_chunk;
use super::queries::id_search_body;
use crate::constants::MAX_TERMS;
use crate::engine::{RetryPolicy, SearchEngine, SearchHit};
use docindex_common::errors::Result;
use docindex_common::models::{ChunkRequest, UncleanedChunk};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, warn};

/// Shared inputs of one id-based retrieval
pub struct IdRetrieval<'a> {
    pub engine: &'a dyn SearchEngine,
    pub index: &'a str,
    pub filters: &'a [Value],
    pub include_large_chunks: bool,
    pub retry: &'a RetryPolicy,
}

impl IdRetrieval<'_> {
    async fn search(&self, document_ids: &[&str]) -> Result<Vec<SearchHit>> {
        let body = id_search_body(document_ids, self.filters, self.include_large_chunks);
        let response = self
            .retry
            .run("id_search", || self.engine.search(self.index, &body))
            .await?;
        Ok(response.hits)
    }

    /// One query per request. Failed requests are logged and skipped.
    pub async fn individual(&self, requests: &[ChunkRequest]) -> Vec<UncleanedChunk> {
        let mut results = Vec::new();
        for request in requests {
            match self.search(&[request.document_id.as_str()]).await {
                Ok(hits) => results.extend(
                    hits.into_iter()
                        .filter_map(|hit| hit_to_chunk(hit, true))
                        .filter(|chunk| request.contains(chunk.chunk_id)),
                ),
                Err(e) => error!(
                    document_id = %request.document_id,
                    error = %e,
                    "Failed to retrieve document chunks"
                ),
            }
        }
        results
    }

    /// Sub-batched `terms` queries, falling back to individual mode per
    /// failing sub-batch
    pub async fn batch(&self, requests: &[ChunkRequest]) -> Vec<UncleanedChunk> {
        let mut results = Vec::new();
        for batch in requests.chunks(MAX_TERMS) {
            let mut by_document: HashMap<&str, Vec<&ChunkRequest>> = HashMap::new();
            for request in batch {
                by_document.entry(request.document_id.as_str()).or_default().push(request);
            }
            let document_ids: Vec<&str> = by_document.keys().copied().collect();

            match self.search(&document_ids).await {
                Ok(hits) => {
                    for chunk in hits.into_iter().filter_map(|hit| hit_to_chunk(hit, true)) {
                        let wanted = by_document
                            .get(chunk.document_id.as_str())
                            .is_some_and(|requests| requests.iter().any(|r| r.contains(chunk.chunk_id)));
                        if wanted {
                            results.push(chunk);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        documents = document_ids.len(),
                        error = %e,
                        "Batch id retrieval failed, falling back to individual queries"
                    );
                    results.extend(self.individual(batch).await);
                }
            }
        }
        results
    }
}

/// Order chunks as the documents were requested, then by chunk index
pub fn sort_by_request_order(chunks: &mut [UncleanedChunk], requests: &[ChunkRequest]) {
    let mut order: HashMap<&str, usize> = HashMap::new();
    for (position, request) in requests.iter().enumerate() {
        order.entry(request.document_id.as_str()).or_insert(position);
    }
    chunks.sort_by_key(|chunk| {
        (
            order.get(chunk.document_id.as_str()).copied().unwrap_or(usize::MAX),
            chunk.chunk_id,
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::engine::{BulkAction, InMemoryEngine};
    use crate::identity::chunk_uuid;
    use serde_json::json;

    const INDEX: &str = "chunks";

    async fn seeded_engine() -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        let mut actions = Vec::new();
        for (document_id, count) in [("a", 3usize), ("b", 2)] {
            for i in 0..count {
                actions.push(BulkAction::Index {
                    index: INDEX.into(),
                    id: chunk_uuid(document_id, i, &[]).to_string(),
                    source: json!({
                        DOCUMENT_ID: document_id,
                        CHUNK_ID: i,
                        CONTENT: format!("{} chunk {}", document_id, i),
                        SEMANTIC_IDENTIFIER: document_id,
                        LARGE_CHUNK_REFERENCE_IDS: [],
                        HIDDEN: document_id == "b",
                    }),
                });
            }
        }
        actions.push(BulkAction::Index {
            index: INDEX.into(),
            id: chunk_uuid("a", 0, &[0, 1, 2]).to_string(),
            source: json!({
                DOCUMENT_ID: "a",
                CHUNK_ID: 0,
                CONTENT: "a large",
                SEMANTIC_IDENTIFIER: "a",
                LARGE_CHUNK_REFERENCE_IDS: [0, 1, 2],
            }),
        });
        engine.bulk(actions, true).await.unwrap();
        engine
    }

    fn retrieval<'a>(engine: &'a InMemoryEngine, retry: &'a RetryPolicy, large: bool) -> IdRetrieval<'a> {
        IdRetrieval {
            engine,
            index: INDEX,
            filters: &[],
            include_large_chunks: large,
            retry,
        }
    }

    #[tokio::test]
    async fn test_batch_respects_chunk_ranges() {
        let engine = seeded_engine().await;
        let retry = RetryPolicy::immediate(1);
        let requests = vec![
            ChunkRequest {
                document_id: "a".into(),
                min_chunk_ind: Some(1),
                max_chunk_ind: None,
            },
            ChunkRequest::whole("b"),
        ];

        let mut chunks = retrieval(&engine, &retry, false).batch(&requests).await;
        sort_by_request_order(&mut chunks, &requests);

        let ids: Vec<(String, usize)> = chunks.iter().map(|c| (c.document_id.clone(), c.chunk_id)).collect();
        assert_eq!(
            ids,
            vec![("a".into(), 1), ("a".into(), 2), ("b".into(), 0), ("b".into(), 1)]
        );
        assert!(chunks.iter().all(|c| c.score.is_none()));
        assert_eq!(engine.search_count(), 1);
    }

    #[tokio::test]
    async fn test_large_chunks_only_when_requested() {
        let engine = seeded_engine().await;
        let retry = RetryPolicy::immediate(1);
        let requests = vec![ChunkRequest::whole("a")];

        let regular = retrieval(&engine, &retry, false).individual(&requests).await;
        assert_eq!(regular.len(), 3);

        let all = retrieval(&engine, &retry, true).individual(&requests).await;
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_failing_batch_falls_back_to_individual() {
        let engine = seeded_engine().await;
        engine.reject_searches_containing("terms").await;
        let retry = RetryPolicy::immediate(1);
        let requests = vec![ChunkRequest::whole("a"), ChunkRequest::whole("b")];

        let chunks = retrieval(&engine, &retry, false).batch(&requests).await;

        assert_eq!(chunks.len(), 5);
        assert_eq!(engine.search_count(), 3);
    }

    #[tokio::test]
    async fn test_individual_skips_failed_documents() {
        let engine = seeded_engine().await;
        let retry = RetryPolicy::immediate(1);
        let requests = vec![ChunkRequest::whole("a")];
        let broken = IdRetrieval {
            index: "missing",
            ..retrieval(&engine, &retry, false)
        };
        assert!(broken.individual(&requests).await.is_empty());
    }
}
