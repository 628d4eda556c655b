//! Indexing Pipeline
//!
//! One [`index_chunks`] call:
//! 1. groups chunks by document and resolves each document's stored range
//!    (known counts are free, legacy documents are probed concurrently)
//! 2. deletes stale chunks left over from a shrinking document
//! 3. prepares every chunk, skipping the ones that cannot be stored
//! 4. writes the rest in sequential bulk batches and refreshes once

mod deletion;
mod document;
mod update;

pub use deletion::delete_chunks;
pub use document::{acl_entries, document_set_entries, prepare_chunk_source};
pub use update::{delete_single, resolve_document_chunk_ids, update_body, update_single};

use crate::engine::{BulkAction, RetryPolicy, SearchEngine};
use crate::identity::{uuid_for_chunk, ChunkRange};
use docindex_common::config::IndexTarget;
use docindex_common::errors::{IndexError, Result};
use docindex_common::metrics::record_skipped_chunks;
use docindex_common::models::{
    ChunkFailure, DocumentInsertionRecord, IndexBatchParams, IndexChunk, IndexOutcome,
};
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error, info, instrument};

/// Number of regular chunks present for a document in this batch
fn regular_chunk_count(chunks: Option<&Vec<&IndexChunk>>) -> usize {
    chunks
        .into_iter()
        .flatten()
        .filter(|chunk| !chunk.is_large())
        .map(|chunk| chunk.chunk_id + 1)
        .max()
        .unwrap_or(0)
}

/// Index a batch of chunks into one index.
///
/// Per-chunk problems (unstorable embeddings, rejected bulk items) end up in
/// [`IndexOutcome::failed_chunks`]; transport and protocol failures of a
/// request abort the call. Batches already written stay written.
#[instrument(skip_all, fields(index = %target.name, chunks = chunks.len()))]
pub async fn index_chunks(
    engine: &dyn SearchEngine,
    target: &IndexTarget,
    chunks: &[IndexChunk],
    params: &IndexBatchParams,
    batch_size: usize,
    retry: &RetryPolicy,
) -> Result<IndexOutcome> {
    let mut outcome = IndexOutcome::default();

    let mut by_document: BTreeMap<&str, Vec<&IndexChunk>> = BTreeMap::new();
    for chunk in chunks {
        by_document.entry(chunk.document_id()).or_default().push(chunk);
    }
    let mut document_ids: BTreeSet<&str> = by_document.keys().copied().collect();
    document_ids.extend(params.doc_id_to_new_chunk_cnt.keys().map(String::as_str));

    let ranges = try_join_all(document_ids.iter().map(|&document_id| {
        let new_count = params
            .doc_id_to_new_chunk_cnt
            .get(document_id)
            .copied()
            .unwrap_or_else(|| regular_chunk_count(by_document.get(document_id)));
        let previous_count = params
            .doc_id_to_previous_chunk_cnt
            .get(document_id)
            .copied()
            .flatten();
        async move {
            let range = ChunkRange::for_reindex(previous_count, new_count)
                .resolve(engine, &target.name, document_id, retry)
                .await?;
            Ok::<_, IndexError>((document_id, range))
        }
    }))
    .await?;

    let mut stale_ids = Vec::new();
    for (document_id, range) in &ranges {
        let ids = range.chunk_ids(document_id, params.large_chunks_enabled);
        if !ids.is_empty() || by_document.contains_key(document_id) {
            outcome.records.insert(DocumentInsertionRecord {
                document_id: document_id.to_string(),
                already_existed: range.already_existed(),
            });
        }
        stale_ids.extend(ids);
    }
    outcome.stale_chunks_deleted = delete_chunks(engine, &target.name, &stale_ids, false).await?;
    let mut wrote = !stale_ids.is_empty();

    let tenant_id = params.tenant_id.as_deref();
    let mut chunk_documents: HashMap<String, &str> = HashMap::with_capacity(chunks.len());
    let mut prepared = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match prepare_chunk_source(chunk, tenant_id, target.dimension) {
            Ok((id, source)) => {
                chunk_documents.insert(id.clone(), chunk.document_id());
                prepared.push(BulkAction::Index {
                    index: target.name.clone(),
                    id,
                    source,
                });
            }
            Err(err) => {
                let chunk_id = uuid_for_chunk(chunk).to_string();
                error!(
                    document_id = chunk.document_id(),
                    chunk_id = %chunk_id,
                    error = %err,
                    "Failed to prepare chunk, skipping"
                );
                outcome.failed_chunks.insert(
                    chunk_id,
                    ChunkFailure {
                        document_id: chunk.document_id().to_string(),
                        reason: err.to_string(),
                    },
                );
            }
        }
    }
    record_skipped_chunks(outcome.failed_chunks.len());

    let batch_size = batch_size.max(1);
    let mut pending = prepared.into_iter();
    let mut batch_number = 0;
    loop {
        let batch: Vec<BulkAction> = pending.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        batch_number += 1;
        wrote = true;

        let response = engine.bulk(batch, false).await.map_err(|e| {
            error!(batch = batch_number, error = %e, "Bulk indexing request failed");
            e
        })?;
        outcome.chunks_indexed += response.succeeded();

        for item in response.failures() {
            let document_id = chunk_documents
                .get(&item.id)
                .map(|id| id.to_string())
                .unwrap_or_default();
            let reason = item
                .error
                .clone()
                .unwrap_or_else(|| format!("status {}", item.status));
            error!(
                document_id = %document_id,
                chunk_id = %item.id,
                status = item.status,
                reason = %reason,
                "Chunk rejected by engine"
            );
            outcome
                .failed_chunks
                .insert(item.id.clone(), ChunkFailure { document_id, reason });
        }
        debug!(batch = batch_number, indexed = outcome.chunks_indexed, "Bulk batch written");
    }

    if wrote {
        engine.refresh(&target.name).await?;
    }

    info!(
        documents = outcome.records.len(),
        indexed = outcome.chunks_indexed,
        failed = outcome.failed_chunks.len(),
        stale_deleted = outcome.stale_chunks_deleted,
        "Indexed chunk batch"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CONTENT, CONTENT_SUMMARY};
    use crate::engine::InMemoryEngine;
    use crate::identity::chunk_uuid;
    use docindex_common::models::Document;
    use std::sync::Arc;

    const INDEX: &str = "chunks";

    fn target(large: bool) -> IndexTarget {
        IndexTarget {
            name: INDEX.into(),
            dimension: 2,
            large_chunks_enabled: large,
        }
    }

    fn chunks_for(document_id: &str, count: usize, text: &str) -> Vec<IndexChunk> {
        let doc = Arc::new(Document::new(document_id, document_id, "web"));
        (0..count)
            .map(|i| IndexChunk::new(doc.clone(), i, format!("{} {}", text, i), vec![0.6, 0.8]))
            .collect()
    }

    fn known_counts(document_id: &str, previous: Option<usize>, new: usize) -> IndexBatchParams {
        IndexBatchParams {
            doc_id_to_previous_chunk_cnt: HashMap::from([(document_id.to_string(), previous)]),
            doc_id_to_new_chunk_cnt: HashMap::from([(document_id.to_string(), new)]),
            ..Default::default()
        }
    }

    async fn run(
        engine: &InMemoryEngine,
        chunks: &[IndexChunk],
        params: &IndexBatchParams,
        batch_size: usize,
    ) -> IndexOutcome {
        index_chunks(engine, &target(params.large_chunks_enabled), chunks, params, batch_size, &RetryPolicy::immediate(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_legacy_document_is_probed_and_indexed() {
        let engine = InMemoryEngine::new();
        let chunks = chunks_for("doc", 3, "alpha");

        let outcome = run(&engine, &chunks, &IndexBatchParams::default(), 128).await;

        assert_eq!(outcome.chunks_indexed, 3);
        assert_eq!(outcome.stale_chunks_deleted, 0);
        assert_eq!(
            outcome.records.into_iter().collect::<Vec<_>>(),
            vec![DocumentInsertionRecord {
                document_id: "doc".into(),
                already_existed: false
            }]
        );
        assert_eq!(engine.existence_check_count(), 2);
        assert_eq!(engine.document_count(INDEX).await, 3);
    }

    #[tokio::test]
    async fn test_shrinking_document_removes_stale_chunks() {
        let engine = InMemoryEngine::new();
        run(&engine, &chunks_for("doc", 5, "old"), &known_counts("doc", Some(0), 5), 128).await;

        let outcome = run(&engine, &chunks_for("doc", 3, "new"), &known_counts("doc", Some(5), 3), 128).await;

        assert_eq!(outcome.stale_chunks_deleted, 2);
        assert!(outcome.records.iter().all(|r| r.already_existed));
        for i in 0..3 {
            let stored = engine.document(INDEX, &chunk_uuid("doc", i, &[]).to_string()).await.unwrap();
            assert_eq!(stored[CONTENT_SUMMARY], format!("new {}", i));
            assert_eq!(stored[CONTENT], format!("doc\n\r\nnew {}", i));
        }
        for i in 3..5 {
            assert!(engine.document(INDEX, &chunk_uuid("doc", i, &[]).to_string()).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_legacy_shrink_probes_stored_range() {
        let engine = InMemoryEngine::new();
        run(&engine, &chunks_for("doc", 5, "old"), &known_counts("doc", Some(0), 5), 128).await;

        let outcome = run(&engine, &chunks_for("doc", 2, "new"), &IndexBatchParams::default(), 128).await;

        assert_eq!(outcome.stale_chunks_deleted, 3);
        assert!(outcome.records.iter().all(|r| r.already_existed));
        assert_eq!(engine.document_count(INDEX).await, 2);
    }

    #[tokio::test]
    async fn test_unstorable_chunk_is_skipped() {
        let engine = InMemoryEngine::new();
        let mut chunks = chunks_for("doc", 3, "text");
        chunks[1].embedding = vec![1.0, 2.0, 3.0];
        let bad_id = uuid_for_chunk(&chunks[1]).to_string();

        let outcome = run(&engine, &chunks, &known_counts("doc", Some(0), 3), 128).await;

        assert_eq!(outcome.chunks_indexed, 2);
        assert!(outcome.has_failures());
        assert_eq!(outcome.failed_chunks[&bad_id].document_id, "doc");
        assert_eq!(engine.document_count(INDEX).await, 2);
    }

    #[tokio::test]
    async fn test_batches_are_sequential_bulk_requests() {
        let engine = InMemoryEngine::new();
        let mut chunks = chunks_for("a", 3, "a");
        chunks.extend(chunks_for("b", 2, "b"));
        let params = IndexBatchParams {
            doc_id_to_previous_chunk_cnt: HashMap::from([("a".into(), Some(0)), ("b".into(), Some(0))]),
            ..Default::default()
        };

        let outcome = run(&engine, &chunks, &params, 2).await;

        assert_eq!(outcome.chunks_indexed, 5);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(engine.bulk_request_count(), 3);
    }

    #[tokio::test]
    async fn test_document_emptied_without_chunks() {
        let engine = InMemoryEngine::new();
        run(&engine, &chunks_for("doc", 2, "old"), &known_counts("doc", Some(0), 2), 128).await;

        let outcome = run(&engine, &[], &known_counts("doc", Some(2), 0), 128).await;

        assert_eq!(outcome.stale_chunks_deleted, 2);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(engine.document_count(INDEX).await, 0);
    }

    #[tokio::test]
    async fn test_large_chunk_windows_deleted_on_shrink() {
        let engine = InMemoryEngine::new();
        let mut params = known_counts("doc", Some(0), 6);
        params.large_chunks_enabled = true;
        let mut chunks = chunks_for("doc", 6, "old");
        let mut large = IndexChunk::new(chunks[0].source_document.clone(), 1, "old 4 old 5", vec![0.6, 0.8]);
        large.large_chunk_reference_ids = vec![4, 5];
        chunks.push(large);
        run(&engine, &chunks, &params, 128).await;

        let mut params = known_counts("doc", Some(6), 4);
        params.large_chunks_enabled = true;
        run(&engine, &chunks_for("doc", 4, "new"), &params, 128).await;

        assert!(engine
            .document(INDEX, &chunk_uuid("doc", 1, &[4, 5]).to_string())
            .await
            .is_none());
        assert_eq!(engine.document_count(INDEX).await, 4);
    }

    #[tokio::test]
    async fn test_bulk_failure_aborts_and_keeps_earlier_batches() {
        let engine = InMemoryEngine::new();
        engine.fail_bulk_after(1).await;
        let chunks = chunks_for("doc", 5, "alpha");
        let params = known_counts("doc", Some(0), 5);

        let err = index_chunks(&engine, &target(false), &chunks, &params, 2, &RetryPolicy::immediate(1))
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::Engine { status: 503, .. }));
        assert_eq!(engine.bulk_request_count(), 2);
        assert_eq!(engine.document_count(INDEX).await, 2);
        for i in 0..2 {
            let id = chunk_uuid("doc", i, &[]).to_string();
            assert!(engine.document(INDEX, &id).await.is_some());
        }
    }
}
