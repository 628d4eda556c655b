//! Single-document field updates and deletion across indices

use super::deletion::delete_chunks;
use super::document::{acl_entries, document_set_entries};
use crate::constants::{ACCESS_CONTROL_LIST, BOOST, DOCUMENT_SETS, HIDDEN};
use crate::engine::{BulkAction, BulkOp, RetryPolicy, SearchEngine};
use crate::identity::ChunkRange;
use docindex_common::config::IndexTarget;
use docindex_common::errors::Result;
use docindex_common::models::DocumentFieldUpdate;
use futures::future::try_join_all;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Partial document body for a field update
pub fn update_body(fields: &DocumentFieldUpdate) -> Value {
    let mut doc = Map::new();
    if let Some(access) = &fields.access {
        doc.insert(ACCESS_CONTROL_LIST.into(), acl_entries(access));
    }
    if let Some(document_sets) = &fields.document_sets {
        doc.insert(DOCUMENT_SETS.into(), document_set_entries(document_sets));
    }
    if let Some(boost) = fields.boost {
        doc.insert(BOOST.into(), json!(boost));
    }
    if let Some(hidden) = fields.hidden {
        doc.insert(HIDDEN.into(), json!(hidden));
    }
    Value::Object(doc)
}

/// Current chunk ids of a document in every target index.
///
/// Ranges are resolved concurrently per index; each index applies its own
/// large-chunk setting.
pub async fn resolve_document_chunk_ids<'a>(
    engine: &dyn SearchEngine,
    targets: &[&'a IndexTarget],
    document_id: &str,
    chunk_count: Option<usize>,
    retry: &RetryPolicy,
) -> Result<Vec<(&'a IndexTarget, Vec<Uuid>)>> {
    try_join_all(targets.iter().map(|target| async move {
        let range = ChunkRange::whole_document(chunk_count)
            .resolve(engine, &target.name, document_id, retry)
            .await?;
        Ok::<_, docindex_common::IndexError>((
            *target,
            range.chunk_ids(document_id, target.large_chunks_enabled),
        ))
    }))
    .await
}

/// Apply a field update to every chunk of one document.
///
/// Returns the number of chunks updated. An update with no fields is a
/// no-op.
pub async fn update_single(
    engine: &dyn SearchEngine,
    targets: &[&IndexTarget],
    document_id: &str,
    chunk_count: Option<usize>,
    fields: &DocumentFieldUpdate,
    retry: &RetryPolicy,
) -> Result<usize> {
    if fields.is_empty() {
        info!(document_id, "Update request has no fields to change, skipping");
        return Ok(0);
    }

    let doc = update_body(fields);
    let resolved = resolve_document_chunk_ids(engine, targets, document_id, chunk_count, retry).await?;
    let actions: Vec<BulkAction> = resolved
        .into_iter()
        .flat_map(|(target, ids)| {
            let doc = doc.clone();
            ids.into_iter().map(move |id| BulkAction::Update {
                index: target.name.clone(),
                id: id.to_string(),
                doc: doc.clone(),
            })
        })
        .collect();

    if actions.is_empty() {
        debug!(document_id, "Document has no stored chunks to update");
        return Ok(0);
    }

    let response = engine.bulk(actions, true).await?;
    let mut updated = 0;
    for item in &response.items {
        match (item.op, item.status) {
            (BulkOp::Update, status) if status < 300 => updated += 1,
            // Large-chunk windows are only stored for some documents
            (_, 404) => debug!(document_id, chunk_id = %item.id, "Chunk missing during update"),
            _ => error!(
                document_id,
                chunk_id = %item.id,
                status = item.status,
                error = item.error.as_deref().unwrap_or("unknown"),
                "Failed to update chunk"
            ),
        }
    }

    info!(document_id, updated, "Updated document chunks");
    Ok(updated)
}

/// Delete every chunk of one document. Returns the number deleted.
pub async fn delete_single(
    engine: &dyn SearchEngine,
    targets: &[&IndexTarget],
    document_id: &str,
    chunk_count: Option<usize>,
    retry: &RetryPolicy,
) -> Result<usize> {
    let resolved = resolve_document_chunk_ids(engine, targets, document_id, chunk_count, retry).await?;

    let mut deleted = 0;
    for (target, ids) in resolved {
        deleted += delete_chunks(engine, &target.name, &ids, true).await?;
    }

    info!(document_id, deleted, "Deleted document chunks");
    Ok(deleted)
}
