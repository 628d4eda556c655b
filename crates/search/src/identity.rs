//! Chunk Identity Resolver
//!
//! - [`chunk_uuid`]: deterministic chunk ids (UUIDv5 over document, index and
//!   large-chunk references)
//! - [`ChunkRange`]: which chunk indices a document currently has stored,
//!   either known from the caller's bookkeeping or discovered by probing
//! - [`KnownRange::chunk_ids`]: the ids to delete or update for a range

use crate::constants::LARGE_CHUNK_RATIO;
use crate::engine::{RetryPolicy, SearchEngine};
use docindex_common::errors::Result;
use docindex_common::metrics::record_probe_checks;
use docindex_common::models::IndexChunk;
use tracing::debug;
use uuid::Uuid;

/// Deterministic id of a chunk.
///
/// A single trailing `/` on the document id is ignored so URL-derived ids
/// with and without it address the same chunks.
pub fn chunk_uuid(document_id: &str, chunk_index: usize, large_chunk_reference_ids: &[usize]) -> Uuid {
    let document_id = document_id.strip_suffix('/').unwrap_or(document_id);
    let mut name = format!("{}_{}_0", document_id, chunk_index);
    if !large_chunk_reference_ids.is_empty() {
        let refs: Vec<String> = large_chunk_reference_ids.iter().map(usize::to_string).collect();
        name.push_str("_large");
        name.push_str(&refs.join("_"));
    }
    Uuid::new_v5(&Uuid::NAMESPACE_X500, name.as_bytes())
}

/// Deterministic id of an index chunk
pub fn uuid_for_chunk(chunk: &IndexChunk) -> Uuid {
    chunk_uuid(chunk.document_id(), chunk.chunk_id, &chunk.large_chunk_reference_ids)
}

/// Stored chunk indices of a document.
///
/// `start` is the first index that may be stale (the new chunk count when
/// re-indexing, 0 when addressing the whole document). `end` is the last
/// stored index, inclusive; `None` means nothing is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl KnownRange {
    /// Whether the document had stored chunks
    pub fn already_existed(&self) -> bool {
        self.end.is_some()
    }

    /// Ids of stored chunks at or past `start`.
    ///
    /// With large chunks enabled, every stored window of
    /// [`LARGE_CHUNK_RATIO`] chunks whose membership changes under the new
    /// count is included too.
    pub fn chunk_ids(&self, document_id: &str, large_chunks_enabled: bool) -> Vec<Uuid> {
        let Some(end) = self.end else {
            return Vec::new();
        };

        let mut ids: Vec<Uuid> = (self.start..=end)
            .map(|index| chunk_uuid(document_id, index, &[]))
            .collect();

        if large_chunks_enabled {
            let old_total = end + 1;
            let new_total = self.start;
            for window_start in (0..old_total).step_by(LARGE_CHUNK_RATIO) {
                let old_window: Vec<usize> =
                    (window_start..(window_start + LARGE_CHUNK_RATIO).min(old_total)).collect();
                let new_window_end = (window_start + LARGE_CHUNK_RATIO).min(new_total);
                if window_start < new_total && new_window_end == window_start + old_window.len() {
                    continue;
                }
                ids.push(chunk_uuid(
                    document_id,
                    window_start / LARGE_CHUNK_RATIO,
                    &old_window,
                ));
            }
        }

        ids
    }
}

/// Chunk range before or after resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRange {
    /// Chunk count known from the caller's bookkeeping
    Known(KnownRange),
    /// Legacy document; the stored end must be discovered by probing
    Unprobed { start: usize },
}

impl ChunkRange {
    /// Range for re-indexing a document to `new_count` chunks
    pub fn for_reindex(previous_count: Option<usize>, new_count: usize) -> Self {
        match previous_count {
            Some(previous) => ChunkRange::Known(KnownRange {
                start: new_count,
                end: previous.checked_sub(1),
            }),
            None => ChunkRange::Unprobed { start: new_count },
        }
    }

    /// Range covering every stored chunk of a document
    pub fn whole_document(chunk_count: Option<usize>) -> Self {
        Self::for_reindex(chunk_count, 0)
    }

    /// Resolve to a known range, probing the engine when needed
    pub async fn resolve(
        self,
        engine: &dyn SearchEngine,
        index: &str,
        document_id: &str,
        retry: &RetryPolicy,
    ) -> Result<KnownRange> {
        match self {
            ChunkRange::Known(range) => Ok(range),
            ChunkRange::Unprobed { start } => {
                probe_chunk_range(engine, index, document_id, start, retry).await
            }
        }
    }
}

/// Discover the last stored chunk index of a legacy document.
///
/// Walks upward from `start` until the first missing id. When `start`
/// itself is missing the document has fewer chunks than `start`; chunks are
/// stored contiguously from 0, so the walk goes downward to the last
/// existing id instead. Each step depends on the previous existence check.
pub async fn probe_chunk_range(
    engine: &dyn SearchEngine,
    index: &str,
    document_id: &str,
    start: usize,
    retry: &RetryPolicy,
) -> Result<KnownRange> {
    let mut checks = 0usize;
    let mut exists = |chunk_index: usize| {
        checks += 1;
        let id = chunk_uuid(document_id, chunk_index, &[]).to_string();
        async move {
            retry
                .run("document_exists", || engine.document_exists(index, &id))
                .await
        }
    };

    let end = if exists(start).await? {
        let mut next = start + 1;
        while exists(next).await? {
            next += 1;
        }
        Some(next - 1)
    } else if start == 0 || !exists(0).await? {
        None
    } else {
        let mut candidate = start - 1;
        while candidate > 0 && !exists(candidate).await? {
            candidate -= 1;
        }
        Some(candidate)
    };

    record_probe_checks(checks);
    debug!(document_id, start, end = ?end, checks, "Probed legacy chunk range");
    Ok(KnownRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BulkAction, InMemoryEngine};
    use serde_json::json;
    use std::collections::HashSet;

    const INDEX: &str = "chunks";

    async fn engine_with_chunks(document_id: &str, count: usize) -> InMemoryEngine {
        let engine = InMemoryEngine::new();
        engine.create_index(INDEX, &json!({})).await.unwrap();
        let actions = (0..count)
            .map(|i| BulkAction::Index {
                index: INDEX.into(),
                id: chunk_uuid(document_id, i, &[]).to_string(),
                source: json!({"document_id": document_id, "chunk_id": i}),
            })
            .collect();
        engine.bulk(actions, true).await.unwrap();
        engine
    }

    #[test]
    fn test_chunk_uuid_deterministic() {
        let a = chunk_uuid("https://example.com/doc", 3, &[]);
        let b = chunk_uuid("https://example.com/doc", 3, &[]);
        assert_eq!(a, b);
        assert_eq!(a.get_version_num(), 5);
    }

    #[test]
    fn test_chunk_uuid_inputs_matter() {
        let base = chunk_uuid("doc", 1, &[]);
        assert_ne!(base, chunk_uuid("doc2", 1, &[]));
        assert_ne!(base, chunk_uuid("doc", 2, &[]));
        assert_ne!(base, chunk_uuid("doc", 1, &[4, 5]));
        assert_ne!(chunk_uuid("doc", 1, &[4, 5]), chunk_uuid("doc", 1, &[4, 5, 6]));
    }

    #[test]
    fn test_trailing_slash_ignored() {
        assert_eq!(chunk_uuid("https://a.com/x/", 0, &[]), chunk_uuid("https://a.com/x", 0, &[]));
    }

    #[test]
    fn test_known_range_from_counts() {
        let range = ChunkRange::for_reindex(Some(5), 3);
        assert_eq!(range, ChunkRange::Known(KnownRange { start: 3, end: Some(4) }));

        let range = ChunkRange::for_reindex(Some(0), 3);
        assert_eq!(range, ChunkRange::Known(KnownRange { start: 3, end: None }));

        assert_eq!(ChunkRange::for_reindex(None, 2), ChunkRange::Unprobed { start: 2 });
    }

    #[test]
    fn test_stale_ids_for_shrink() {
        let range = KnownRange { start: 3, end: Some(4) };
        let ids = range.chunk_ids("doc", false);
        assert_eq!(ids, vec![chunk_uuid("doc", 3, &[]), chunk_uuid("doc", 4, &[])]);

        let grow = KnownRange { start: 6, end: Some(4) };
        assert!(grow.chunk_ids("doc", false).is_empty());
    }

    #[test]
    fn test_stale_large_chunk_windows() {
        // 10 chunks shrinking to 6: windows [0..4) keep, [4..8) and [8..10) change
        let range = KnownRange { start: 6, end: Some(9) };
        let ids: HashSet<Uuid> = range.chunk_ids("doc", true).into_iter().collect();

        assert!(ids.contains(&chunk_uuid("doc", 1, &[4, 5, 6, 7])));
        assert!(ids.contains(&chunk_uuid("doc", 2, &[8, 9])));
        assert!(!ids.contains(&chunk_uuid("doc", 0, &[0, 1, 2, 3])));
        assert_eq!(ids.len(), 4 + 2);
    }

    #[test]
    fn test_whole_document_ids() {
        let range = KnownRange { start: 0, end: Some(4) };
        let ids = range.chunk_ids("doc", true);
        assert_eq!(ids.len(), 5 + 2);
        assert!(ids.contains(&chunk_uuid("doc", 0, &[0, 1, 2, 3])));
        assert!(ids.contains(&chunk_uuid("doc", 1, &[4])));
    }

    #[tokio::test]
    async fn test_probe_finds_last_index_for_every_k() {
        for k in [0usize, 1, 2, 5] {
            for start in [0usize, 2, 7] {
                let engine = engine_with_chunks("legacy", k).await;
                let range = probe_chunk_range(&engine, INDEX, "legacy", start, &RetryPolicy::immediate(1))
                    .await
                    .unwrap();
                assert_eq!(range.end, k.checked_sub(1), "k={} start={}", k, start);
                assert_eq!(range.start, start);
            }
        }
    }

    #[tokio::test]
    async fn test_probe_cost_for_missing_document() {
        let engine = engine_with_chunks("other", 3).await;
        let range = ChunkRange::Unprobed { start: 3 }
            .resolve(&engine, INDEX, "new-doc", &RetryPolicy::immediate(1))
            .await
            .unwrap();
        assert!(!range.already_existed());
        assert_eq!(engine.existence_check_count(), 2);
    }

    #[tokio::test]
    async fn test_known_range_skips_engine() {
        let engine = InMemoryEngine::new();
        let range = ChunkRange::for_reindex(Some(2), 1)
            .resolve(&engine, INDEX, "doc", &RetryPolicy::immediate(1))
            .await
            .unwrap();
        assert_eq!(range.end, Some(1));
        assert_eq!(engine.existence_check_count(), 0);
    }
}
