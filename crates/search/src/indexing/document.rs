//! Chunk to stored-document conversion

use crate::codec::{enrich_content, remove_invalid_unicode_chars};
use crate::constants::*;
use crate::identity::uuid_for_chunk;
use chrono::Utc;
use docindex_common::errors::{IndexError, Result};
use docindex_common::models::{DocumentAccess, IndexChunk};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Nested `{value, weight}` entries for the ACL field.
///
/// An empty ACL is stored as a single placeholder entry.
pub fn acl_entries(access: &DocumentAccess) -> Value {
    let mut entries: Vec<Value> = access
        .to_acl()
        .into_iter()
        .filter(|entry| !entry.is_empty())
        .map(|entry| json!({NESTED_VALUE: entry, "weight": DEFAULT_NESTED_WEIGHT}))
        .collect();
    if entries.is_empty() {
        entries.push(json!({NESTED_VALUE: DEFAULT_ACL_VALUE, "weight": DEFAULT_NESTED_WEIGHT}));
    }
    Value::Array(entries)
}

/// Nested `{value, weight}` entries for the document-set field
pub fn document_set_entries(document_sets: &BTreeSet<String>) -> Value {
    Value::Array(
        document_sets
            .iter()
            .filter(|set| !set.is_empty())
            .map(|set| json!({NESTED_VALUE: set, "weight": DEFAULT_NESTED_WEIGHT}))
            .collect(),
    )
}

fn check_embedding(chunk_id: &str, field: &str, vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(IndexError::InvalidChunk {
            chunk_id: chunk_id.to_string(),
            message: format!(
                "{} has {} dimensions, index expects {}",
                field,
                vector.len(),
                dimension
            ),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(IndexError::InvalidChunk {
            chunk_id: chunk_id.to_string(),
            message: format!("{} contains non-finite values", field),
        });
    }
    Ok(())
}

/// Build the stored source of a chunk, returning its id alongside.
///
/// Fails when an embedding does not fit the index; the caller logs and
/// skips the chunk.
pub fn prepare_chunk_source(
    chunk: &IndexChunk,
    tenant_id: Option<&str>,
    dimension: usize,
) -> Result<(String, Value)> {
    let id = uuid_for_chunk(chunk).to_string();
    check_embedding(&id, EMBEDDINGS, &chunk.embedding, dimension)?;
    if let Some(title_embedding) = &chunk.title_embedding {
        check_embedding(&id, TITLE_EMBEDDING, title_embedding, dimension)?;
    }

    let document = &chunk.source_document;
    let title = remove_invalid_unicode_chars(document.title_for_index());
    let updated_at = document.doc_updated_at.unwrap_or_else(Utc::now).timestamp();

    let mut source = Map::new();
    source.insert(DOCUMENT_ID.into(), json!(document.id));
    source.insert(CHUNK_ID.into(), json!(chunk.chunk_id));
    source.insert(BLURB.into(), json!(remove_invalid_unicode_chars(&chunk.blurb)));
    source.insert(SKIP_TITLE_EMBEDDING.into(), json!(title.is_empty()));
    source.insert(TITLE.into(), json!(title));
    source.insert(CONTENT.into(), json!(remove_invalid_unicode_chars(&enrich_content(chunk))));
    source.insert(CONTENT_SUMMARY.into(), json!(remove_invalid_unicode_chars(&chunk.content)));
    source.insert(SOURCE_TYPE.into(), json!(document.source_type));
    source.insert(
        SOURCE_LINKS.into(),
        serde_json::to_value(chunk.source_links.clone().unwrap_or_default())?,
    );
    source.insert(
        SEMANTIC_IDENTIFIER.into(),
        json!(remove_invalid_unicode_chars(&document.semantic_identifier)),
    );
    source.insert(SECTION_CONTINUATION.into(), json!(chunk.section_continuation));
    source.insert(LARGE_CHUNK_REFERENCE_IDS.into(), json!(chunk.large_chunk_reference_ids));
    source.insert(METADATA.into(), serde_json::to_value(&document.metadata)?);
    source.insert(METADATA_LIST.into(), json!(document.metadata_list()));
    source.insert(
        METADATA_SUFFIX.into(),
        json!(chunk.metadata_suffix.as_deref().map(remove_invalid_unicode_chars)),
    );
    source.insert(EMBEDDINGS.into(), json!(chunk.embedding));
    if let Some(title_embedding) = &chunk.title_embedding {
        source.insert(TITLE_EMBEDDING.into(), json!(title_embedding));
    }
    source.insert(DOC_UPDATED_AT.into(), json!(updated_at));
    source.insert(PRIMARY_OWNERS.into(), json!(document.primary_owners));
    source.insert(SECONDARY_OWNERS.into(), json!(document.secondary_owners));
    source.insert(ACCESS_CONTROL_LIST.into(), acl_entries(&chunk.access));
    source.insert(DOCUMENT_SETS.into(), document_set_entries(&chunk.document_sets));
    source.insert(BOOST.into(), json!(chunk.boost));
    source.insert(HIDDEN.into(), json!(chunk.hidden));
    if let Some(image_file_id) = &chunk.image_file_id {
        source.insert(IMAGE_FILE_NAME.into(), json!(image_file_id));
    }
    source.insert(DOC_SUMMARY.into(), json!(remove_invalid_unicode_chars(&chunk.doc_summary)));
    source.insert(CHUNK_CONTEXT.into(), json!(remove_invalid_unicode_chars(&chunk.chunk_context)));
    if let Some(tenant_id) = tenant_id {
        source.insert(TENANT_ID.into(), json!(tenant_id));
    }

    Ok((id, Value::Object(source)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use docindex_common::models::Document;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn sample_chunk() -> IndexChunk {
        let mut doc = Document::new("doc-1", "Design doc", "confluence");
        doc.title = Some("Design\u{0} doc".into());
        doc.doc_updated_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
        doc.metadata.insert("team".into(), "search".into());
        let mut chunk = IndexChunk::new(Arc::new(doc), 1, "chunk body", vec![0.5, 0.5]);
        chunk.source_links = Some(BTreeMap::from([(0, "https://wiki/doc#a".to_string())]));
        chunk.document_sets.insert("eng".into());
        chunk.metadata_suffix = Some("team: search".into());
        chunk
    }

    #[test]
    fn test_prepare_source_fields() {
        let chunk = sample_chunk();
        let (id, source) = prepare_chunk_source(&chunk, Some("tenant-a"), 2).unwrap();

        assert_eq!(id, uuid_for_chunk(&chunk).to_string());
        assert_eq!(source[TITLE], "Design doc");
        assert_eq!(source[SKIP_TITLE_EMBEDDING], false);
        assert_eq!(source[CONTENT], "Design doc\n\r\nchunk body\n\r\nteam: search");
        assert_eq!(source[CONTENT_SUMMARY], "chunk body");
        assert_eq!(source[SOURCE_LINKS]["0"], "https://wiki/doc#a");
        assert_eq!(source[METADATA_LIST], json!(["team===search"]));
        assert_eq!(source[DOC_UPDATED_AT], 1_714_564_800);
        assert_eq!(source[ACCESS_CONTROL_LIST], json!([{"value": "PUBLIC", "weight": 1}]));
        assert_eq!(source[DOCUMENT_SETS], json!([{"value": "eng", "weight": 1}]));
        assert_eq!(source[TENANT_ID], "tenant-a");
        assert!(source.get(TITLE_EMBEDDING).is_none());
    }

    #[test]
    fn test_metadata_suffix_sanitized_like_content() {
        let mut chunk = sample_chunk();
        chunk.metadata_suffix = Some("team:\u{1} search".into());
        let (_, source) = prepare_chunk_source(&chunk, None, 2).unwrap();

        assert_eq!(source[METADATA_SUFFIX], "team: search");
        let content = source[CONTENT].as_str().unwrap();
        assert!(content.ends_with(source[METADATA_SUFFIX].as_str().unwrap()));
    }

    #[test]
    fn test_empty_acl_gets_placeholder() {
        let entries = acl_entries(&DocumentAccess::default());
        assert_eq!(entries, json!([{"value": "default", "weight": 1}]));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let chunk = sample_chunk();
        let err = prepare_chunk_source(&chunk, None, 3).unwrap_err();
        assert!(matches!(err, IndexError::InvalidChunk { .. }));

        let mut chunk = sample_chunk();
        chunk.embedding = vec![f32::NAN, 0.0];
        assert!(prepare_chunk_source(&chunk, None, 2).is_err());
    }

    #[test]
    fn test_missing_update_time_is_now() {
        let mut chunk = sample_chunk();
        let mut doc = (*chunk.source_document).clone();
        doc.doc_updated_at = None;
        chunk.source_document = Arc::new(doc);

        let before = Utc::now().timestamp();
        let (_, source) = prepare_chunk_source(&chunk, None, 2).unwrap();
        assert!(source[DOC_UPDATED_AT].as_i64().unwrap() >= before);
        assert!(source.get(TENANT_ID).is_none());
    }
}
