//! Search hit to chunk conversion

use crate::constants::*;
use crate::engine::SearchHit;
use chrono::DateTime;
use docindex_common::models::{MetadataValue, UncleanedChunk, DEFAULT_BOOST};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::error;

/// Split a stored summary into match highlights.
///
/// Sections are separated by [`SECTION_SEPARATOR`]. Once the running length
/// reaches `max_summary_length`, the last section is cut at a word boundary,
/// loses one trailing punctuation mark and gets an ellipsis.
pub fn process_dynamic_summary(dynamic_summary: &str, max_summary_length: usize) -> Vec<String> {
    if dynamic_summary.is_empty() {
        return Vec::new();
    }

    let mut current_length = 0;
    let mut processed: Vec<String> = Vec::new();
    for section in dynamic_summary.split(SECTION_SEPARATOR) {
        let section_length = section.chars().count();
        if current_length + section_length >= max_summary_length {
            let truncated: String = section
                .chars()
                .take(max_summary_length - current_length)
                .collect();
            match truncated.trim_start().rsplit_once(' ') {
                Some((head, _)) => {
                    let mut head = head.to_string();
                    if head.ends_with(|c: char| c.is_ascii_punctuation()) {
                        head.pop();
                    }
                    head.push_str("...");
                    processed.push(head);
                }
                // A lone partial word is dropped
                None => {
                    if let Some(last) = processed.last_mut() {
                        last.push_str("...");
                    }
                }
            }
            break;
        }
        processed.push(section.to_string());
        current_length += section_length;
    }
    processed
}

fn str_field(source: &Value, field: &str) -> Option<String> {
    source.get(field).and_then(Value::as_str).map(str::to_string)
}

fn string_list(source: &Value, field: &str) -> Vec<String> {
    source
        .get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn parse_metadata(value: Option<&Value>) -> BTreeMap<String, MetadataValue> {
    let parsed = match value {
        None | Some(Value::Null) => return BTreeMap::new(),
        Some(Value::String(raw)) => serde_json::from_str(raw),
        Some(other) => serde_json::from_value(other.clone()),
    };
    parsed.unwrap_or_else(|e| {
        error!(error = %e, "Failed to parse stored chunk metadata");
        BTreeMap::new()
    })
}

fn parse_source_links(value: Option<&Value>) -> BTreeMap<usize, String> {
    let object = match value {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).ok(),
        Some(other) => Some(other.clone()),
        None => None,
    };
    let mut links: BTreeMap<usize, String> = object
        .as_ref()
        .and_then(Value::as_object)
        .map(|links| {
            links
                .iter()
                .filter_map(|(offset, link)| {
                    Some((offset.parse().ok()?, link.as_str().unwrap_or_default().to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    if links.is_empty() {
        links.insert(0, String::new());
    }
    links
}

/// Convert a hit into a stored-form chunk.
///
/// Hits without content cannot be cleaned or matched and are dropped.
/// `null_score` marks retrieval modes that do not rank.
pub fn hit_to_chunk(hit: SearchHit, null_score: bool) -> Option<UncleanedChunk> {
    let source = &hit.source;
    let Some(content) = str_field(source, CONTENT) else {
        let document_id = str_field(source, DOCUMENT_ID).unwrap_or_else(|| hit.id.clone());
        error!(
            document_id = %document_id,
            chunk_uid = %hit.id,
            "Stored chunk has no content and cannot be returned"
        );
        return None;
    };

    let semantic_identifier = str_field(source, SEMANTIC_IDENTIFIER).unwrap_or_default();
    if semantic_identifier.is_empty() {
        let blurb: String = str_field(source, BLURB)
            .unwrap_or_default()
            .chars()
            .take(50)
            .collect();
        error!(chunk_uid = %hit.id, blurb = %blurb, "Stored chunk has no semantic identifier");
    }

    let summary = str_field(source, CONTENT_SUMMARY).unwrap_or_else(|| content.clone());
    let updated_at = source
        .get(DOC_UPDATED_AT)
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Some(UncleanedChunk {
        document_id: str_field(source, DOCUMENT_ID).unwrap_or_default(),
        chunk_id: source.get(CHUNK_ID).and_then(Value::as_u64).unwrap_or(0) as usize,
        blurb: str_field(source, BLURB).unwrap_or_default(),
        source_links: Some(parse_source_links(source.get(SOURCE_LINKS))),
        image_file_id: str_field(source, IMAGE_FILE_NAME),
        section_continuation: source
            .get(SECTION_CONTINUATION)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        source_type: str_field(source, SOURCE_TYPE).unwrap_or_default(),
        semantic_identifier,
        title: str_field(source, TITLE),
        boost: source.get(BOOST).and_then(Value::as_f64).unwrap_or(DEFAULT_BOOST),
        hidden: source.get(HIDDEN).and_then(Value::as_bool).unwrap_or(false),
        primary_owners: string_list(source, PRIMARY_OWNERS),
        secondary_owners: string_list(source, SECONDARY_OWNERS),
        large_chunk_reference_ids: source
            .get(LARGE_CHUNK_REFERENCE_IDS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_u64).map(|id| id as usize).collect())
            .unwrap_or_default(),
        metadata: parse_metadata(source.get(METADATA)),
        metadata_suffix: str_field(source, METADATA_SUFFIX),
        doc_summary: str_field(source, DOC_SUMMARY).unwrap_or_default(),
        chunk_context: str_field(source, CHUNK_CONTEXT).unwrap_or_default(),
        score: if null_score { None } else { Some(hit.score.unwrap_or(0.0)) },
        match_highlights: process_dynamic_summary(&summary, MAX_SUMMARY_LENGTH),
        updated_at,
        content,
    })
}
