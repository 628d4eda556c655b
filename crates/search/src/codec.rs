//! Chunk Content Codec
//!
//! Stored content is `title SEP | doc_summary | content | chunk_context | SEP metadata_suffix`,
//! each part present only when its input is non-empty. [`cleanup_chunk`]
//! strips the parts in a fixed order (title, metadata suffix, contextual
//! fields) and is the exact inverse of [`enrich_content`].

use crate::constants::RETURN_SEPARATOR;
use docindex_common::models::{IndexChunk, InferenceChunk, UncleanedChunk};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Content as stored in the index
pub fn enrich_content(chunk: &IndexChunk) -> String {
    let title = chunk.source_document.title_for_index();
    let metadata_suffix = chunk.metadata_suffix.as_deref().unwrap_or_default();

    let mut enriched = String::with_capacity(
        title.len() + chunk.doc_summary.len() + chunk.content.len() + chunk.chunk_context.len()
            + metadata_suffix.len() + 2 * RETURN_SEPARATOR.len(),
    );
    if !title.trim().is_empty() {
        enriched.push_str(title);
        enriched.push_str(RETURN_SEPARATOR);
    }
    enriched.push_str(&chunk.doc_summary);
    enriched.push_str(&chunk.content);
    enriched.push_str(&chunk.chunk_context);
    if !metadata_suffix.is_empty() {
        enriched.push_str(RETURN_SEPARATOR);
        enriched.push_str(metadata_suffix);
    }
    enriched
}

/// Strip the title prefix.
///
/// The exact `title SEP` prefix is removed first. Content starting with the
/// bare title loses it plus leading whitespace. Content starting with only
/// the first `blurb_size` characters of the title is split once on the
/// separator. Anything else is left untouched.
fn remove_title(content: &str, title: Option<&str>, blurb_size: usize) -> String {
    let Some(title) = title.filter(|t| !t.trim().is_empty()) else {
        return content.to_string();
    };
    if content.is_empty() {
        return String::new();
    }

    if let Some(rest) = content
        .strip_prefix(title)
        .and_then(|rest| rest.strip_prefix(RETURN_SEPARATOR))
    {
        return rest.to_string();
    }
    if let Some(rest) = content.strip_prefix(title) {
        return rest.trim_start().to_string();
    }

    let title_blurb: String = title.chars().take(blurb_size).collect();
    if content.starts_with(&title_blurb) {
        return match content.split_once(RETURN_SEPARATOR) {
            Some((_, rest)) => rest.to_string(),
            None => content.to_string(),
        };
    }

    content.to_string()
}

/// Strip the metadata suffix and the separator before it
fn remove_metadata_suffix(content: String, metadata_suffix: Option<&str>) -> String {
    let Some(suffix) = metadata_suffix.filter(|s| !s.is_empty()) else {
        return content;
    };
    let Some(stripped) = content.strip_suffix(suffix) else {
        return content;
    };
    stripped
        .strip_suffix(RETURN_SEPARATOR)
        .unwrap_or(stripped)
        .to_string()
}

/// Strip the leading document summary and trailing chunk context
fn remove_contextual_fields(content: String, doc_summary: &str, chunk_context: &str) -> String {
    let mut content = content.as_str();
    if !doc_summary.is_empty() {
        content = content.strip_prefix(doc_summary).unwrap_or(content);
    }
    if !chunk_context.is_empty() {
        content = content.strip_suffix(chunk_context).unwrap_or(content);
    }
    content.to_string()
}

/// Restore the original content of a retrieved chunk
pub fn cleanup_chunk(mut chunk: UncleanedChunk, blurb_size: usize) -> InferenceChunk {
    let content = remove_title(&chunk.content, chunk.title.as_deref(), blurb_size);
    let content = remove_metadata_suffix(content, chunk.metadata_suffix.as_deref());
    chunk.content = remove_contextual_fields(content, &chunk.doc_summary, &chunk.chunk_context);
    chunk.into_inference_chunk()
}

pub fn cleanup_chunks(chunks: Vec<UncleanedChunk>, blurb_size: usize) -> Vec<InferenceChunk> {
    chunks
        .into_iter()
        .map(|chunk| cleanup_chunk(chunk, blurb_size))
        .collect()
}

fn invalid_unicode_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            // Control characters other than tab/newline/CR, and non-characters
            Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x{FDD0}-\x{FDEF}\x{FFFE}\x{FFFF}]").ok()
        })
        .as_ref()
}

/// Remove code points the engine rejects or mangles
pub fn remove_invalid_unicode_chars(text: &str) -> String {
    match invalid_unicode_pattern() {
        Some(pattern) => pattern.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docindex_common::models::Document;
    use std::sync::Arc;

    const BLURB_SIZE: usize = 128;

    fn chunk(title: Option<&str>, content: &str) -> IndexChunk {
        let mut doc = Document::new("doc-1", "", "web");
        doc.title = title.map(str::to_string);
        IndexChunk::new(Arc::new(doc), 0, content, vec![0.0; 2])
    }

    fn stored(chunk: &IndexChunk) -> UncleanedChunk {
        let title = chunk.source_document.title_for_index();
        UncleanedChunk {
            document_id: chunk.document_id().to_string(),
            chunk_id: chunk.chunk_id,
            blurb: chunk.blurb.clone(),
            content: enrich_content(chunk),
            source_links: None,
            image_file_id: None,
            section_continuation: false,
            source_type: "web".into(),
            semantic_identifier: "doc".into(),
            title: (!title.is_empty()).then(|| title.to_string()),
            boost: 0.0,
            hidden: false,
            primary_owners: vec![],
            secondary_owners: vec![],
            large_chunk_reference_ids: vec![],
            metadata: Default::default(),
            metadata_suffix: chunk.metadata_suffix.clone(),
            doc_summary: chunk.doc_summary.clone(),
            chunk_context: chunk.chunk_context.clone(),
            score: None,
            match_highlights: vec![],
            updated_at: None,
        }
    }

    fn round_trip(chunk: &IndexChunk) -> String {
        cleanup_chunk(stored(chunk), BLURB_SIZE).content
    }

    #[test]
    fn test_enrich_layout() {
        let mut c = chunk(Some("Title"), "body");
        c.metadata_suffix = Some("author: alice".into());
        c.doc_summary = "Summary. ".into();
        c.chunk_context = " Context.".into();
        assert_eq!(
            enrich_content(&c),
            "Title\n\r\nSummary. body Context.\n\r\nauthor: alice"
        );
    }

    #[test]
    fn test_round_trip_without_title() {
        let c = chunk(Some(""), "plain body");
        assert_eq!(enrich_content(&c), "plain body");
        assert_eq!(round_trip(&c), "plain body");
    }

    #[test]
    fn test_round_trip_with_all_fields() {
        let mut c = chunk(Some("Title"), "  indented body\n");
        c.metadata_suffix = Some("tags: a, b".into());
        c.doc_summary = "Doc summary.".into();
        c.chunk_context = "Chunk context.".into();
        assert_eq!(round_trip(&c), "  indented body\n");
    }

    #[test]
    fn test_round_trip_metadata_only() {
        let mut c = chunk(Some("Title"), "body");
        c.metadata_suffix = Some("k: v".into());
        assert_eq!(round_trip(&c), "body");
    }

    #[test]
    fn test_round_trip_long_title() {
        let long_title = "T".repeat(300);
        let c = chunk(Some(&long_title), "body text");
        assert_eq!(round_trip(&c), "body text");
    }

    #[test]
    fn test_round_trip_title_truncated_at_blurb_size() {
        let full_title = format!("{} quarterly planning notes", "Roadmap ".repeat(20));
        assert!(full_title.chars().count() > BLURB_SIZE);
        let truncated: String = full_title.chars().take(BLURB_SIZE).collect();

        // Stored content carries only the truncated title prefix
        let mut indexed = chunk(Some(&truncated), "milestones for Q3");
        indexed.metadata_suffix = Some("owner: planning".into());
        indexed.chunk_context = " Context.".into();
        let mut retrieved = stored(&indexed);
        assert!(retrieved.content.starts_with(&truncated));
        retrieved.title = Some(full_title);

        assert_eq!(cleanup_chunk(retrieved, BLURB_SIZE).content, "milestones for Q3");
    }

    #[test]
    fn test_truncated_title_prefix_splits_on_separator() {
        let title = format!("{}{}", "a".repeat(BLURB_SIZE), "full tail");
        let content = format!("{}{}body", "a".repeat(BLURB_SIZE), RETURN_SEPARATOR);
        assert_eq!(remove_title(&content, Some(&title), BLURB_SIZE), "body");
    }

    #[test]
    fn test_truncated_title_without_separator_is_noop() {
        let title = format!("{}{}", "a".repeat(BLURB_SIZE), "tail");
        let content = format!("{} and more", "a".repeat(BLURB_SIZE));
        assert_eq!(remove_title(&content, Some(&title), BLURB_SIZE), content);
    }

    #[test]
    fn test_bare_title_prefix_trims_whitespace() {
        assert_eq!(remove_title("Title   body", Some("Title"), BLURB_SIZE), "body");
    }

    #[test]
    fn test_unrelated_title_untouched() {
        assert_eq!(remove_title("body", Some("Other"), BLURB_SIZE), "body");
        assert_eq!(remove_title("body", None, BLURB_SIZE), "body");
    }

    #[test]
    fn test_missing_suffix_does_not_corrupt_content() {
        let content = remove_metadata_suffix("body\n\r\n".into(), Some("absent"));
        assert_eq!(content, "body\n\r\n");
        let content = remove_contextual_fields("body".into(), "summary", "context");
        assert_eq!(content, "body");
    }

    #[test]
    fn test_remove_invalid_unicode() {
        assert_eq!(remove_invalid_unicode_chars("a\u{0}b\tc\nd\u{1F}e\u{FFFE}"), "ab\tc\nde");
        assert_eq!(remove_invalid_unicode_chars("héllo"), "héllo");
    }
}
