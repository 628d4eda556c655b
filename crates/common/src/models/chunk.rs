//! Chunk types on both sides of the index
//!
//! - [`IndexChunk`]: a chunk on its way into the index, carrying its document
//! - [`UncleanedChunk`]: a chunk as read back, content still enriched
//! - [`InferenceChunk`]: a cleaned chunk handed to callers

use super::document::{Document, DocumentAccess, MetadataValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Boost applied when a document has never been rated
pub const DEFAULT_BOOST: f64 = 0.0;

/// A chunk ready for indexing.
///
/// Content, embeddings and enrichment inputs are finalized upstream; the
/// index only applies the textual enrichment.
#[derive(Debug, Clone)]
pub struct IndexChunk {
    pub source_document: Arc<Document>,
    /// Zero-based position within the document (or within the large-chunk
    /// sequence when `large_chunk_reference_ids` is non-empty)
    pub chunk_id: usize,
    pub blurb: String,
    pub content: String,
    /// Link anchors keyed by character offset into the content
    pub source_links: Option<BTreeMap<usize, String>>,
    pub image_file_id: Option<String>,
    pub section_continuation: bool,
    /// Metadata rendered for keyword matching, appended after a separator
    pub metadata_suffix: Option<String>,
    /// Contextual summary of the whole document, prepended to content
    pub doc_summary: String,
    /// Contextual description of this chunk, appended to content
    pub chunk_context: String,
    /// Indices of the regular chunks merged into this large chunk
    pub large_chunk_reference_ids: Vec<usize>,
    pub embedding: Vec<f32>,
    pub title_embedding: Option<Vec<f32>>,
    pub access: DocumentAccess,
    pub document_sets: BTreeSet<String>,
    pub boost: f64,
    pub hidden: bool,
}

impl IndexChunk {
    /// Chunk with default access, boost and enrichment inputs
    pub fn new(
        source_document: Arc<Document>,
        chunk_id: usize,
        content: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        let content = content.into();
        Self {
            source_document,
            chunk_id,
            blurb: content.chars().take(128).collect(),
            content,
            source_links: None,
            image_file_id: None,
            section_continuation: false,
            metadata_suffix: None,
            doc_summary: String::new(),
            chunk_context: String::new(),
            large_chunk_reference_ids: Vec::new(),
            embedding,
            title_embedding: None,
            access: DocumentAccess::public(),
            document_sets: BTreeSet::new(),
            boost: DEFAULT_BOOST,
            hidden: false,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.source_document.id
    }

    /// Whether this chunk is a merged multi-chunk window
    pub fn is_large(&self) -> bool {
        !self.large_chunk_reference_ids.is_empty()
    }
}

/// A chunk as stored, before enrichment is stripped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncleanedChunk {
    pub document_id: String,
    pub chunk_id: usize,
    pub blurb: String,
    pub content: String,
    pub source_links: Option<BTreeMap<usize, String>>,
    pub image_file_id: Option<String>,
    pub section_continuation: bool,
    pub source_type: String,
    pub semantic_identifier: String,
    pub title: Option<String>,
    pub boost: f64,
    pub hidden: bool,
    pub primary_owners: Vec<String>,
    pub secondary_owners: Vec<String>,
    pub large_chunk_reference_ids: Vec<usize>,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub metadata_suffix: Option<String>,
    pub doc_summary: String,
    pub chunk_context: String,
    /// Relevance score; `None` for retrieval modes that do not rank
    pub score: Option<f64>,
    pub match_highlights: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UncleanedChunk {
    /// Drop the enrichment inputs, keeping whatever content is set
    pub fn into_inference_chunk(self) -> InferenceChunk {
        InferenceChunk {
            document_id: self.document_id,
            chunk_id: self.chunk_id,
            blurb: self.blurb,
            content: self.content,
            source_links: self.source_links,
            image_file_id: self.image_file_id,
            section_continuation: self.section_continuation,
            source_type: self.source_type,
            semantic_identifier: self.semantic_identifier,
            title: self.title,
            boost: self.boost,
            hidden: self.hidden,
            primary_owners: self.primary_owners,
            secondary_owners: self.secondary_owners,
            large_chunk_reference_ids: self.large_chunk_reference_ids,
            metadata: self.metadata,
            score: self.score,
            match_highlights: self.match_highlights,
            updated_at: self.updated_at,
        }
    }
}

/// A retrieved chunk with original content restored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceChunk {
    pub document_id: String,
    pub chunk_id: usize,
    pub blurb: String,
    pub content: String,
    pub source_links: Option<BTreeMap<usize, String>>,
    pub image_file_id: Option<String>,
    pub section_continuation: bool,
    pub source_type: String,
    pub semantic_identifier: String,
    pub title: Option<String>,
    pub boost: f64,
    pub hidden: bool,
    pub primary_owners: Vec<String>,
    pub secondary_owners: Vec<String>,
    pub large_chunk_reference_ids: Vec<usize>,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub score: Option<f64>,
    pub match_highlights: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InferenceChunk {
    /// Key that identifies a chunk within the result set
    pub fn unique_id(&self) -> String {
        format!("{}__{}", self.document_id, self.chunk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chunk_defaults() {
        let doc = Arc::new(Document::new("doc-1", "Doc", "web"));
        let chunk = IndexChunk::new(doc, 2, "hello world", vec![0.1, 0.2]);

        assert_eq!(chunk.document_id(), "doc-1");
        assert_eq!(chunk.blurb, "hello world");
        assert!(!chunk.is_large());
        assert!(chunk.access.is_public);
        assert_eq!(chunk.boost, DEFAULT_BOOST);
    }
}
