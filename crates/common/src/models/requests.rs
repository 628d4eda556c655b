//! Request and result types of the index contract

use super::document::DocumentAccess;
use super::filters::IndexFilters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Chunks of one document to fetch by id.
///
/// Both bounds are inclusive; a missing bound is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRequest {
    pub document_id: String,
    #[serde(default)]
    pub min_chunk_ind: Option<usize>,
    #[serde(default)]
    pub max_chunk_ind: Option<usize>,
}

impl ChunkRequest {
    /// Every chunk of a document
    pub fn whole(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            min_chunk_ind: None,
            max_chunk_ind: None,
        }
    }

    /// Number of chunks covered, when both bounds are set
    pub fn range(&self) -> Option<usize> {
        match (self.min_chunk_ind, self.max_chunk_ind) {
            (Some(min), Some(max)) if max >= min => Some(max - min + 1),
            (Some(_), Some(_)) => Some(0),
            _ => None,
        }
    }

    /// Whether a chunk index falls within the requested bounds
    pub fn contains(&self, chunk_id: usize) -> bool {
        self.min_chunk_ind.map_or(true, |min| chunk_id >= min)
            && self.max_chunk_ind.map_or(true, |max| chunk_id <= max)
    }
}

/// Targeted field updates applied to every chunk of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFieldUpdate {
    pub access: Option<DocumentAccess>,
    pub document_sets: Option<BTreeSet<String>>,
    pub boost: Option<f64>,
    pub hidden: Option<bool>,
}

impl DocumentFieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.access.is_none()
            && self.document_sets.is_none()
            && self.boost.is_none()
            && self.hidden.is_none()
    }
}

/// Per-batch bookkeeping supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct IndexBatchParams {
    /// Chunk count stored by the caller; `None` for legacy documents
    pub doc_id_to_previous_chunk_cnt: HashMap<String, Option<usize>>,
    /// Chunk count produced by this run
    pub doc_id_to_new_chunk_cnt: HashMap<String, usize>,
    pub tenant_id: Option<String>,
    pub large_chunks_enabled: bool,
}

/// Outcome for one document touched by an index call
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentInsertionRecord {
    pub document_id: String,
    /// Whether the document had stored chunks before this run
    pub already_existed: bool,
}

/// A chunk that did not make it into the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub document_id: String,
    pub reason: String,
}

/// Result of an index call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexOutcome {
    pub records: BTreeSet<DocumentInsertionRecord>,
    /// Failed chunk ids mapped to the failure
    pub failed_chunks: BTreeMap<String, ChunkFailure>,
    pub chunks_indexed: usize,
    pub stale_chunks_deleted: usize,
}

impl IndexOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failed_chunks.is_empty()
    }
}

/// Ranking profile chosen by query expansion upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryExpansionType {
    /// Favors top-ranked exact matches
    Keyword,
    /// Favors broader recall
    #[default]
    Semantic,
}

/// Parameters of a hybrid retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridQuery {
    pub query: String,
    pub query_embedding: Vec<f32>,
    /// Keywords replacing the raw query in the keyword leg
    #[serde(default)]
    pub final_keywords: Option<Vec<String>>,
    #[serde(default)]
    pub filters: IndexFilters,
    /// Accepted for interface compatibility; fusion ranking does not use it
    #[serde(default)]
    pub hybrid_alpha: f64,
    #[serde(default = "default_time_decay_multiplier")]
    pub time_decay_multiplier: f64,
    pub num_to_retrieve: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub ranking_profile_type: QueryExpansionType,
    /// Overrides the configured title weight when set
    #[serde(default)]
    pub title_content_ratio: Option<f64>,
}

fn default_time_decay_multiplier() -> f64 {
    1.0
}

impl HybridQuery {
    pub fn new(query: impl Into<String>, query_embedding: Vec<f32>, num_to_retrieve: usize) -> Self {
        Self {
            query: query.into(),
            query_embedding,
            final_keywords: None,
            filters: IndexFilters::default(),
            hybrid_alpha: 0.5,
            time_decay_multiplier: default_time_decay_multiplier(),
            num_to_retrieve,
            offset: 0,
            ranking_profile_type: QueryExpansionType::default(),
            title_content_ratio: None,
        }
    }

    /// Text used by the keyword leg
    pub fn keyword_text(&self) -> String {
        match &self.final_keywords {
            Some(keywords) if !keywords.is_empty() => keywords.join(" "),
            _ => self.query.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_request_bounds() {
        let request = ChunkRequest {
            document_id: "doc".into(),
            min_chunk_ind: Some(2),
            max_chunk_ind: Some(4),
        };
        assert_eq!(request.range(), Some(3));
        assert!(request.contains(2));
        assert!(request.contains(4));
        assert!(!request.contains(5));
        assert!(ChunkRequest::whole("doc").contains(1000));
        assert_eq!(ChunkRequest::whole("doc").range(), None);
    }

    #[test]
    fn test_empty_update() {
        assert!(DocumentFieldUpdate::default().is_empty());
        let update = DocumentFieldUpdate {
            hidden: Some(true),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_keyword_text_prefers_final_keywords() {
        let mut query = HybridQuery::new("what is rust", vec![0.0; 3], 10);
        assert_eq!(query.keyword_text(), "what is rust");

        query.final_keywords = Some(vec!["rust".into(), "language".into()]);
        assert_eq!(query.keyword_text(), "rust language");

        query.final_keywords = Some(vec![]);
        assert_eq!(query.keyword_text(), "what is rust");
    }

    #[test]
    fn test_insertion_records_are_ordered() {
        let mut records = BTreeSet::new();
        records.insert(DocumentInsertionRecord {
            document_id: "b".into(),
            already_existed: false,
        });
        records.insert(DocumentInsertionRecord {
            document_id: "a".into(),
            already_existed: true,
        });
        let first = records.iter().next().map(|r| r.document_id.as_str());
        assert_eq!(first, Some("a"));
    }
}
