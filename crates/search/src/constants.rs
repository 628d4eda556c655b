//! Stored field names and tuning constants

// ============================================================================
// Field names
// ============================================================================

pub const TENANT_ID: &str = "tenant_id";
pub const DOCUMENT_ID: &str = "document_id";
pub const CHUNK_ID: &str = "chunk_id";
pub const BLURB: &str = "blurb";
pub const CONTENT: &str = "content";
pub const SOURCE_TYPE: &str = "source_type";
pub const SOURCE_LINKS: &str = "source_links";
pub const SEMANTIC_IDENTIFIER: &str = "semantic_identifier";
pub const TITLE: &str = "title";
pub const TITLE_KEYWORD: &str = "title.keyword";
pub const SKIP_TITLE_EMBEDDING: &str = "skip_title";
pub const SECTION_CONTINUATION: &str = "section_continuation";
pub const EMBEDDINGS: &str = "embeddings";
pub const TITLE_EMBEDDING: &str = "title_embedding";
pub const ACCESS_CONTROL_LIST: &str = "access_control_list";
pub const DOCUMENT_SETS: &str = "document_sets";
pub const LARGE_CHUNK_REFERENCE_IDS: &str = "large_chunk_reference_ids";
pub const METADATA: &str = "metadata";
pub const METADATA_LIST: &str = "metadata_list";
pub const METADATA_SUFFIX: &str = "metadata_suffix";
pub const BOOST: &str = "boost";
pub const RECENCY_BIAS: &str = "recency_bias";
pub const DOC_UPDATED_AT: &str = "doc_updated_at";
pub const PRIMARY_OWNERS: &str = "primary_owners";
pub const SECONDARY_OWNERS: &str = "secondary_owners";
pub const HIDDEN: &str = "hidden";
pub const CONTENT_SUMMARY: &str = "content_summary";
pub const IMAGE_FILE_NAME: &str = "image_file_name";
pub const DOC_SUMMARY: &str = "doc_summary";
pub const CHUNK_CONTEXT: &str = "chunk_context";

/// Sub-field of nested ACL and document-set entries
pub const NESTED_VALUE: &str = "value";

/// Tag key expanded into a range of years
pub const MIN_YEAR: &str = "min_year";
pub const YEAR: &str = "year";

// ============================================================================
// Content enrichment
// ============================================================================

/// Separates the title and metadata suffix from chunk content
pub const RETURN_SEPARATOR: &str = "\n\r\n";

/// Marks section boundaries inside stored content summaries
pub const SECTION_SEPARATOR: &str = "<sep />";

/// Maximum characters of match highlights per chunk
pub const MAX_SUMMARY_LENGTH: usize = 400;

// ============================================================================
// Tuning
// ============================================================================

/// Maximum document ids per `terms` query in batch id retrieval
pub const MAX_TERMS: usize = 1000;

/// Hits requested per id-based retrieval query
pub const MAX_ID_SEARCH_HITS: usize = 10_000;

/// Upper bound on k-NN candidates per shard
pub const MAX_NUM_CANDIDATES: usize = 10_000;

/// Regular chunks merged into one large chunk
pub const LARGE_CHUNK_RATIO: usize = 4;

/// Base recency decay per year of document age
pub const DOC_TIME_DECAY: f64 = 1.0;

/// Recency factor never drops below this
pub const RECENCY_FLOOR: f64 = 0.75;

/// Seconds assumed for documents without an update time (about 3 months)
pub const DEFAULT_DOC_AGE_SECS: i64 = 7_890_000;

/// Weight of every nested ACL and document-set entry
pub const DEFAULT_NESTED_WEIGHT: i64 = 1;

/// ACL value stored when a chunk has no access entries
pub const DEFAULT_ACL_VALUE: &str = "default";
