//! Shared data model for indexing and retrieval

pub mod chunk;
pub mod document;
pub mod filters;
pub mod requests;

pub use chunk::{IndexChunk, InferenceChunk, UncleanedChunk, DEFAULT_BOOST};
pub use document::{Document, DocumentAccess, MetadataValue, METADATA_KEY_VALUE_SEPARATOR};
pub use filters::{IndexFilters, Tag};
pub use requests::{
    ChunkFailure, ChunkRequest, DocumentFieldUpdate, DocumentInsertionRecord, HybridQuery,
    IndexBatchParams, IndexOutcome, QueryExpansionType,
};
