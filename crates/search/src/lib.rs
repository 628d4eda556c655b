//! docindex Search Adapter
//!
//! Chunk indexing and retrieval over an Elasticsearch-compatible engine:
//! - Chunk content enrichment and cleanup
//! - Deterministic chunk identity and stale-range resolution
//! - Bulk indexing, targeted updates, deletion
//! - Id-based, hybrid (RRF), admin and random retrieval

pub mod codec;
pub mod constants;
pub mod engine;
pub mod factory;
pub mod filters;
pub mod identity;
pub mod index;
pub mod indexing;
pub mod readiness;
pub mod retrieval;
pub mod schema;

pub use engine::{ElasticsearchClient, InMemoryEngine, RetryPolicy, SearchEngine};
pub use factory::create_document_index;
pub use index::{DocumentIndex, ElasticsearchIndex};
pub use readiness::wait_for_engine;
