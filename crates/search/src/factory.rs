//! Document index selection by configured type

use crate::engine::SearchEngine;
use crate::index::{DocumentIndex, ElasticsearchIndex};
use docindex_common::config::AppConfig;
use docindex_common::errors::{IndexError, Result};
use std::sync::Arc;
use tracing::info;

pub const ELASTICSEARCH_INDEX_TYPE: &str = "elasticsearch";

/// Build the document index named by `index.index_type`
pub fn create_document_index(
    config: &AppConfig,
    engine: Arc<dyn SearchEngine>,
) -> Result<Arc<dyn DocumentIndex>> {
    match config.index.index_type.trim().to_ascii_lowercase().as_str() {
        ELASTICSEARCH_INDEX_TYPE => {
            info!(
                primary = %config.index.primary.name,
                secondary = ?config.index.secondary.as_ref().map(|s| &s.name),
                "Using Elasticsearch document index"
            );
            Ok(Arc::new(ElasticsearchIndex::new(config, engine)))
        }
        _ => Err(IndexError::InvalidIndexType {
            index_type: config.index.index_type.clone(),
        }),
    }
}
