//! Index Facade
//!
//! [`DocumentIndex`] is the contract callers program against;
//! [`ElasticsearchIndex`] implements it on top of an injected
//! [`SearchEngine`].

use crate::codec::cleanup_chunks;
use crate::engine::{RetryPolicy, SearchEngine};
use crate::filters::FilterBuilder;
use crate::indexing;
use crate::retrieval::{
    admin_search_body, hybrid_search_body, random_search_body, search_chunks,
    sort_by_request_order, IdRetrieval, RetrievalMode,
};
use crate::schema::{bulk_index_settings, document_mappings, index_body, index_settings, validate_index_schema};
use async_trait::async_trait;
use docindex_common::config::{AppConfig, IndexConfig, IndexTarget};
use docindex_common::errors::Result;
use docindex_common::metrics::SearchTimer;
use docindex_common::models::{
    ChunkRequest, DocumentFieldUpdate, HybridQuery, IndexBatchParams, IndexChunk, IndexFilters,
    IndexOutcome, InferenceChunk, UncleanedChunk,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Operations every document index backend provides
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Create missing indices; existing ones are checked for drift
    async fn ensure_indices_exist(&self) -> Result<()>;

    /// Index chunks, replacing stale chunks of the documents involved
    async fn index(&self, chunks: &[IndexChunk], params: &IndexBatchParams) -> Result<IndexOutcome>;

    /// Apply a field update to every chunk of one document. Returns the
    /// number of chunks updated.
    async fn update_single(
        &self,
        document_id: &str,
        chunk_count: Option<usize>,
        fields: &DocumentFieldUpdate,
    ) -> Result<usize>;

    /// Delete every chunk of one document. Returns the number deleted.
    async fn delete_single(&self, document_id: &str, chunk_count: Option<usize>) -> Result<usize>;

    /// Chunks by document id and optional index range, hidden ones included
    async fn id_based_retrieval(
        &self,
        requests: &[ChunkRequest],
        filters: &IndexFilters,
        batch_retrieval: bool,
        get_large_chunks: bool,
    ) -> Result<Vec<InferenceChunk>>;

    /// Keyword and vector retrieval fused by reciprocal rank
    async fn hybrid_retrieval(&self, query: &HybridQuery) -> Result<Vec<InferenceChunk>>;

    /// Title-first search for administrative UIs
    async fn admin_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>>;

    /// Random sample of matching chunks
    async fn random_retrieval(&self, filters: &IndexFilters, num_to_retrieve: usize) -> Result<Vec<InferenceChunk>>;
}

/// Elasticsearch-backed document index
pub struct ElasticsearchIndex {
    engine: Arc<dyn SearchEngine>,
    config: IndexConfig,
    filters: FilterBuilder,
    retry: RetryPolicy,
}

impl ElasticsearchIndex {
    pub fn new(config: &AppConfig, engine: Arc<dyn SearchEngine>) -> Self {
        Self {
            engine,
            config: config.index.clone(),
            filters: FilterBuilder::new(config.index.multitenant, &config.retrieval),
            retry: RetryPolicy::from_config(&config.retrieval),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_filter_builder(mut self, filters: FilterBuilder) -> Self {
        self.filters = filters;
        self
    }

    pub fn index_name(&self) -> &str {
        &self.config.primary.name
    }

    fn targets(&self) -> Vec<&IndexTarget> {
        self.config.targets()
    }

    /// Drift between one existing index and the expected mapping
    pub async fn validate_schema(&self, target: &IndexTarget) -> Result<Vec<String>> {
        let actual = self
            .retry
            .run("get_mapping", || self.engine.get_mapping(&target.name))
            .await?;
        let expected = document_mappings(target.dimension, self.config.multitenant);
        Ok(validate_index_schema(&actual, &expected))
    }

    /// Switch the primary index to bulk-load settings
    pub async fn use_bulk_settings(&self) -> Result<()> {
        let settings = bulk_index_settings();
        self.engine.put_settings(self.index_name(), &settings).await?;
        info!(index = %self.index_name(), "Applied bulk-load settings");
        Ok(())
    }

    /// Restore serving settings after a bulk load and make the data visible
    pub async fn use_serving_settings(&self) -> Result<()> {
        let mut settings = index_settings(&self.config);
        if let Some(object) = settings.as_object_mut() {
            // Static settings cannot change on an open index
            object.remove("number_of_shards");
            object.remove("analysis");
            object.insert("refresh_interval".into(), "1s".into());
        }
        self.engine.put_settings(self.index_name(), &settings).await?;
        self.engine.refresh(self.index_name()).await?;
        info!(index = %self.index_name(), "Restored serving settings");
        Ok(())
    }

    fn clean(&self, chunks: Vec<UncleanedChunk>, timer: SearchTimer) -> Vec<InferenceChunk> {
        let cleaned = cleanup_chunks(chunks, self.config.blurb_size);
        timer.finish(cleaned.len());
        cleaned
    }
}

#[async_trait]
impl DocumentIndex for ElasticsearchIndex {
    async fn ensure_indices_exist(&self) -> Result<()> {
        for target in self.targets() {
            let exists = self
                .retry
                .run("index_exists", || self.engine.index_exists(&target.name))
                .await?;
            if exists {
                let drift = self.validate_schema(target).await?;
                if drift.is_empty() {
                    debug!(index = %target.name, "Index exists with expected schema");
                } else {
                    warn!(index = %target.name, problems = ?drift, "Index schema differs from expected mapping");
                }
                continue;
            }

            self.engine
                .create_index(&target.name, &index_body(&self.config, target.dimension))
                .await?;
            info!(index = %target.name, dimension = target.dimension, "Created index");
        }
        Ok(())
    }

    #[instrument(skip(self, chunks, params), fields(index = %self.index_name(), chunk_count = chunks.len()))]
    async fn index(&self, chunks: &[IndexChunk], params: &IndexBatchParams) -> Result<IndexOutcome> {
        indexing::index_chunks(
            self.engine.as_ref(),
            &self.config.primary,
            chunks,
            params,
            self.config.batch_size,
            &self.retry,
        )
        .await
    }

    #[instrument(skip(self, fields), fields(index = %self.index_name()))]
    async fn update_single(
        &self,
        document_id: &str,
        chunk_count: Option<usize>,
        fields: &DocumentFieldUpdate,
    ) -> Result<usize> {
        indexing::update_single(
            self.engine.as_ref(),
            &self.targets(),
            document_id,
            chunk_count,
            fields,
            &self.retry,
        )
        .await
    }

    #[instrument(skip(self), fields(index = %self.index_name()))]
    async fn delete_single(&self, document_id: &str, chunk_count: Option<usize>) -> Result<usize> {
        indexing::delete_single(
            self.engine.as_ref(),
            &self.targets(),
            document_id,
            chunk_count,
            &self.retry,
        )
        .await
    }

    async fn id_based_retrieval(
        &self,
        requests: &[ChunkRequest],
        filters: &IndexFilters,
        batch_retrieval: bool,
        get_large_chunks: bool,
    ) -> Result<Vec<InferenceChunk>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let timer = SearchTimer::start(RetrievalMode::IdBased.as_str());

        let filter_clauses = self.filters.build(filters, true);
        let retrieval = IdRetrieval {
            engine: self.engine.as_ref(),
            index: self.index_name(),
            filters: &filter_clauses,
            include_large_chunks: get_large_chunks,
            retry: &self.retry,
        };
        let mut chunks = if batch_retrieval {
            retrieval.batch(requests).await
        } else {
            retrieval.individual(requests).await
        };
        sort_by_request_order(&mut chunks, requests);
        Ok(self.clean(chunks, timer))
    }

    async fn hybrid_retrieval(&self, query: &HybridQuery) -> Result<Vec<InferenceChunk>> {
        // A zero rank window is rejected by the engine
        if query.num_to_retrieve == 0 {
            debug!("Hybrid retrieval asked for no chunks");
            return Ok(Vec::new());
        }
        let timer = SearchTimer::start(RetrievalMode::Hybrid.as_str());
        debug!(
            hybrid_alpha = query.hybrid_alpha,
            "Rank fusion ignores hybrid_alpha"
        );

        let filter_clauses = self.filters.build(&query.filters, false);
        let title_content_ratio = query
            .title_content_ratio
            .unwrap_or(self.config.title_content_ratio);
        let body = hybrid_search_body(query, &filter_clauses, title_content_ratio);
        let chunks = search_chunks(
            self.engine.as_ref(),
            self.index_name(),
            &body,
            RetrievalMode::Hybrid,
            &self.retry,
        )
        .await?;
        Ok(self.clean(chunks, timer))
    }

    async fn admin_retrieval(
        &self,
        query: &str,
        filters: &IndexFilters,
        num_to_retrieve: usize,
    ) -> Result<Vec<InferenceChunk>> {
        let timer = SearchTimer::start(RetrievalMode::Admin.as_str());
        let filter_clauses = self.filters.build(filters, true);
        let body = admin_search_body(query, &filter_clauses, num_to_retrieve);
        let chunks = search_chunks(
            self.engine.as_ref(),
            self.index_name(),
            &body,
            RetrievalMode::Admin,
            &self.retry,
        )
        .await?;
        Ok(self.clean(chunks, timer))
    }

    async fn random_retrieval(&self, filters: &IndexFilters, num_to_retrieve: usize) -> Result<Vec<InferenceChunk>> {
        let timer = SearchTimer::start(RetrievalMode::Random.as_str());
        let filter_clauses = self.filters.build(filters, false);
        let body = random_search_body(&filter_clauses, num_to_retrieve);
        let chunks = search_chunks(
            self.engine.as_ref(),
            self.index_name(),
            &body,
            RetrievalMode::Random,
            &self.retry,
        )
        .await?;
        Ok(self.clean(chunks, timer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use docindex_common::models::{Document, Tag};
    use std::collections::HashMap;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.index.primary = IndexTarget {
            name: "chunks".into(),
            dimension: 2,
            large_chunks_enabled: false,
        };
        config
    }

    fn facade(engine: Arc<InMemoryEngine>) -> ElasticsearchIndex {
        ElasticsearchIndex::new(&config(), engine).with_retry_policy(RetryPolicy::immediate(1))
    }

    fn chunks(document_id: &str, title: &str, texts: &[&str]) -> Vec<IndexChunk> {
        let mut doc = Document::new(document_id, title, "web");
        doc.title = Some(title.to_string());
        let doc = Arc::new(doc);
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| IndexChunk::new(doc.clone(), i, *text, vec![1.0, 0.0]))
            .collect()
    }

    fn fresh(document_ids: &[&str]) -> IndexBatchParams {
        IndexBatchParams {
            doc_id_to_previous_chunk_cnt: document_ids.iter().map(|id| (id.to_string(), Some(0))).collect(),
            doc_id_to_new_chunk_cnt: HashMap::new(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_ensure_indices_is_idempotent() {
        let engine = Arc::new(InMemoryEngine::new());
        let mut config = config();
        config.index.secondary = Some(IndexTarget {
            name: "chunks_next".into(),
            dimension: 4,
            large_chunks_enabled: false,
        });
        let index = ElasticsearchIndex::new(&config, engine.clone());

        index.ensure_indices_exist().await.unwrap();
        index.ensure_indices_exist().await.unwrap();

        let primary = engine.index_body("chunks").await.unwrap();
        let secondary = engine.index_body("chunks_next").await.unwrap();
        assert_eq!(primary["mappings"]["properties"]["embeddings"]["dims"], 2);
        assert_eq!(secondary["mappings"]["properties"]["embeddings"]["dims"], 4);
        assert!(index.validate_schema(&config.index.primary).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bulk_then_serving_settings() {
        let engine = Arc::new(InMemoryEngine::new());
        let index = facade(engine.clone());
        index.ensure_indices_exist().await.unwrap();

        index.use_bulk_settings().await.unwrap();
        let settings = engine.index_body("chunks").await.unwrap()["settings"].clone();
        assert_eq!(settings["number_of_replicas"], 0);
        assert_eq!(settings["refresh_interval"], "-1");

        index.use_serving_settings().await.unwrap();
        let settings = engine.index_body("chunks").await.unwrap()["settings"].clone();
        assert_eq!(settings["number_of_replicas"], 1);
        assert_eq!(settings["refresh_interval"], "1s");
    }

    #[tokio::test]
    async fn test_admin_prefers_title_matches() {
        let engine = Arc::new(InMemoryEngine::new());
        let index = facade(engine);
        let mut batch = chunks("roadmap", "Roadmap", &["plans for next year"]);
        batch.extend(chunks("notes", "Meeting notes", &["we discussed the roadmap briefly"]));
        index.index(&batch, &fresh(&["roadmap", "notes"])).await.unwrap();

        let results = index
            .admin_retrieval("Roadmap", &IndexFilters::default(), 10)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document_id, "roadmap");
        assert_eq!(results[0].content, "plans for next year");
    }

    #[tokio::test]
    async fn test_hidden_documents_only_in_id_and_admin_retrieval() {
        let engine = Arc::new(InMemoryEngine::new());
        let index = facade(engine);
        let mut batch = chunks("secret", "Secret plan", &["hidden text"]);
        batch[0].hidden = true;
        index.index(&batch, &fresh(&["secret"])).await.unwrap();

        let random = index.random_retrieval(&IndexFilters::default(), 10).await.unwrap();
        assert!(random.is_empty());

        let by_id = index
            .id_based_retrieval(&[ChunkRequest::whole("secret")], &IndexFilters::default(), false, false)
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].content, "hidden text");
        assert!(by_id[0].score.is_none());

        let admin = index
            .admin_retrieval("secret", &IndexFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(admin.len(), 1);
    }

    #[tokio::test]
    async fn test_update_then_filter_by_document_set() {
        let engine = Arc::new(InMemoryEngine::new());
        let index = facade(engine);
        index
            .index(&chunks("doc", "Doc", &["one", "two"]), &fresh(&["doc"]))
            .await
            .unwrap();

        let fields = DocumentFieldUpdate {
            document_sets: Some(["finance".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert_eq!(index.update_single("doc", Some(2), &fields).await.unwrap(), 2);

        let filters = IndexFilters {
            document_set: Some(vec!["finance".into()]),
            ..Default::default()
        };
        let results = index.random_retrieval(&filters, 10).await.unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(index.delete_single("doc", None).await.unwrap(), 2);
        assert!(index.random_retrieval(&filters, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tag_filter_applies_to_hybrid() {
        let engine = Arc::new(InMemoryEngine::new());
        let index = facade(engine);
        let mut tagged = chunks("tagged", "Quarterly report", &["revenue grew"]);
        let mut doc = (*tagged[0].source_document).clone();
        doc.metadata.insert("region".into(), "emea".into());
        tagged[0].source_document = Arc::new(doc);
        let mut batch = tagged;
        batch.extend(chunks("plain", "Annual report", &["revenue fell"]));
        index.index(&batch, &fresh(&["tagged", "plain"])).await.unwrap();

        let mut query = HybridQuery::new("revenue", vec![1.0, 0.0], 10);
        query.filters.tags = Some(vec![Tag::new("Region", "EMEA")]);
        let results = index.hybrid_retrieval(&query).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "tagged");
        assert!(results[0].score.is_some());
    }

    #[tokio::test]
    async fn test_empty_requests_skip_the_engine() {
        let engine = Arc::new(InMemoryEngine::new());
        let index = facade(engine.clone());
        index.ensure_indices_exist().await.unwrap();
        index.index(&chunks("doc", "Doc", &["content"]), &fresh(&["doc"])).await.unwrap();

        let query = HybridQuery::new("content", vec![1.0, 0.0], 0);
        assert!(index.hybrid_retrieval(&query).await.unwrap().is_empty());
        let results = index
            .id_based_retrieval(&[], &IndexFilters::default(), true, false)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(engine.search_count(), 0);
    }
}
