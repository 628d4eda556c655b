//! Elasticsearch REST client

use super::{engine_error, BulkAction, BulkResponse, ClusterHealth, SearchEngine, SearchResponse};
use async_trait::async_trait;
use docindex_common::config::ElasticsearchConfig;
use docindex_common::errors::{IndexError, Result};
use docindex_common::metrics::record_bulk;
use reqwest::{header, Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Search engine client speaking the Elasticsearch REST API
#[derive(Clone)]
pub struct ElasticsearchClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ElasticsearchClient {
    /// Build a client with the configured timeout and credentials
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        Self::build(config, Some(Duration::from_secs(config.request_timeout_secs)))
    }

    /// Client without a request timeout, used for readiness probing
    pub fn without_timeout(config: &ElasticsearchConfig) -> Result<Self> {
        Self::build(config, None)
    }

    fn build(config: &ElasticsearchConfig, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().danger_accept_invalid_certs(!config.managed);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            request = request.header(header::AUTHORIZATION, format!("ApiKey {}", api_key));
        }
        request
    }

    /// Send a request and decode a JSON body, failing on non-success status
    async fn send_json(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(engine_error(status.as_u16(), &body));
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// HEAD request mapped to existence
    async fn exists(&self, path: &str) -> Result<bool> {
        let response = self.request(Method::HEAD, path).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(IndexError::engine(
                status.as_u16(),
                format!("unexpected status for HEAD {}", path),
            )),
        }
    }
}

#[async_trait]
impl SearchEngine for ElasticsearchClient {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.exists(index).await
    }

    #[instrument(skip(self, body))]
    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        self.send_json(self.request(Method::PUT, index).json(body))
            .await?;
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value> {
        let body = self
            .send_json(self.request(Method::GET, &format!("{}/_mapping", index)))
            .await?;
        Ok(body
            .get(index)
            .and_then(|mapping| mapping.pointer("/mappings/properties"))
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())))
    }

    async fn put_settings(&self, index: &str, settings: &Value) -> Result<()> {
        let body = serde_json::json!({ "index": settings });
        self.send_json(
            self.request(Method::PUT, &format!("{}/_settings", index))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn document_exists(&self, index: &str, id: &str) -> Result<bool> {
        self.exists(&format!("{}/_doc/{}", index, id)).await
    }

    #[instrument(skip(self, actions), fields(actions = actions.len()))]
    async fn bulk(&self, actions: Vec<BulkAction>, refresh: bool) -> Result<BulkResponse> {
        if actions.is_empty() {
            return Ok(BulkResponse::default());
        }

        let operation = actions[0].op().as_str();
        let mut body = String::new();
        for action in &actions {
            action.write_ndjson(&mut body)?;
        }

        let start = Instant::now();
        let request = self
            .request(Method::POST, "_bulk")
            .query(&[("refresh", if refresh { "true" } else { "false" })])
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = BulkResponse::from_json(&self.send_json(request).await?);

        let failed = response.failures().count();
        record_bulk(
            start.elapsed().as_secs_f64(),
            operation,
            response.items.len() - failed,
            failed,
        );
        debug!(items = response.items.len(), failed, "Bulk request complete");
        Ok(response)
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        let response = self
            .send_json(
                self.request(Method::POST, &format!("{}/_search", index))
                    .json(body),
            )
            .await?;
        SearchResponse::from_json(&response)
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        self.send_json(self.request(Method::POST, &format!("{}/_refresh", index)))
            .await?;
        Ok(())
    }

    async fn cluster_health(&self, index: Option<&str>) -> Result<ClusterHealth> {
        let request = match index {
            Some(index) => self
                .request(Method::GET, &format!("_cluster/health/{}", index))
                .query(&[("wait_for_status", "yellow"), ("timeout", "5s")]),
            None => self.request(Method::GET, "_cluster/health"),
        };
        Ok(serde_json::from_value(self.send_json(request).await?)?)
    }
}
