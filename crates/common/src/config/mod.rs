//! Configuration management for docindex
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::errors::{IndexError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// Search engine connection
    #[serde(default)]
    #[validate(nested)]
    pub elasticsearch: ElasticsearchConfig,

    /// Index layout and indexing behaviour
    #[serde(default)]
    #[validate(nested)]
    pub index: IndexConfig,

    /// Retrieval tuning
    #[serde(default)]
    #[validate(nested)]
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ElasticsearchConfig {
    /// Cluster URL
    #[serde(default = "default_es_url")]
    #[validate(length(min = 1))]
    pub url: String,

    /// API key sent as `Authorization: ApiKey ...`
    pub api_key: Option<String>,

    /// Managed clusters get full certificate verification
    #[serde(default)]
    pub managed: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// Seconds between readiness probes
    #[serde(default = "default_wait_interval")]
    pub readiness_wait_interval_secs: u64,

    /// Give up on readiness after this many seconds
    #[serde(default = "default_wait_limit")]
    pub readiness_wait_limit_secs: u64,
}

/// One physical index
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct IndexTarget {
    /// Index name
    #[validate(length(min = 1))]
    pub name: String,

    /// Embedding dimension stored in the dense_vector mapping
    #[validate(range(min = 1))]
    pub dimension: usize,

    /// Whether large (multi-chunk) windows are written to this index
    #[serde(default)]
    pub large_chunks_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct IndexConfig {
    /// Backend selector; only "elasticsearch" is implemented here
    #[serde(default = "default_index_type")]
    pub index_type: String,

    /// Index used for queries and writes
    #[serde(default = "default_primary_index")]
    #[validate(nested)]
    pub primary: IndexTarget,

    /// Index receiving updates during an online re-embedding migration
    #[validate(nested)]
    pub secondary: Option<IndexTarget>,

    /// Multi-tenant deployments store and filter on tenant_id
    #[serde(default)]
    pub multitenant: bool,

    /// Chunks per bulk request
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Weight of the title field relative to content in keyword matching
    #[serde(default = "default_title_content_ratio")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub title_content_ratio: f64,

    /// Characters of the title used to detect a truncated title prefix
    #[serde(default = "default_blurb_size")]
    #[validate(range(min = 1))]
    pub blurb_size: usize,

    #[serde(default = "default_shards")]
    pub number_of_shards: u32,

    #[serde(default = "default_replicas")]
    pub number_of_replicas: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RetrievalConfig {
    /// Attempts for read requests (search, existence checks)
    #[serde(default = "default_retry_attempts")]
    #[validate(range(min = 1))]
    pub read_retry_attempts: u32,

    /// First backoff interval in milliseconds, doubled per attempt
    #[serde(default = "default_retry_interval")]
    pub retry_initial_interval_ms: u64,

    /// Tag keys OR'd with each other instead of AND'd
    #[serde(default = "default_or_logic_tag_keys")]
    pub or_logic_tag_keys: Vec<String>,

    /// Tag keys whose values are matched verbatim (no lowercasing)
    #[serde(default = "default_verbatim_tag_keys")]
    pub verbatim_tag_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error) or a full EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_es_url() -> String { "http://localhost:9200".to_string() }
fn default_request_timeout() -> u64 { 120 }
fn default_wait_interval() -> u64 { 5 }
fn default_wait_limit() -> u64 { 60 }
fn default_index_type() -> String { "elasticsearch".to_string() }
fn default_primary_index() -> IndexTarget {
    IndexTarget {
        name: "danswer_chunk".to_string(),
        dimension: crate::DEFAULT_EMBEDDING_DIMENSION,
        large_chunks_enabled: false,
    }
}
fn default_batch_size() -> usize { 128 }
fn default_title_content_ratio() -> f64 { 0.3 }
fn default_blurb_size() -> usize { 128 }
fn default_shards() -> u32 { 3 }
fn default_replicas() -> u32 { 1 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_interval() -> u64 { 1000 }
fn default_or_logic_tag_keys() -> Vec<String> {
    vec!["transaction".to_string(), "follow_up".to_string()]
}
fn default_verbatim_tag_keys() -> Vec<String> { vec!["Fund".to_string()] }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "docindex".to_string() }

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_es_url(),
            api_key: None,
            managed: false,
            request_timeout_secs: default_request_timeout(),
            readiness_wait_interval_secs: default_wait_interval(),
            readiness_wait_limit_secs: default_wait_limit(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_type: default_index_type(),
            primary: default_primary_index(),
            secondary: None,
            multitenant: false,
            batch_size: default_batch_size(),
            title_content_ratio: default_title_content_ratio(),
            blurb_size: default_blurb_size(),
            number_of_shards: default_shards(),
            number_of_replicas: default_replicas(),
        }
    }
}

impl IndexConfig {
    /// Primary index followed by the secondary one, if any
    pub fn targets(&self) -> Vec<&IndexTarget> {
        std::iter::once(&self.primary)
            .chain(self.secondary.as_ref())
            .collect()
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            read_retry_attempts: default_retry_attempts(),
            retry_initial_interval_ms: default_retry_interval(),
            or_logic_tag_keys: default_or_logic_tag_keys(),
            verbatim_tag_keys: default_verbatim_tag_keys(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            elasticsearch: ElasticsearchConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__INDEX__PRIMARY__DIMENSION=1024
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Validate field ranges and cross-field rules
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if let Some(secondary) = &self.index.secondary {
            if secondary.name == self.index.primary.name {
                return Err(IndexError::configuration(format!(
                    "secondary index must differ from primary index '{}'",
                    secondary.name
                )));
            }
        }
        Ok(())
    }

    /// Every configured index, primary first
    pub fn index_targets(&self) -> Vec<&IndexTarget> {
        self.index.targets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.elasticsearch.request_timeout_secs, 120);
        assert_eq!(config.index.title_content_ratio, 0.3);
        assert_eq!(config.retrieval.read_retry_attempts, 3);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut config = AppConfig::default();
        config.index.primary.dimension = 0;
        let err = config.check().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_secondary_must_differ() {
        let mut config = AppConfig::default();
        config.index.secondary = Some(config.index.primary.clone());
        assert!(config.check().is_err());

        config.index.secondary = Some(IndexTarget {
            name: "danswer_chunk_next".into(),
            dimension: 1024,
            large_chunks_enabled: true,
        });
        assert!(config.check().is_ok());
        assert_eq!(config.index_targets().len(), 2);
    }

    #[test]
    fn test_ratio_out_of_range() {
        let mut config = AppConfig::default();
        config.index.title_content_ratio = 1.5;
        assert!(config.check().is_err());
    }
}
