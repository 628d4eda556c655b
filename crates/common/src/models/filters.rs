//! Retrieval filter value objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A metadata tag predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_key: String,
    pub tag_value: String,
}

impl Tag {
    pub fn new(tag_key: impl Into<String>, tag_value: impl Into<String>) -> Self {
        Self {
            tag_key: tag_key.into(),
            tag_value: tag_value.into(),
        }
    }
}

/// Structured filters applied to every retrieval mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexFilters {
    /// Allowed source types (OR'd)
    #[serde(default)]
    pub source_type: Option<Vec<String>>,
    /// Allowed document sets (OR'd)
    #[serde(default)]
    pub document_set: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<Tag>>,
    /// ACL entries of the requesting principal, computed upstream
    #[serde(default)]
    pub access_control_list: Option<Vec<String>>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Only documents updated at or after this instant
    #[serde(default)]
    pub time_cutoff: Option<DateTime<Utc>>,
}

impl IndexFilters {
    /// Filters scoped to a single tenant and nothing else
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Default::default()
        }
    }
}
