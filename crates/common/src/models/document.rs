//! Source documents as handed over by connectors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Separator between a metadata key and value in flattened metadata strings
pub const METADATA_KEY_VALUE_SEPARATOR: &str = "===";

/// Metadata value: a single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Single(String),
    List(Vec<String>),
}

impl MetadataValue {
    /// Iterate over the contained values regardless of shape
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            MetadataValue::Single(value) => std::slice::from_ref(value),
            MetadataValue::List(values) => values.as_slice(),
        };
        slice.iter().map(String::as_str)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Single(value.to_string())
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(values: Vec<String>) -> Self {
        MetadataValue::List(values)
    }
}

/// A normalized document produced by the connector layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier (often a URL)
    pub id: String,
    /// Human readable identifier shown in results
    pub semantic_identifier: String,
    /// Explicit title; falls back to the semantic identifier when absent
    #[serde(default)]
    pub title: Option<String>,
    /// Connector source tag, e.g. "confluence"
    pub source_type: String,
    /// Last update time reported by the source
    #[serde(default)]
    pub doc_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub primary_owners: Vec<String>,
    #[serde(default)]
    pub secondary_owners: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Document {
    /// Minimal document with an id, semantic identifier and source
    pub fn new(
        id: impl Into<String>,
        semantic_identifier: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            semantic_identifier: semantic_identifier.into(),
            title: None,
            source_type: source_type.into(),
            doc_updated_at: None,
            primary_owners: Vec::new(),
            secondary_owners: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Title stored in the index and used for content enrichment.
    ///
    /// An empty string means the document has no title.
    pub fn title_for_index(&self) -> &str {
        match &self.title {
            Some(title) => title.as_str(),
            None => self.semantic_identifier.as_str(),
        }
    }

    /// Flatten metadata into `key===value` strings, one per value
    pub fn metadata_list(&self) -> Vec<String> {
        self.metadata
            .iter()
            .flat_map(|(key, value)| {
                value
                    .values()
                    .map(move |v| format!("{}{}{}", key, METADATA_KEY_VALUE_SEPARATOR, v))
            })
            .collect()
    }
}

/// Access information computed upstream and propagated as-is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAccess {
    #[serde(default)]
    pub user_emails: BTreeSet<String>,
    #[serde(default)]
    pub user_groups: BTreeSet<String>,
    #[serde(default)]
    pub external_user_emails: BTreeSet<String>,
    #[serde(default)]
    pub external_user_group_ids: BTreeSet<String>,
    #[serde(default)]
    pub is_public: bool,
}

impl DocumentAccess {
    /// Public access with no named principals
    pub fn public() -> Self {
        Self {
            is_public: true,
            ..Default::default()
        }
    }

    /// ACL entries as stored in the `access_control_list` field
    pub fn to_acl(&self) -> BTreeSet<String> {
        let mut acl = BTreeSet::new();
        if self.is_public {
            acl.insert("PUBLIC".to_string());
        }
        for email in self.user_emails.iter().chain(&self.external_user_emails) {
            acl.insert(format!("user_email:{}", email));
        }
        for group in &self.user_groups {
            acl.insert(format!("group:{}", group));
        }
        for group in &self.external_user_group_ids {
            acl.insert(format!("external_group:{}", group));
        }
        acl
    }
}
