//! Filter Builder
//!
//! Translates [`IndexFilters`] into engine filter clauses. Clauses are
//! conjunctive; OR semantics live inside `bool.should` groups:
//! - source types form one OR group
//! - designated tag keys share one OR group across keys
//! - every other tag key is its own AND'd group, OR'd within its values
//! - a `min_year` tag expands to every year through the current one

use crate::constants::*;
use chrono::{Datelike, Utc};
use docindex_common::config::RetrievalConfig;
use docindex_common::models::IndexFilters;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Builds filter clauses for one deployment's tag conventions
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    multitenant: bool,
    or_logic_tag_keys: Vec<String>,
    verbatim_tag_keys: Vec<String>,
    /// Fixed "current year" for reproducible year expansion
    current_year: Option<i32>,
}

impl FilterBuilder {
    pub fn new(multitenant: bool, config: &RetrievalConfig) -> Self {
        Self {
            multitenant,
            or_logic_tag_keys: config.or_logic_tag_keys.clone(),
            verbatim_tag_keys: config.verbatim_tag_keys.clone(),
            current_year: None,
        }
    }

    /// Pin the year used to close `min_year` ranges
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }

    fn current_year(&self) -> i32 {
        self.current_year.unwrap_or_else(|| Utc::now().year())
    }

    /// Build the ordered filter clause list
    pub fn build(&self, filters: &IndexFilters, include_hidden: bool) -> Vec<Value> {
        let mut clauses = Vec::new();

        if !include_hidden {
            clauses.push(json!({"term": {HIDDEN: false}}));
        }

        if self.multitenant {
            if let Some(tenant_id) = &filters.tenant_id {
                clauses.push(json!({"term": {TENANT_ID: tenant_id}}));
            }
        }

        if let Some(sources) = filters.source_type.as_ref().filter(|s| !s.is_empty()) {
            let should: Vec<Value> = sources
                .iter()
                .map(|source| json!({"term": {SOURCE_TYPE: source}}))
                .collect();
            clauses.push(json!({"bool": {"should": should, "minimum_should_match": 1}}));
        }

        if let Some(document_sets) = filters.document_set.as_ref().filter(|s| !s.is_empty()) {
            clauses.push(nested_terms(DOCUMENT_SETS, document_sets));
        }

        if let Some(acl) = &filters.access_control_list {
            // An empty ACL must match nothing rather than everything
            clauses.push(nested_terms(ACCESS_CONTROL_LIST, acl));
        }

        if let Some(cutoff) = filters.time_cutoff {
            clauses.push(json!({
                "range": {DOC_UPDATED_AT: {"gte": cutoff.timestamp(), "format": "epoch_second"}}
            }));
        }

        if let Some(tags) = filters.tags.as_ref().filter(|t| !t.is_empty()) {
            debug!(tags = ?tags, "Building tag filters");
            self.push_tag_clauses(tags, &mut clauses);
        }

        clauses
    }

    fn push_tag_clauses(&self, tags: &[docindex_common::models::Tag], clauses: &mut Vec<Value>) {
        // Keep first-seen key order so clause order is stable
        let mut key_order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for tag in tags {
            let mut key = normalize_tag_key(&tag.tag_key);
            if key == MIN_YEAR {
                key = YEAR.to_string();
            }
            let value = if self.verbatim_tag_keys.iter().any(|k| k == &tag.tag_key) {
                tag.tag_value.clone()
            } else {
                normalize_tag_value(&tag.tag_value)
            };

            if !groups.contains_key(&key) {
                key_order.push(key.clone());
            }
            groups.entry(key).or_default().push(value);
        }

        if let Some(years) = groups.get_mut(YEAR) {
            match expand_years(years, self.current_year()) {
                Some(expanded) => {
                    debug!(years = ?expanded, "Expanded minimum year range");
                    *years = expanded;
                }
                None => warn!(values = ?years, "Non-numeric year tag, matching values as given"),
            }
        }

        let mut or_group = Vec::new();
        for key in &self.or_logic_tag_keys {
            if let Some(values) = groups.remove(key) {
                or_group.push(metadata_clause(key, &values));
            }
        }
        if !or_group.is_empty() {
            clauses.push(json!({"bool": {"should": or_group, "minimum_should_match": 1}}));
        }

        for key in key_order {
            if let Some(values) = groups.remove(&key) {
                clauses.push(metadata_clause(&key, &values));
            }
        }
    }
}

fn nested_terms(path: &str, values: &[String]) -> Value {
    json!({
        "nested": {
            "path": path,
            "query": {"terms": {format!("{}.{}", path, NESTED_VALUE): values}}
        }
    })
}

fn metadata_clause(key: &str, values: &[String]) -> Value {
    let field = format!("{}.{}.keyword", METADATA, key);
    match values {
        [single] => json!({"term": {field: single}}),
        _ => json!({"terms": {field: values}}),
    }
}

/// Spaces become underscores, then lowercase
pub fn normalize_tag_key(key: &str) -> String {
    key.replace(' ', "_").to_lowercase()
}

/// Spaces removed, then lowercase
pub fn normalize_tag_value(value: &str) -> String {
    value.replace(' ', "").to_lowercase()
}

/// Every year from the smallest selected year through `current_year`
pub fn expand_years(selected: &[String], current_year: i32) -> Option<Vec<String>> {
    let years: Vec<i32> = selected
        .iter()
        .map(|year| year.trim().parse::<i32>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    let min_year = years.into_iter().min()?;
    Some((min_year..=current_year).map(|year| year.to_string()).collect())
}
