//! Index mappings, settings, and schema drift detection

use crate::constants::*;
use docindex_common::config::IndexConfig;
use serde_json::{json, Value};

/// Field mappings for a chunk index
pub fn document_mappings(vector_dimension: usize, multitenant: bool) -> Value {
    let dense_vector = json!({
        "type": "dense_vector",
        "dims": vector_dimension,
        "index": true,
        "similarity": "cosine",
    });
    let nested_weighted = json!({
        "type": "nested",
        "properties": {
            NESTED_VALUE: {"type": "keyword"},
            "weight": {"type": "integer"},
        },
    });

    let mut mappings = json!({
        "properties": {
            // Core fields
            TENANT_ID: {"type": "keyword"},
            DOCUMENT_ID: {"type": "keyword"},
            CHUNK_ID: {"type": "integer"},
            BLURB: {"type": "text"},
            CONTENT: {"type": "text"},
            SOURCE_TYPE: {"type": "keyword"},
            SOURCE_LINKS: {"type": "object", "enabled": false},
            SEMANTIC_IDENTIFIER: {"type": "text"},
            TITLE: {
                "type": "text",
                "fields": {"keyword": {"type": "keyword", "ignore_above": 256}},
            },
            SECTION_CONTINUATION: {"type": "boolean"},
            // Vectors
            EMBEDDINGS: dense_vector.clone(),
            TITLE_EMBEDDING: dense_vector,
            SKIP_TITLE_EMBEDDING: {"type": "boolean"},
            // Access and visibility
            ACCESS_CONTROL_LIST: nested_weighted.clone(),
            DOCUMENT_SETS: nested_weighted,
            HIDDEN: {"type": "boolean"},
            // Relationships and metadata
            LARGE_CHUNK_REFERENCE_IDS: {"type": "integer"},
            METADATA: {"type": "object"},
            METADATA_LIST: {"type": "keyword"},
            METADATA_SUFFIX: {"type": "keyword"},
            // Ranking
            BOOST: {"type": "float"},
            RECENCY_BIAS: {"type": "float"},
            DOC_UPDATED_AT: {"type": "date", "format": "epoch_second"},
            // Ownership
            PRIMARY_OWNERS: {"type": "keyword"},
            SECONDARY_OWNERS: {"type": "keyword"},
            // Display
            CONTENT_SUMMARY: {"type": "text"},
            IMAGE_FILE_NAME: {"type": "keyword"},
            // Contextual enrichment
            DOC_SUMMARY: {"type": "text"},
            CHUNK_CONTEXT: {"type": "text"},
        }
    });

    if !multitenant {
        if let Some(properties) = mappings["properties"].as_object_mut() {
            properties.remove(TENANT_ID);
        }
    }
    mappings
}

/// Standard settings for serving traffic
pub fn index_settings(config: &IndexConfig) -> Value {
    json!({
        "number_of_shards": config.number_of_shards,
        "number_of_replicas": config.number_of_replicas,
        "analysis": {"analyzer": {"default": {"type": "standard"}}},
    })
}

/// Settings for an initial bulk load: no replicas, no periodic refresh.
///
/// Only dynamic settings, so the body can be applied to an open index.
/// Restore replicas and refresh once the load completes.
pub fn bulk_index_settings() -> Value {
    json!({
        "number_of_replicas": 0,
        "refresh_interval": "-1",
    })
}

/// Create-index request body
pub fn index_body(config: &IndexConfig, vector_dimension: usize) -> Value {
    json!({
        "settings": index_settings(config),
        "mappings": document_mappings(vector_dimension, config.multitenant),
    })
}

/// Compare an index's actual field mapping against the expected one.
///
/// Returns one message per missing field, type mismatch, or vector
/// dimension mismatch. An empty list means the schema matches.
pub fn validate_index_schema(actual_properties: &Value, expected_mappings: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(expected) = expected_mappings
        .get("properties")
        .and_then(Value::as_object)
    else {
        return errors;
    };

    for (field, expected_config) in expected {
        let Some(actual_config) = actual_properties.get(field) else {
            errors.push(format!("Missing field: {}", field));
            continue;
        };

        // Object mappings come back without an explicit type
        let expected_type = expected_config.get("type").and_then(Value::as_str);
        let actual_type = actual_config
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| actual_config.get("properties").map(|_| "object"));

        if let Some(expected_type) = expected_type {
            if actual_type != Some(expected_type) {
                errors.push(format!(
                    "Field '{}' type mismatch: expected '{}', got '{}'",
                    field,
                    expected_type,
                    actual_type.unwrap_or("none")
                ));
                continue;
            }
        }

        if expected_type == Some("dense_vector") {
            let expected_dims = expected_config.get("dims").and_then(Value::as_u64);
            let actual_dims = actual_config.get("dims").and_then(Value::as_u64);
            if expected_dims.is_some() && actual_dims != expected_dims {
                errors.push(format!(
                    "Field '{}' dimensions mismatch: expected {}, got {}",
                    field,
                    expected_dims.unwrap_or_default(),
                    actual_dims.map(|d| d.to_string()).unwrap_or_else(|| "none".into())
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_injected() {
        let mappings = document_mappings(384, true);
        assert_eq!(mappings["properties"][EMBEDDINGS]["dims"], 384);
        assert_eq!(mappings["properties"][TITLE_EMBEDDING]["dims"], 384);
        assert_eq!(mappings["properties"][TENANT_ID]["type"], "keyword");
    }

    #[test]
    fn test_tenant_field_dropped_when_single_tenant() {
        let mappings = document_mappings(384, false);
        assert!(mappings["properties"].get(TENANT_ID).is_none());
    }

    #[test]
    fn test_bulk_settings() {
        let config = IndexConfig::default();
        let settings = bulk_index_settings();
        assert_eq!(settings["number_of_replicas"], 0);
        assert_eq!(settings["refresh_interval"], "-1");
        assert!(settings.get("number_of_shards").is_none());
        assert!(settings.get("analysis").is_none());
        assert_eq!(index_settings(&config)["number_of_replicas"], 1);
    }

    #[test]
    fn test_validate_matching_schema() {
        let expected = document_mappings(768, false);
        let actual = expected["properties"].clone();
        assert!(validate_index_schema(&actual, &expected).is_empty());
    }

    #[test]
    fn test_validate_reports_drift() {
        let expected = document_mappings(768, false);
        let mut actual = expected["properties"].clone();
        let properties = actual.as_object_mut().unwrap();
        properties.remove(HIDDEN);
        properties.insert(BOOST.into(), json!({"type": "keyword"}));
        properties.insert(EMBEDDINGS.into(), json!({"type": "dense_vector", "dims": 384}));

        let errors = validate_index_schema(&actual, &expected);
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&"Missing field: hidden".to_string()));
        assert!(errors.iter().any(|e| e.contains("'boost' type mismatch")));
        assert!(errors.iter().any(|e| e.contains("expected 768, got 384")));
    }
}
