//! Search request bodies for each retrieval mode

use crate::constants::*;
use docindex_common::models::{HybridQuery, QueryExpansionType};
use serde_json::{json, Value};

/// RRF tuning for one query-expansion type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingProfile {
    pub rank_constant: usize,
    pub num_candidates: usize,
}

impl RankingProfile {
    /// Keyword queries trust the top of each list; semantic queries cast a
    /// wider net.
    pub fn for_expansion(expansion: QueryExpansionType, window: usize) -> Self {
        let (rank_constant, num_candidates) = match expansion {
            QueryExpansionType::Keyword => (20, (5 * window).max(50)),
            QueryExpansionType::Semantic => (60, (20 * window).max(200)),
        };
        Self {
            rank_constant,
            num_candidates: num_candidates.min(MAX_NUM_CANDIDATES),
        }
    }
}

fn source_excludes() -> Value {
    json!({"excludes": [EMBEDDINGS, TITLE_EMBEDDING]})
}

/// Sigmoid of the feedback boost: 1.0 at zero, up to 2.0 for positive
/// boosts and down to 0.5 for negative ones
fn boost_script() -> Value {
    json!({
        "source": format!(
            "double boost = doc.containsKey('{field}') && !doc['{field}'].empty ? doc['{field}'].value : 0.0; \
             if (boost < 0) {{ return 0.5 + (1.0 / (1.0 + Math.exp(-boost / 3.0))); }} \
             return 2.0 / (1.0 + Math.exp(-boost / 3.0));",
            field = BOOST
        )
    })
}

/// Recency decay by document age in years, floored
fn recency_script(decay_factor: f64) -> Value {
    json!({
        "source": format!(
            "long now = System.currentTimeMillis() / 1000; \
             long docTime = doc.containsKey('{field}') && !doc['{field}'].empty \
                 ? doc['{field}'].value.toInstant().toEpochMilli() / 1000 \
                 : now - params.default_age; \
             double ageYears = Math.max((now - docTime) / 31536000.0, 0); \
             return Math.max(1.0 / (1.0 + params.decay_factor * ageYears), params.floor);",
            field = DOC_UPDATED_AT
        ),
        "params": {
            "decay_factor": decay_factor,
            "floor": RECENCY_FLOOR,
            "default_age": DEFAULT_DOC_AGE_SECS,
        }
    })
}

/// Keyword leg of hybrid retrieval: weighted title/content match shaped by
/// feedback boost and recency
pub fn keyword_leg(query: &HybridQuery, filters: &[Value], title_content_ratio: f64) -> Value {
    let title_weight = title_content_ratio.clamp(0.0, 1.0);
    json!({
        "function_score": {
            "query": {
                "bool": {
                    "must": [{
                        "multi_match": {
                            "query": query.keyword_text(),
                            "fields": [
                                format!("{}^{}", TITLE, title_weight),
                                format!("{}^{}", CONTENT, 1.0 - title_weight),
                            ],
                        }
                    }],
                    "filter": filters,
                }
            },
            "functions": [
                {"script_score": {"script": boost_script()}},
                {"script_score": {"script": recency_script(DOC_TIME_DECAY * query.time_decay_multiplier)}},
            ],
            "score_mode": "multiply",
            "boost_mode": "multiply",
        }
    })
}

/// Hybrid retrieval: keyword leg fused with k-NN through RRF
pub fn hybrid_search_body(query: &HybridQuery, filters: &[Value], title_content_ratio: f64) -> Value {
    let window = query.num_to_retrieve + query.offset;
    let profile = RankingProfile::for_expansion(query.ranking_profile_type, window);

    json!({
        "retriever": {
            "rrf": {
                "retrievers": [
                    {"standard": {"query": keyword_leg(query, filters, title_content_ratio)}},
                    {"knn": {
                        "field": EMBEDDINGS,
                        "query_vector": query.query_embedding,
                        "k": window.min(profile.num_candidates),
                        "num_candidates": profile.num_candidates,
                        "filter": filters,
                    }},
                ],
                "rank_constant": profile.rank_constant,
                "rank_window_size": window,
            }
        },
        "size": query.num_to_retrieve,
        "from": query.offset,
        "_source": source_excludes(),
    })
}

/// Admin search: descending boost ladder from exact title to fuzzy title
pub fn admin_search_body(query: &str, filters: &[Value], num_to_retrieve: usize) -> Value {
    json!({
        "query": {
            "bool": {
                "should": [
                    {"term": {TITLE_KEYWORD: {"value": query, "boost": 10.0}}},
                    {"match_phrase": {TITLE: {"query": query, "boost": 7.0}}},
                    {"match": {TITLE: {"query": query, "boost": 5.0}}},
                    {"match_phrase": {CONTENT: {"query": query, "boost": 3.0}}},
                    {"match": {CONTENT: query}},
                    {"match": {CONTENT_SUMMARY: query}},
                    {"fuzzy": {TITLE: {"value": query, "boost": 2.0, "fuzziness": "AUTO"}}},
                ],
                "filter": filters,
                "minimum_should_match": 1,
            }
        },
        "size": num_to_retrieve,
        "_source": source_excludes(),
    })
}

/// Random sample ordered by the engine
pub fn random_search_body(filters: &[Value], num_to_retrieve: usize) -> Value {
    json!({
        "query": {
            "function_score": {
                "query": {"bool": {"must": {"match_all": {}}, "filter": filters}},
                "random_score": {},
                "boost_mode": "replace",
            }
        },
        "size": num_to_retrieve,
        "_source": source_excludes(),
    })
}

/// Chunks of the given documents.
///
/// Large chunks are excluded unless requested.
pub fn id_search_body(document_ids: &[&str], filters: &[Value], include_large_chunks: bool) -> Value {
    let document_clause = match document_ids {
        [single] => json!({"term": {DOCUMENT_ID: single}}),
        many => json!({"terms": {DOCUMENT_ID: many}}),
    };
    let must_not: Vec<Value> = if include_large_chunks {
        Vec::new()
    } else {
        vec![json!({"exists": {"field": LARGE_CHUNK_REFERENCE_IDS}})]
    };

    json!({
        "query": {
            "bool": {
                "must": [document_clause],
                "filter": filters,
                "must_not": must_not,
            }
        },
        "size": MAX_ID_SEARCH_HITS,
        "_source": source_excludes(),
    })
}
