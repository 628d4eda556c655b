//! In-process search engine for tests and local development
//!
//! Stores documents per index in memory and evaluates the subset of the
//! query DSL the adapter emits:
//! - `bool`, `term`, `terms`, `range`, `exists`, `nested`
//! - `match`, `multi_match`, `match_phrase`, `fuzzy` (token overlap scoring)
//! - `function_score` (`random_score` honored, scripted functions neutral)
//! - `retriever.rrf` over `standard` and `knn` legs

use super::{BulkAction, BulkItem, BulkResponse, ClusterHealth, SearchEngine, SearchHit, SearchResponse};
use async_trait::async_trait;
use docindex_common::errors::{IndexError, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::RwLock;

const DEFAULT_SEARCH_SIZE: usize = 10;
const DEFAULT_RANK_CONSTANT: f64 = 60.0;
/// Index settings that only apply at creation or on a closed index
const STATIC_SETTINGS: &[&str] = &["number_of_shards", "number_of_routing_shards", "analysis", "codec"];

#[derive(Debug, Default)]
struct MemoryIndex {
    body: Value,
    docs: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct State {
    indices: HashMap<String, MemoryIndex>,
    rejected_search_pattern: Option<String>,
    bulk_failure_after: Option<usize>,
}

/// Deterministic in-memory [`SearchEngine`]
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    state: RwLock<State>,
    searches: AtomicUsize,
    existence_checks: AtomicUsize,
    bulk_requests: AtomicUsize,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every search whose serialized body contains `pattern`
    pub async fn reject_searches_containing(&self, pattern: impl Into<String>) {
        self.state.write().await.rejected_search_pattern = Some(pattern.into());
    }

    /// Fail every bulk request after the first `accepted` ones
    pub async fn fail_bulk_after(&self, accepted: usize) {
        self.state.write().await.bulk_failure_after = Some(accepted);
    }

    /// Stored source of a document
    pub async fn document(&self, index: &str, id: &str) -> Option<Value> {
        let state = self.state.read().await;
        state.indices.get(index)?.docs.get(id).cloned()
    }

    /// Number of documents stored in an index
    pub async fn document_count(&self, index: &str) -> usize {
        let state = self.state.read().await;
        state.indices.get(index).map(|idx| idx.docs.len()).unwrap_or(0)
    }

    /// Settings and mappings an index was created with
    pub async fn index_body(&self, index: &str) -> Option<Value> {
        let state = self.state.read().await;
        state.indices.get(index).map(|idx| idx.body.clone())
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(AtomicOrdering::SeqCst)
    }

    pub fn existence_check_count(&self) -> usize {
        self.existence_checks.load(AtomicOrdering::SeqCst)
    }

    pub fn bulk_request_count(&self) -> usize {
        self.bulk_requests.load(AtomicOrdering::SeqCst)
    }
}

fn index_not_found(index: &str) -> IndexError {
    IndexError::engine(404, format!("index_not_found_exception: no such index [{}]", index))
}

#[async_trait]
impl SearchEngine for InMemoryEngine {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.state.read().await.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let mut state = self.state.write().await;
        if state.indices.contains_key(index) {
            return Err(IndexError::engine(
                400,
                format!("resource_already_exists_exception: index [{}] already exists", index),
            ));
        }
        state.indices.insert(
            index.to_string(),
            MemoryIndex {
                body: body.clone(),
                docs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<Value> {
        let state = self.state.read().await;
        let idx = state.indices.get(index).ok_or_else(|| index_not_found(index))?;
        Ok(idx
            .body
            .pointer("/mappings/properties")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    async fn put_settings(&self, index: &str, settings: &Value) -> Result<()> {
        let mut state = self.state.write().await;
        let idx = state.indices.get_mut(index).ok_or_else(|| index_not_found(index))?;
        if let Some(key) = settings
            .as_object()
            .and_then(|updates| updates.keys().find(|key| STATIC_SETTINGS.contains(&key.as_str())))
        {
            return Err(IndexError::engine(
                400,
                format!(
                    "illegal_argument_exception: Can't update non dynamic settings [[index.{}]] for open indices [{}]",
                    key, index
                ),
            ));
        }
        if !idx.body.is_object() {
            idx.body = Value::Object(Map::new());
        }
        if let (Some(body), Some(updates)) = (idx.body.as_object_mut(), settings.as_object()) {
            let current = body
                .entry("settings")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(current) = current.as_object_mut() {
                for (key, value) in updates {
                    current.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn document_exists(&self, index: &str, id: &str) -> Result<bool> {
        self.existence_checks.fetch_add(1, AtomicOrdering::SeqCst);
        let state = self.state.read().await;
        Ok(state
            .indices
            .get(index)
            .map(|idx| idx.docs.contains_key(id))
            .unwrap_or(false))
    }

    async fn bulk(&self, actions: Vec<BulkAction>, _refresh: bool) -> Result<BulkResponse> {
        let previous = self.bulk_requests.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = self.state.write().await;
        if state.bulk_failure_after.is_some_and(|accepted| previous >= accepted) {
            return Err(IndexError::engine(503, "bulk request rejected: connection reset"));
        }
        let mut items = Vec::with_capacity(actions.len());

        for action in actions {
            let op = action.op();
            let id = action.id().to_string();
            let (status, error) = match action {
                BulkAction::Index { index, id, source } => {
                    let idx = state.indices.entry(index).or_default();
                    match idx.docs.insert(id, source) {
                        Some(_) => (200, None),
                        None => (201, None),
                    }
                }
                BulkAction::Update { index, id, doc } => {
                    match state.indices.get_mut(&index).and_then(|idx| idx.docs.get_mut(&id)) {
                        Some(stored) => {
                            if let (Some(stored), Some(doc)) = (stored.as_object_mut(), doc.as_object()) {
                                for (key, value) in doc {
                                    stored.insert(key.clone(), value.clone());
                                }
                            }
                            (200, None)
                        }
                        None => (404, Some(format!("[{}]: document missing", id))),
                    }
                }
                BulkAction::Delete { index, id } => {
                    match state.indices.get_mut(&index).and_then(|idx| idx.docs.remove(&id)) {
                        Some(_) => (200, None),
                        None => (404, None),
                    }
                }
            };
            items.push(BulkItem { op, id, status, error });
        }

        Ok(BulkResponse { items })
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse> {
        self.searches.fetch_add(1, AtomicOrdering::SeqCst);
        let state = self.state.read().await;

        if let Some(pattern) = &state.rejected_search_pattern {
            if body.to_string().contains(pattern.as_str()) {
                return Err(IndexError::engine(400, format!("search rejected: {}", pattern)));
            }
        }

        let idx = state.indices.get(index).ok_or_else(|| index_not_found(index))?;
        execute_search(idx, body)
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let state = self.state.read().await;
        if state.indices.contains_key(index) {
            Ok(())
        } else {
            Err(index_not_found(index))
        }
    }

    async fn cluster_health(&self, index: Option<&str>) -> Result<ClusterHealth> {
        let state = self.state.read().await;
        let status = match index {
            Some(index) if !state.indices.contains_key(index) => "red",
            _ => "green",
        };
        Ok(ClusterHealth {
            status: status.to_string(),
        })
    }
}

// ============================================================================
// Search execution
// ============================================================================

fn execute_search(idx: &MemoryIndex, body: &Value) -> Result<SearchResponse> {
    let size = body
        .get("size")
        .and_then(Value::as_u64)
        .map(|size| size as usize)
        .unwrap_or(DEFAULT_SEARCH_SIZE);
    let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;

    let mut scored: Vec<(&String, f64)> = if let Some(rrf) = body.pointer("/retriever/rrf") {
        eval_rrf(idx, rrf, size)?
    } else if let Some(query) = body.get("query") {
        let mut scored = Vec::new();
        for (id, doc) in &idx.docs {
            if let Some(score) = eval_query(query, doc)? {
                scored.push((id, score));
            }
        }
        scored
    } else {
        idx.docs.keys().map(|id| (id, 1.0)).collect()
    };

    sort_by_score(&mut scored);
    let total = scored.len() as u64;
    let excludes = source_excludes(body);

    let hits = scored
        .into_iter()
        .skip(from)
        .take(size)
        .map(|(id, score)| {
            let mut source = idx.docs.get(id).cloned().unwrap_or(Value::Null);
            if let Some(object) = source.as_object_mut() {
                for field in &excludes {
                    object.remove(field);
                }
            }
            SearchHit {
                id: id.clone(),
                score: Some(score),
                source,
            }
        })
        .collect();

    Ok(SearchResponse {
        hits,
        total: Some(total),
    })
}

fn sort_by_score(scored: &mut [(&String, f64)]) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
}

fn source_excludes(body: &Value) -> Vec<String> {
    body.pointer("/_source/excludes")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Reciprocal rank fusion over the configured retriever legs
fn eval_rrf<'a>(idx: &'a MemoryIndex, rrf: &Value, size: usize) -> Result<Vec<(&'a String, f64)>> {
    let rank_constant = rrf
        .get("rank_constant")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_RANK_CONSTANT);
    let window = rrf
        .get("rank_window_size")
        .and_then(Value::as_u64)
        .map(|w| w as usize)
        .unwrap_or(size);

    let mut fused: HashMap<&'a String, f64> = HashMap::new();
    for retriever in clauses(rrf.get("retrievers")) {
        let mut ranked = if let Some(standard) = retriever.get("standard") {
            let query = standard
                .get("query")
                .ok_or_else(|| IndexError::engine(400, "standard retriever without query"))?;
            let mut scored = Vec::new();
            for (id, doc) in &idx.docs {
                if let Some(score) = eval_query(query, doc)? {
                    scored.push((id, score));
                }
            }
            scored
        } else if let Some(knn) = retriever.get("knn") {
            eval_knn(idx, knn)?
        } else {
            return Err(IndexError::engine(400, format!("unsupported retriever: {}", retriever)));
        };

        sort_by_score(&mut ranked);
        for (rank, (id, _)) in ranked.into_iter().take(window).enumerate() {
            *fused.entry(id).or_insert(0.0) += 1.0 / (rank_constant + rank as f64 + 1.0);
        }
    }

    Ok(fused.into_iter().collect())
}

fn eval_knn<'a>(idx: &'a MemoryIndex, knn: &Value) -> Result<Vec<(&'a String, f64)>> {
    let field = knn
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| IndexError::engine(400, "knn without field"))?;
    let query_vector = as_vector(knn.get("query_vector"))
        .ok_or_else(|| IndexError::engine(400, "knn without query_vector"))?;
    let k = knn
        .get("k")
        .and_then(Value::as_u64)
        .map(|k| k as usize)
        .unwrap_or(DEFAULT_SEARCH_SIZE);
    let filters = clauses(knn.get("filter"));

    let mut scored = Vec::new();
    'docs: for (id, doc) in &idx.docs {
        for filter in &filters {
            if eval_query(filter, doc)?.is_none() {
                continue 'docs;
            }
        }
        let Some(vector) = as_vector(field_value(doc, field)) else {
            continue;
        };
        if let Some(similarity) = cosine_similarity(&query_vector, &vector) {
            scored.push((id, (1.0 + similarity) / 2.0));
        }
    }

    sort_by_score(&mut scored);
    scored.truncate(k);
    Ok(scored)
}

fn as_vector(value: Option<&Value>) -> Option<Vec<f64>> {
    value?.as_array()?.iter().map(Value::as_f64).collect()
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

// ============================================================================
// Query evaluation
// ============================================================================

/// Clause lists may be a single object or an array
fn clauses(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

fn single_entry(value: &Value) -> Result<(&String, &Value)> {
    value
        .as_object()
        .and_then(|object| object.iter().find(|(key, _)| key.as_str() != "boost"))
        .ok_or_else(|| IndexError::engine(400, format!("malformed query clause: {}", value)))
}

fn boost_of(value: &Value) -> f64 {
    value.get("boost").and_then(Value::as_f64).unwrap_or(1.0)
}

/// Resolve a dotted field path; `.keyword` sub-fields read the parent value
fn field_value<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    let lookup = |path: &str| {
        path.split('.')
            .try_fold(doc, |current, segment| current.get(segment))
    };
    lookup(field).or_else(|| field.strip_suffix(".keyword").and_then(lookup))
}

fn values_of(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn field_text(doc: &Value, field: &str) -> Option<String> {
    let value = field_value(doc, field)?;
    let parts: Vec<&str> = values_of(value).into_iter().filter_map(Value::as_str).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Query text and boost from `{field: text}` or `{field: {query, boost}}`
fn text_spec<'a>(spec: &'a Value, key: &str) -> (Option<&'a str>, f64) {
    match spec {
        Value::String(text) => (Some(text.as_str()), 1.0),
        Value::Object(_) => (spec.get(key).and_then(Value::as_str), boost_of(spec)),
        _ => (None, 1.0),
    }
}

fn match_score(doc: &Value, field: &str, query: &str) -> Option<f64> {
    let field_tokens = tokenize(&field_text(doc, field)?);
    let mut query_tokens = tokenize(query);
    query_tokens.sort();
    query_tokens.dedup();

    let score: f64 = query_tokens
        .iter()
        .map(|token| field_tokens.iter().filter(|t| *t == token).count())
        .filter(|tf| *tf > 0)
        .map(|tf| 1.0 + (tf as f64).ln())
        .sum();
    (score > 0.0).then_some(score)
}

fn phrase_matches(doc: &Value, field: &str, phrase: &str) -> bool {
    let Some(text) = field_text(doc, field) else {
        return false;
    };
    let field_tokens = tokenize(&text);
    let phrase_tokens = tokenize(phrase);
    !phrase_tokens.is_empty()
        && field_tokens
            .windows(phrase_tokens.len())
            .any(|window| window == phrase_tokens.as_slice())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

fn allowed_edits(fuzziness: Option<&Value>, term: &str) -> usize {
    match fuzziness.and_then(Value::as_u64) {
        Some(edits) => edits as usize,
        None => match term.chars().count() {
            0..=2 => 0,
            3..=5 => 1,
            _ => 2,
        },
    }
}

fn eval_query(query: &Value, doc: &Value) -> Result<Option<f64>> {
    let (kind, body) = single_entry(query)?;
    match kind.as_str() {
        "match_all" => Ok(Some(boost_of(body))),
        "bool" => eval_bool(body, doc),
        "term" => {
            let (field, spec) = single_entry(body)?;
            let (expected, boost) = match spec.get("value") {
                Some(value) if spec.is_object() => (value, boost_of(spec)),
                _ => (spec, 1.0),
            };
            let matched = field_value(doc, field)
                .map(|actual| values_of(actual).into_iter().any(|v| json_eq(v, expected)))
                .unwrap_or(false);
            Ok(matched.then_some(boost))
        }
        "terms" => {
            let (field, expected) = single_entry(body)?;
            let expected = expected.as_array().cloned().unwrap_or_default();
            let matched = field_value(doc, field)
                .map(|actual| {
                    values_of(actual)
                        .into_iter()
                        .any(|v| expected.iter().any(|e| json_eq(v, e)))
                })
                .unwrap_or(false);
            Ok(matched.then_some(boost_of(body)))
        }
        "range" => {
            let (field, bounds) = single_entry(body)?;
            let Some(actual) = field_value(doc, field).and_then(Value::as_f64) else {
                return Ok(None);
            };
            let bound = |key: &str| bounds.get(key).and_then(Value::as_f64);
            let matched = bound("gte").map_or(true, |b| actual >= b)
                && bound("gt").map_or(true, |b| actual > b)
                && bound("lte").map_or(true, |b| actual <= b)
                && bound("lt").map_or(true, |b| actual < b);
            Ok(matched.then_some(1.0))
        }
        "exists" => {
            let field = body
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| IndexError::engine(400, "exists without field"))?;
            let present = match field_value(doc, field) {
                None | Some(Value::Null) => false,
                Some(Value::Array(items)) => !items.is_empty(),
                Some(_) => true,
            };
            Ok(present.then_some(1.0))
        }
        "nested" => {
            let path = body
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| IndexError::engine(400, "nested without path"))?;
            let inner = body
                .get("query")
                .ok_or_else(|| IndexError::engine(400, "nested without query"))?;
            let mut best: Option<f64> = None;
            if let Some(elements) = field_value(doc, path) {
                for element in values_of(elements) {
                    let mut wrapper = Map::new();
                    wrapper.insert(path.to_string(), element.clone());
                    if let Some(score) = eval_query(inner, &Value::Object(wrapper))? {
                        best = Some(best.map_or(score, |b: f64| b.max(score)));
                    }
                }
            }
            Ok(best)
        }
        "match" => {
            let (field, spec) = single_entry(body)?;
            let (text, boost) = text_spec(spec, "query");
            Ok(text
                .and_then(|text| match_score(doc, field, text))
                .map(|score| score * boost))
        }
        "multi_match" => {
            let text = body.get("query").and_then(Value::as_str).unwrap_or_default();
            let mut best: Option<f64> = None;
            for field in clauses(body.get("fields")).into_iter().filter_map(Value::as_str) {
                let (name, weight) = match field.split_once('^') {
                    Some((name, weight)) => (name, weight.parse::<f64>().unwrap_or(1.0)),
                    None => (field, 1.0),
                };
                if let Some(score) = match_score(doc, name, text) {
                    let weighted = score * weight;
                    best = Some(best.map_or(weighted, |b: f64| b.max(weighted)));
                }
            }
            Ok(best.map(|score| score * boost_of(body)))
        }
        "match_phrase" => {
            let (field, spec) = single_entry(body)?;
            let (text, boost) = text_spec(spec, "query");
            Ok(text
                .filter(|text| phrase_matches(doc, field, text))
                .map(|text| boost * tokenize(text).len() as f64))
        }
        "fuzzy" => {
            let (field, spec) = single_entry(body)?;
            let (value, boost) = text_spec(spec, "value");
            let Some(value) = value.map(str::to_lowercase) else {
                return Ok(None);
            };
            let edits = allowed_edits(spec.get("fuzziness"), &value);
            let matched = field_text(doc, field)
                .map(|text| tokenize(&text).iter().any(|t| edit_distance(t, &value) <= edits))
                .unwrap_or(false);
            Ok(matched.then_some(boost))
        }
        "function_score" => {
            let inner = match body.get("query") {
                Some(query) => eval_query(query, doc)?,
                None => Some(1.0),
            };
            let Some(score) = inner else {
                return Ok(None);
            };
            if body.get("random_score").is_some() {
                let random: f64 = rand::random();
                let replace = body.get("boost_mode").and_then(Value::as_str) == Some("replace");
                return Ok(Some(if replace { random } else { score * random }));
            }
            Ok(Some(score))
        }
        other => Err(IndexError::engine(
            400,
            format!("unsupported query type [{}]", other),
        )),
    }
}

fn eval_bool(body: &Value, doc: &Value) -> Result<Option<f64>> {
    let must = clauses(body.get("must"));
    let filter = clauses(body.get("filter"));
    let must_not = clauses(body.get("must_not"));
    let should = clauses(body.get("should"));

    let mut score = 0.0;
    for clause in &must {
        match eval_query(clause, doc)? {
            Some(s) => score += s,
            None => return Ok(None),
        }
    }
    for clause in &filter {
        if eval_query(clause, doc)?.is_none() {
            return Ok(None);
        }
    }
    for clause in &must_not {
        if eval_query(clause, doc)?.is_some() {
            return Ok(None);
        }
    }

    let mut should_matches = 0;
    for clause in &should {
        if let Some(s) = eval_query(clause, doc)? {
            should_matches += 1;
            score += s;
        }
    }
    let minimum_should_match = match body.get("minimum_should_match") {
        Some(value) => value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .unwrap_or(0) as usize,
        None if must.is_empty() && filter.is_empty() && !should.is_empty() => 1,
        None => 0,
    };
    if should_matches < minimum_should_match {
        return Ok(None);
    }

    Ok(Some(score * boost_of(body)))
}
