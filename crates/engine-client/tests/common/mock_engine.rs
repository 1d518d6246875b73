//! An in-memory engine implementing [`EngineApi`].
//!
//! Behaves like a single-node engine of a configurable version: writes stay
//! invisible until a refresh, releases before 6.2.0 reject the `_doc` write
//! call, legacy releases have no pipeline endpoints, and error bodies follow
//! each release's format.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crawler_engine_client::{
    EngineApi, EngineError, EngineResponse, EngineResult, EngineVersion, RawMethod,
};
use serde_json::{Map, Value, json};

#[derive(Debug, Default)]
struct MockIndex {
    settings: Value,
    visible: BTreeMap<String, Value>,
    pending: BTreeMap<String, Value>,
}

#[derive(Debug)]
struct MockState {
    version: EngineVersion,
    indices: BTreeMap<String, MockIndex>,
    pipelines: BTreeMap<String, Value>,
    health_script: VecDeque<String>,
    default_health: String,
    health_failure: Option<(u16, Value)>,
    calls: BTreeMap<&'static str, usize>,
    requests: Vec<String>,
    last_search_body: Option<Value>,
    unreachable: bool,
}

impl MockState {
    fn record(&mut self, op: &'static str, request: String) {
        *self.calls.entry(op).or_default() += 1;
        self.requests.push(request);
    }

    fn check_reachable(&self) -> EngineResult<()> {
        if self.unreachable {
            Err(EngineError::Connection {
                message: "connection refused".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn is_legacy(&self) -> bool {
        self.version < EngineVersion::ingest_threshold()
    }

    fn has_doc_endpoint(&self) -> bool {
        self.version >= EngineVersion::doc_endpoint_threshold()
    }

    fn run_pipeline(&self, id: &str, source: &mut Value) -> Result<(), EngineResponse> {
        let Some(definition) = self.pipelines.get(id) else {
            return Err(EngineResponse::new(
                400,
                json!({
                    "error": {
                        "type": "illegal_argument_exception",
                        "reason": format!("pipeline with id [{}] does not exist", id)
                    },
                    "status": 400
                }),
            ));
        };
        apply_set_processors(definition, source);
        Ok(())
    }

    fn index_not_found(&self, index: &str) -> EngineResponse {
        let body = if self.is_legacy() {
            json!({"error": format!("IndexMissingException[[{}] missing]", index), "status": 404})
        } else {
            json!({
                "error": {
                    "type": "index_not_found_exception",
                    "reason": "no such index",
                    "index": index
                },
                "status": 404
            })
        };
        EngineResponse::new(404, body)
    }

    fn already_exists(&self, index: &str) -> EngineResponse {
        let body = if self.version.major >= 6 {
            json!({"error": {"type": "resource_already_exists_exception", "index": index}, "status": 400})
        } else if self.version.major == 5 {
            json!({"error": {"type": "index_already_exists_exception", "index": index}, "status": 400})
        } else {
            json!({"error": format!("IndexAlreadyExistsException[[{}] already exists]", index), "status": 400})
        };
        EngineResponse::new(400, body)
    }

    fn store(&mut self, index: &str, id: &str, source: Value) -> EngineResponse {
        let entry = self.indices.entry(index.to_string()).or_default();
        let existed = entry.visible.contains_key(id) || entry.pending.contains_key(id);
        entry.pending.insert(id.to_string(), source);
        if existed {
            EngineResponse::new(200, json!({"_id": id, "result": "updated"}))
        } else {
            EngineResponse::new(201, json!({"_id": id, "result": "created"}))
        }
    }
}

/// In-memory engine shared between a test and the client under test.
#[derive(Debug, Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    /// A reachable engine reporting `version`.
    pub fn with_version(version: &str) -> Self {
        let state = MockState {
            version: version.parse().unwrap(),
            indices: BTreeMap::new(),
            pipelines: BTreeMap::new(),
            health_script: VecDeque::new(),
            default_health: "yellow".to_string(),
            health_failure: None,
            calls: BTreeMap::new(),
            requests: Vec::new(),
            last_search_body: None,
            unreachable: false,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Health statuses returned by successive polls before falling back to
    /// the default.
    pub fn set_health_sequence(&self, statuses: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.health_script = statuses.iter().map(|s| s.to_string()).collect();
    }

    /// Health returned once the scripted sequence is exhausted.
    pub fn set_default_health(&self, status: &str) {
        self.state.lock().unwrap().default_health = status.to_string();
    }

    /// Answers every health poll with `status` and `body` until cleared.
    pub fn set_health_failure(&self, failure: Option<(u16, Value)>) {
        self.state.lock().unwrap().health_failure = failure;
    }

    /// Makes every call fail at the transport level.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    /// Number of calls made to one trait operation.
    pub fn calls(&self, op: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.get(op).copied().unwrap_or(0)
    }

    /// Every request received, as `METHOD /path`.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Body of the most recent search.
    pub fn last_search_body(&self) -> Option<Value> {
        self.state.lock().unwrap().last_search_body.clone()
    }

    /// Documents visible to search in `index`.
    pub fn visible_count(&self, index: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.indices.get(index).map(|i| i.visible.len()).unwrap_or(0)
    }

    /// Stored definition of a pipeline.
    pub fn pipeline(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().pipelines.get(id).cloned()
    }

    /// Source of a document, visible or not.
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        let idx = state.indices.get(index)?;
        idx.pending.get(id).or_else(|| idx.visible.get(id)).cloned()
    }
}

#[async_trait]
impl EngineApi for MockEngine {
    async fn info(&self) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("info", "GET /".to_string());
        Ok(EngineResponse::new(
            200,
            json!({
                "name": "mock-node",
                "cluster_name": "mock",
                "version": {"number": state.version.to_string()},
                "tagline": "You Know, for Search"
            }),
        ))
    }

    async fn create_index(&self, index: &str, body: Option<Value>) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("create_index", format!("PUT /{}", index));
        if state.indices.contains_key(index) {
            return Ok(state.already_exists(index));
        }
        state.indices.insert(
            index.to_string(),
            MockIndex {
                settings: body.unwrap_or_else(|| json!({})),
                ..Default::default()
            },
        );
        Ok(EngineResponse::new(
            200,
            json!({"acknowledged": true, "shards_acknowledged": true, "index": index}),
        ))
    }

    async fn index_exists(&self, index: &str) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("index_exists", format!("HEAD /{}", index));
        let status = if state.indices.contains_key(index) { 200 } else { 404 };
        Ok(EngineResponse::new(status, Value::Null))
    }

    async fn get_index(&self, index: &str) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("get_index", format!("GET /{}", index));
        match state.indices.get(index) {
            Some(idx) => Ok(EngineResponse::new(
                200,
                json!({ index: {"aliases": {}, "settings": idx.settings.clone()} }),
            )),
            None => Ok(state.index_not_found(index)),
        }
    }

    async fn delete_index(&self, index: &str) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("delete_index", format!("DELETE /{}", index));
        if state.indices.remove(index).is_some() {
            Ok(EngineResponse::new(200, json!({"acknowledged": true})))
        } else {
            Ok(state.index_not_found(index))
        }
    }

    async fn cluster_health(
        &self,
        index: &str,
        _timeout: Duration,
    ) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("cluster_health", format!("GET /_cluster/health/{}", index));

        if let Some((status, body)) = state.health_failure.clone() {
            return Ok(EngineResponse::new(status, body));
        }

        if let Some(status) = state.health_script.pop_front() {
            return Ok(EngineResponse::new(200, json!({"status": status, "timed_out": false})));
        }
        if !state.indices.contains_key(index) {
            return Ok(EngineResponse::new(408, json!({"status": "red", "timed_out": true})));
        }
        let status = state.default_health.clone();
        Ok(EngineResponse::new(200, json!({"status": status, "timed_out": false})))
    }

    async fn refresh(&self, index: &str) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("refresh", format!("POST /{}/_refresh", index));
        if !state.indices.contains_key(index) {
            return Ok(state.index_not_found(index));
        }
        if let Some(idx) = state.indices.get_mut(index) {
            let pending = std::mem::take(&mut idx.pending);
            idx.visible.extend(pending);
        }
        Ok(EngineResponse::new(200, json!({"_shards": {"total": 1, "successful": 1, "failed": 0}})))
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        body: Value,
        pipeline: Option<&str>,
    ) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        let request = match pipeline {
            Some(p) => format!("PUT /{}/_doc/{}?pipeline={}", index, id, p),
            None => format!("PUT /{}/_doc/{}", index, id),
        };
        state.record("index_document", request);

        if !state.has_doc_endpoint() {
            let body = if state.is_legacy() {
                json!({"error": "InvalidTypeNameException[mapping type name [_doc] can't start with '_']", "status": 400})
            } else {
                json!({
                    "error": {
                        "type": "invalid_type_name_exception",
                        "reason": "Document mapping type name can't start with '_', found: [_doc]"
                    },
                    "status": 400
                })
            };
            return Ok(EngineResponse::new(400, body));
        }

        let mut source = body;
        if let Some(p) = pipeline {
            if let Err(rejection) = state.run_pipeline(p, &mut source) {
                return Ok(rejection);
            }
        }

        Ok(state.store(index, id, source))
    }

    async fn search(&self, index: &str, body: Value) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("search", format!("POST /{}/_search", index));
        state.last_search_body = Some(body.clone());

        if body.get("track_total_hits").is_some() && state.version.major < 7 {
            return Ok(parsing_error("Unknown key for a VALUE_BOOLEAN in [track_total_hits]."));
        }

        let Some(idx) = state.indices.get(index) else {
            return Ok(state.index_not_found(index));
        };

        let query = body.get("query").cloned().unwrap_or_else(|| json!({"match_all": {}}));
        let mut matching = Vec::new();
        for (id, source) in &idx.visible {
            match matches_query(&query, source) {
                Some(true) => matching.push((id.clone(), source.clone())),
                Some(false) => {}
                None => return Ok(parsing_error("unsupported query")),
            }
        }

        let size = body.get("size").and_then(|s| s.as_u64()).unwrap_or(10) as usize;
        let stored_fields: Option<Vec<String>> = body
            .get("fields")
            .and_then(|f| serde_json::from_value(f.clone()).ok());
        let source_filter: Option<Vec<String>> = body
            .get("_source")
            .and_then(|f| serde_json::from_value(f.clone()).ok());

        let hits: Vec<Value> = matching
            .iter()
            .take(size)
            .map(|(id, source)| {
                let mut hit = Map::new();
                hit.insert("_index".to_string(), json!(index));
                hit.insert("_id".to_string(), json!(id));
                hit.insert("_score".to_string(), json!(1.0));

                match (&stored_fields, &source_filter) {
                    // Requesting stored fields drops `_source` unless it is also asked for
                    (Some(_), None) => {}
                    (_, Some(paths)) => {
                        hit.insert("_source".to_string(), filter_source(source, paths));
                    }
                    (None, None) => {
                        hit.insert("_source".to_string(), source.clone());
                    }
                }

                if let Some(fields) = &stored_fields {
                    let mut section = Map::new();
                    for field in fields {
                        if let Some(value) = lookup(source, field) {
                            let values = match value {
                                Value::Array(items) => items.clone(),
                                other => vec![other.clone()],
                            };
                            section.insert(field.clone(), Value::Array(values));
                        }
                    }
                    if !section.is_empty() {
                        hit.insert("fields".to_string(), Value::Object(section));
                    }
                }

                Value::Object(hit)
            })
            .collect();

        let total = if state.version.major >= 7 {
            json!({"value": matching.len(), "relation": "eq"})
        } else {
            json!(matching.len())
        };

        Ok(EngineResponse::new(
            200,
            json!({
                "took": 1,
                "timed_out": false,
                "hits": {"total": total, "max_score": 1.0, "hits": hits}
            }),
        ))
    }

    async fn put_pipeline(&self, id: &str, body: Value) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.record("put_pipeline", format!("PUT /_ingest/pipeline/{}", id));
        if state.is_legacy() {
            return Ok(no_handler("PUT", &format!("/_ingest/pipeline/{}", id)));
        }
        state.pipelines.insert(id.to_string(), body);
        Ok(EngineResponse::new(200, json!({"acknowledged": true})))
    }

    async fn raw(
        &self,
        method: RawMethod,
        path: &str,
        body: Option<Value>,
    ) -> EngineResult<EngineResponse> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        let method_name = match method {
            RawMethod::Get => "GET",
            RawMethod::Put => "PUT",
            RawMethod::Post => "POST",
            RawMethod::Head => "HEAD",
            RawMethod::Delete => "DELETE",
        };
        state.record("raw", format!("{} {}", method_name, path));

        let (path_only, query) = path.split_once('?').unwrap_or((path, ""));
        let pipeline = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("pipeline="))
            .map(|p| urlencoding::decode(p).map(|d| d.into_owned()).unwrap_or_else(|_| p.to_string()));

        let segments: Vec<String> = path_only
            .trim_start_matches('/')
            .split('/')
            .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
            .collect();

        match (method, segments.as_slice()) {
            (RawMethod::Get, [ingest, pipeline, id])
                if ingest == "_ingest" && pipeline == "pipeline" =>
            {
                if state.is_legacy() {
                    return Ok(no_handler(method_name, path));
                }
                match state.pipelines.get(id) {
                    Some(definition) => {
                        Ok(EngineResponse::new(200, json!({ id.as_str(): definition.clone() })))
                    }
                    None => Ok(EngineResponse::new(404, json!({}))),
                }
            }
            (RawMethod::Put, [index, _type_name, id]) if !index.starts_with('_') => {
                let mut source = body.unwrap_or_else(|| json!({}));
                if let Some(p) = &pipeline {
                    if state.is_legacy() {
                        return Ok(no_handler(method_name, path));
                    }
                    if let Err(rejection) = state.run_pipeline(p, &mut source) {
                        return Ok(rejection);
                    }
                }
                Ok(state.store(index, id, source))
            }
            _ => Ok(no_handler(method_name, path)),
        }
    }
}

fn parsing_error(reason: &str) -> EngineResponse {
    EngineResponse::new(
        400,
        json!({"error": {"type": "parsing_exception", "reason": reason}, "status": 400}),
    )
}

fn no_handler(method: &str, path: &str) -> EngineResponse {
    EngineResponse::new(
        400,
        json!({"error": format!("no handler found for uri [{}] and method [{}]", path, method), "status": 400}),
    )
}

/// Value at a dotted path through nested objects.
fn lookup<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(source, |value, segment| value.get(segment))
}

fn filter_source(source: &Value, paths: &[String]) -> Value {
    let mut filtered = Map::new();
    for path in paths {
        if let Some(value) = lookup(source, path) {
            let segments: Vec<&str> = path.split('.').collect();
            insert_path(&mut filtered, &segments, value.clone());
        }
    }
    Value::Object(filtered)
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            map.insert(last.to_string(), value);
        }
        [first, rest @ ..] => {
            let child = map
                .entry(first.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Supports `match_all` and single-field `term`. `None` for anything else.
fn matches_query(query: &Value, source: &Value) -> Option<bool> {
    if query.get("match_all").is_some() {
        return Some(true);
    }
    let term = query.get("term")?.as_object()?;
    let (field, expected) = term.iter().next()?;
    let expected = expected.get("value").unwrap_or(expected);
    Some(match lookup(source, field) {
        Some(Value::Array(items)) => items.contains(expected),
        Some(actual) => actual == expected,
        None => false,
    })
}

/// Runs the `set` processors of a pipeline; other processors are ignored.
fn apply_set_processors(definition: &Value, source: &mut Value) {
    let processors = definition
        .get("processors")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();
    for processor in processors {
        if let (Some(field), Some(value), Value::Object(map)) = (
            processor.pointer("/set/field").and_then(|f| f.as_str()),
            processor.pointer("/set/value"),
            &mut *source,
        ) {
            map.insert(field.to_string(), value.clone());
        }
    }
}
