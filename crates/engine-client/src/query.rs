//! Search execution and stored-field extraction.
//!
//! Field retrieval differs by [`MappingStyle`]: legacy engines return
//! requested fields in each hit's `fields` section, typeless engines are asked
//! for a filtered `_source` and the values are read by dotted path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::client::EngineClient;
use crate::error::EngineResult;
use crate::version::{CapabilitySet, MappingStyle};

/// Number of hits the engine returns when no size is given.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// A search against one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Index to search.
    pub target_index: String,
    /// Query expression; `None` matches every document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    /// Fields to return for each hit, in order.
    #[serde(default)]
    pub requested_fields: Vec<String>,
    /// Maximum number of hits.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

impl SearchQuery {
    /// Match-all query on `index`.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            target_index: index.into(),
            filter: None,
            requested_fields: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Sets the query expression.
    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Adds a field to return for each hit.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.requested_fields.push(field.into());
        self
    }

    /// Sets the maximum number of hits.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Builds the `_search` body for an engine with the given capabilities.
    pub fn to_body(&self, capabilities: &CapabilitySet) -> Value {
        let mut body = Map::new();
        body.insert(
            "query".to_string(),
            self.filter
                .clone()
                .unwrap_or_else(|| json!({"match_all": {}})),
        );
        body.insert("size".to_string(), json!(self.max_results));

        if !self.requested_fields.is_empty() {
            let clause = match capabilities.mapping_style {
                MappingStyle::Legacy => "fields",
                MappingStyle::Typeless => "_source",
            };
            body.insert(clause.to_string(), json!(self.requested_fields));
        }

        if capabilities.tracks_total_hits {
            body.insert("track_total_hits".to_string(), Value::Bool(true));
        }

        Value::Object(body)
    }
}

/// One matching document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Document id.
    pub id: String,
    /// Values found for each requested field. Fields the hit does not carry
    /// are absent.
    pub fields: BTreeMap<String, Vec<Value>>,
}

impl SearchHit {
    /// First value of `field`, if any.
    pub fn first_value(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).and_then(|values| values.first())
    }
}

/// Outcome of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Number of documents matching the query, not limited by `max_results`.
    pub total_hits: u64,
    /// Returned hits in engine order.
    pub hits: Vec<SearchHit>,
}

impl SearchResult {
    /// Parses a `_search` response body.
    pub fn from_response(body: &Value, requested_fields: &[String], style: MappingStyle) -> Self {
        let raw_hits = body
            .pointer("/hits/hits")
            .and_then(|h| h.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let hits: Vec<SearchHit> = raw_hits
            .iter()
            .map(|hit| parse_hit(hit, requested_fields, style))
            .collect();

        let total_hits = body
            .pointer("/hits/total")
            .and_then(parse_total)
            .unwrap_or(hits.len() as u64);

        Self { total_hits, hits }
    }
}

/// `hits.total` is an integer before 7.0 and `{"value": n, "relation": ..}` after.
fn parse_total(total: &Value) -> Option<u64> {
    total
        .as_u64()
        .or_else(|| total.get("value").and_then(|v| v.as_u64()))
}

fn parse_hit(hit: &Value, requested_fields: &[String], style: MappingStyle) -> SearchHit {
    let id = match hit.get("_id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };

    let mut fields = BTreeMap::new();
    for field in requested_fields {
        let mut values = Vec::new();
        if style == MappingStyle::Typeless
            && let Some(source) = hit.get("_source")
        {
            let segments: Vec<&str> = field.split('.').collect();
            collect_path(source, &segments, &mut values);
        }
        if values.is_empty()
            && let Some(stored) = hit.get("fields").and_then(|f| f.get(field.as_str()))
        {
            push_values(stored, &mut values);
        }
        if !values.is_empty() {
            fields.insert(field.clone(), values);
        }
    }

    SearchHit { id, fields }
}

/// Collects every value at a dotted path, descending through arrays.
fn collect_path(value: &Value, segments: &[&str], out: &mut Vec<Value>) {
    let Some((head, rest)) = segments.split_first() else {
        push_values(value, out);
        return;
    };

    match value {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                collect_path(child, rest, out);
            } else if !rest.is_empty() {
                // Sources may also hold keys that contain dots themselves
                let joined = segments.join(".");
                if let Some(child) = map.get(&joined) {
                    push_values(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_path(item, segments, out);
            }
        }
        _ => {}
    }
}

fn push_values(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => out.extend(items.iter().filter(|v| !v.is_null()).cloned()),
        Value::Null => {}
        other => out.push(other.clone()),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Runs searches, reached through [`EngineClient::queries`].
#[derive(Debug, Clone, Copy)]
pub struct QueryExecutor<'a> {
    client: &'a EngineClient,
}

impl<'a> QueryExecutor<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    /// Executes `query` and returns the parsed hits.
    pub async fn search(&self, query: &SearchQuery) -> EngineResult<SearchResult> {
        let capabilities = self.client.negotiated().await?.capabilities;
        let body = query.to_body(&capabilities);
        debug!(index = %query.target_index, body = %body, "Executing search");

        let response = self
            .client
            .api()
            .search(&query.target_index, body)
            .await?
            .error_for_status()?;

        Ok(SearchResult::from_response(
            &response.body,
            &query.requested_fields,
            capabilities.mapping_style,
        ))
    }

    /// Returns up to `max_results` values of `field_name` from documents
    /// matching `filter`, one per hit that carries the field.
    ///
    /// Multi-valued fields contribute their first value; non-string values
    /// are rendered as JSON text. `path_hint` only shows up in logs.
    pub async fn get_from_stored_fields_v2(
        &self,
        index: &str,
        max_results: usize,
        field_name: &str,
        path_hint: &str,
        filter: Value,
    ) -> EngineResult<Vec<String>> {
        debug!(index = %index, field = %field_name, path = %path_hint, "Reading stored field");

        let query = SearchQuery::new(index)
            .with_filter(filter)
            .with_field(field_name)
            .with_max_results(max_results);
        let result = self.search(&query).await?;

        Ok(result
            .hits
            .iter()
            .filter_map(|hit| hit.first_value(field_name))
            .map(render_value)
            .take(max_results)
            .collect())
    }
}
