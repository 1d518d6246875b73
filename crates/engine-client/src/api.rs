//! Transport seam between the facade and the engine.
//!
//! [`EngineApi`] lists the typed operations the engine client binding offers,
//! plus [`EngineApi::raw`] for protocol features the binding does not model
//! (typed document paths on legacy engines, pipeline existence checks).
//! Non-2xx answers are returned as an [`EngineResponse`]; only transport
//! failures are errors at this layer.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::headers::HeaderMap;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::http::{Method, Url};
use elasticsearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesGetParts,
    IndicesRefreshParts,
};
use elasticsearch::ingest::IngestPutPipelineParts;
use elasticsearch::{Elasticsearch, IndexParts, SearchParts};
use serde_json::Value;

use crate::config::{EngineAuth, EngineClientConfig};
use crate::error::{EngineError, EngineResult};

/// HTTP method for a raw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawMethod {
    /// `GET`
    Get,
    /// `PUT`
    Put,
    /// `POST`
    Post,
    /// `HEAD`
    Head,
    /// `DELETE`
    Delete,
}

impl From<RawMethod> for Method {
    fn from(method: RawMethod) -> Self {
        match method {
            RawMethod::Get => Method::Get,
            RawMethod::Put => Method::Put,
            RawMethod::Post => Method::Post,
            RawMethod::Head => Method::Head,
            RawMethod::Delete => Method::Delete,
        }
    }
}

/// Status and decoded body of one engine round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body; `Null` when empty, a JSON string when the body was not JSON.
    pub body: Value,
}

impl EngineResponse {
    /// Creates a response from a status and an already decoded body.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Decodes a raw body.
    pub fn from_text(status: u16, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        };
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns the engine's error type.
    ///
    /// Modern engines report `{"error": {"type": "..."}}`; the oldest ones
    /// report `{"error": "IndexAlreadyExistsException[...]"}`.
    pub fn error_type(&self) -> Option<&str> {
        let error = self.body.get("error")?;
        match error {
            Value::Object(obj) => obj.get("type").and_then(|t| t.as_str()),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Converts a failed response into a pass-through engine error.
    pub fn into_error(self) -> EngineError {
        EngineError::EngineReported {
            status: self.status,
            body: self.body,
        }
    }

    /// Returns `self` when successful, otherwise the pass-through error.
    pub fn error_for_status(self) -> EngineResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }
}

/// Operations the facade needs from the engine.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// `GET /`
    async fn info(&self) -> EngineResult<EngineResponse>;

    /// `PUT /{index}` with optional settings and mappings.
    async fn create_index(&self, index: &str, body: Option<Value>) -> EngineResult<EngineResponse>;

    /// `HEAD /{index}`
    async fn index_exists(&self, index: &str) -> EngineResult<EngineResponse>;

    /// `GET /{index}`
    async fn get_index(&self, index: &str) -> EngineResult<EngineResponse>;

    /// `DELETE /{index}`
    async fn delete_index(&self, index: &str) -> EngineResult<EngineResponse>;

    /// `GET /_cluster/health/{index}`, letting the engine block for at most
    /// `timeout`.
    async fn cluster_health(&self, index: &str, timeout: Duration)
    -> EngineResult<EngineResponse>;

    /// `POST /{index}/_refresh`
    async fn refresh(&self, index: &str) -> EngineResult<EngineResponse>;

    /// `PUT /{index}/_doc/{id}`, optionally through an ingest pipeline.
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        body: Value,
        pipeline: Option<&str>,
    ) -> EngineResult<EngineResponse>;

    /// `POST /{index}/_search`
    async fn search(&self, index: &str, body: Value) -> EngineResult<EngineResponse>;

    /// `PUT /_ingest/pipeline/{id}`
    async fn put_pipeline(&self, id: &str, body: Value) -> EngineResult<EngineResponse>;

    /// Sends a request the typed surface does not cover. `path` must start
    /// with `/` and have its segments already encoded.
    async fn raw(
        &self,
        method: RawMethod,
        path: &str,
        body: Option<Value>,
    ) -> EngineResult<EngineResponse>;
}

/// Encodes one path segment for [`EngineApi::raw`].
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// [`EngineApi`] backed by the `elasticsearch` crate.
#[derive(Clone)]
pub struct ElasticsearchApi {
    client: Elasticsearch,
}

impl Debug for ElasticsearchApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchApi").finish_non_exhaustive()
    }
}

impl ElasticsearchApi {
    /// Builds the transport from configuration.
    pub fn new(config: &EngineClientConfig) -> EngineResult<Self> {
        let url = config.primary_node();
        let parsed_url: Url = url.parse().map_err(|e| EngineError::InvalidConfig {
            message: format!("Invalid node URL '{}': {}", url, e),
        })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).timeout(config.request_timeout());

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                EngineAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                EngineAuth::Bearer { token } => builder.auth(Credentials::Bearer(token.clone())),
            };
        }

        let transport = builder.build().map_err(|e| EngineError::InvalidConfig {
            message: format!("Failed to build transport: {}", e),
        })?;

        Ok(Self::from_client(Elasticsearch::new(transport)))
    }

    /// Wraps an already configured client.
    pub fn from_client(client: Elasticsearch) -> Self {
        Self { client }
    }
}

async fn read_response(response: Response) -> EngineResult<EngineResponse> {
    let status = response.status_code().as_u16();
    let text = response.text().await?;
    Ok(EngineResponse::from_text(status, &text))
}

/// Formats a duration the way the engine's time parameters expect it.
fn engine_time(duration: Duration) -> String {
    format!("{}ms", duration.as_millis().max(1))
}

#[async_trait]
impl EngineApi for ElasticsearchApi {
    async fn info(&self) -> EngineResult<EngineResponse> {
        let response = self.client.info().send().await?;
        read_response(response).await
    }

    async fn create_index(&self, index: &str, body: Option<Value>) -> EngineResult<EngineResponse> {
        let indices = self.client.indices();
        let request = indices.create(IndicesCreateParts::Index(index));
        let response = match body {
            Some(body) => request.body(body).send().await?,
            None => request.send().await?,
        };
        read_response(response).await
    }

    async fn index_exists(&self, index: &str) -> EngineResult<EngineResponse> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await?;
        read_response(response).await
    }

    async fn get_index(&self, index: &str) -> EngineResult<EngineResponse> {
        let response = self
            .client
            .indices()
            .get(IndicesGetParts::Index(&[index]))
            .send()
            .await?;
        read_response(response).await
    }

    async fn delete_index(&self, index: &str) -> EngineResult<EngineResponse> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await?;
        read_response(response).await
    }

    async fn cluster_health(
        &self,
        index: &str,
        timeout: Duration,
    ) -> EngineResult<EngineResponse> {
        let timeout = engine_time(timeout);
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::Index(&[index]))
            .timeout(&timeout)
            .send()
            .await?;
        read_response(response).await
    }

    async fn refresh(&self, index: &str) -> EngineResult<EngineResponse> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await?;
        read_response(response).await
    }

    async fn index_document(
        &self,
        index: &str,
        id: &str,
        body: Value,
        pipeline: Option<&str>,
    ) -> EngineResult<EngineResponse> {
        let mut request = self.client.index(IndexParts::IndexId(index, id)).body(body);
        if let Some(pipeline) = pipeline {
            request = request.pipeline(pipeline);
        }
        let response = request.send().await?;
        read_response(response).await
    }

    async fn search(&self, index: &str, body: Value) -> EngineResult<EngineResponse> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await?;
        read_response(response).await
    }

    async fn put_pipeline(&self, id: &str, body: Value) -> EngineResult<EngineResponse> {
        let response = self
            .client
            .ingest()
            .put_pipeline(IngestPutPipelineParts::Id(id))
            .body(body)
            .send()
            .await?;
        read_response(response).await
    }

    async fn raw(
        &self,
        method: RawMethod,
        path: &str,
        body: Option<Value>,
    ) -> EngineResult<EngineResponse> {
        tracing::debug!(method = ?method, path = %path, "Sending raw engine request");
        let response = self
            .client
            .send(
                method.into(),
                path,
                HeaderMap::new(),
                Option::<&()>::None,
                body.map(JsonBody::new),
                None,
            )
            .await?;
        read_response(response).await
    }
}
