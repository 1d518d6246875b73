//! Ingest pipelines.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::api::{RawMethod, encode_segment};
use crate::client::EngineClient;
use crate::error::{EngineError, EngineResult};

/// An ingest pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Caller-assigned id.
    #[serde(skip)]
    pub id: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Processor definitions, run in order.
    pub processors: Vec<Value>,
}

impl Pipeline {
    /// Creates a pipeline with no processors.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            processors: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a processor.
    pub fn with_processor(mut self, processor: Value) -> Self {
        self.processors.push(processor);
        self
    }

    /// Body of the put-pipeline request.
    pub fn to_body(&self) -> EngineResult<Value> {
        serde_json::to_value(self).map_err(|e| EngineError::InvalidConfig {
            message: format!("pipeline {} cannot be serialized: {}", self.id, e),
        })
    }
}

/// Pipeline operations, reached through [`EngineClient::pipelines`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineManager<'a> {
    client: &'a EngineClient,
}

impl<'a> PipelineManager<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    /// Whether the engine can run ingest pipelines.
    pub async fn is_ingest_supported(&self) -> EngineResult<bool> {
        Ok(self.client.negotiated().await?.capabilities.ingest_supported)
    }

    /// Whether a pipeline with exactly this id exists.
    ///
    /// Engines without ingest support have no pipelines, so no request is
    /// made for them.
    pub async fn is_existing_pipeline(&self, id: &str) -> EngineResult<bool> {
        if !self.is_ingest_supported().await? {
            debug!(pipeline = %id, "Ingest not supported, pipeline cannot exist");
            return Ok(false);
        }

        let path = format!("/_ingest/pipeline/{}", encode_segment(id));
        let response = self.client.api().raw(RawMethod::Get, &path, None).await?;

        if response.is_not_found() {
            return Ok(false);
        }
        let response = response.error_for_status()?;

        // The body is keyed by id; require an exact match
        Ok(response.body.get(id).is_some())
    }

    /// Creates or replaces a pipeline.
    pub async fn put_pipeline(&self, pipeline: &Pipeline) -> EngineResult<()> {
        let negotiated = self.client.negotiated().await?;
        if !negotiated.capabilities.ingest_supported {
            return Err(EngineError::IngestUnsupported {
                version: negotiated.version.clone(),
            });
        }

        self.client
            .api()
            .put_pipeline(&pipeline.id, pipeline.to_body()?)
            .await?
            .error_for_status()?;
        info!(pipeline = %pipeline.id, processors = pipeline.processors.len(), "Stored ingest pipeline");
        Ok(())
    }
}
