//! Document writes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::api::{RawMethod, encode_segment};
use crate::client::EngineClient;
use crate::error::{EngineError, EngineResult};
use crate::version::MappingStyle;

/// A document to be written. Writing an existing id replaces its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id within the index.
    pub id: String,
    /// Target index.
    pub index: String,
    /// Document body.
    pub source: Value,
    /// Ingest pipeline to run the document through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
}

impl Document {
    /// Creates a document without a pipeline.
    pub fn new(index: impl Into<String>, id: impl Into<String>, source: Value) -> Self {
        Self {
            id: id.into(),
            index: index.into(),
            source,
            pipeline_id: None,
        }
    }

    /// Routes the document through an ingest pipeline.
    pub fn with_pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }
}

/// Writes documents, reached through [`EngineClient::documents`].
#[derive(Debug, Clone, Copy)]
pub struct DocumentWriter<'a> {
    client: &'a EngineClient,
}

impl<'a> DocumentWriter<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    /// Writes or overwrites `document`, returning once the engine accepted it.
    ///
    /// Engines with the `_doc` endpoint get the typed index call. Older ones
    /// (including typeless 5.x and 6.0/6.1) are written under the configured
    /// legacy type name, with the pipeline passed as a query parameter.
    ///
    /// The write is not visible to searches until the index is refreshed.
    pub async fn index(&self, document: &Document) -> EngineResult<()> {
        let negotiated = self.client.negotiated().await?;

        if document.pipeline_id.is_some() && !negotiated.capabilities.ingest_supported {
            return Err(EngineError::IngestUnsupported {
                version: negotiated.version.clone(),
            });
        }

        let capabilities = &negotiated.capabilities;
        let response = if capabilities.mapping_style == MappingStyle::Typeless
            && capabilities.doc_endpoint_supported
        {
            self.client
                .api()
                .index_document(
                    &document.index,
                    &document.id,
                    document.source.clone(),
                    document.pipeline_id.as_deref(),
                )
                .await?
        } else {
            let path = typed_document_path(
                &document.index,
                &self.client.config().legacy_type_name,
                &document.id,
                document.pipeline_id.as_deref(),
            );
            self.client
                .api()
                .raw(RawMethod::Put, &path, Some(document.source.clone()))
                .await?
        };

        response.error_for_status()?;
        debug!(index = %document.index, id = %document.id, "Indexed document");
        Ok(())
    }
}

fn typed_document_path(index: &str, type_name: &str, id: &str, pipeline: Option<&str>) -> String {
    let mut path = format!(
        "/{}/{}/{}",
        encode_segment(index),
        encode_segment(type_name),
        encode_segment(id)
    );
    if let Some(pipeline) = pipeline {
        path.push_str("?pipeline=");
        path.push_str(&encode_segment(pipeline));
    }
    path
}
