//! The session object tying transport, configuration and version cache
//! together.

use std::fmt;
use std::sync::Arc;

use crate::api::{ElasticsearchApi, EngineApi};
use crate::config::EngineClientConfig;
use crate::document::DocumentWriter;
use crate::error::{EngineError, EngineResult};
use crate::index::IndexLifecycleManager;
use crate::pipeline::PipelineManager;
use crate::query::QueryExecutor;
use crate::version::{CapabilitySet, EngineVersion, NegotiatedEngine, VersionNegotiator};

/// One engine session.
///
/// The engine version is detected on first use and cached for the lifetime
/// of the client. Operations are grouped into namespaces:
///
/// - [`indices`](Self::indices) - create, check, wait for, refresh, delete
/// - [`documents`](Self::documents) - write documents
/// - [`queries`](Self::queries) - search and stored-field extraction
/// - [`pipelines`](Self::pipelines) - ingest pipelines
pub struct EngineClient {
    api: Arc<dyn EngineApi>,
    config: EngineClientConfig,
    negotiator: VersionNegotiator,
}

impl fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineClient")
            .field("node", &self.config.primary_node())
            .field("negotiated", &self.negotiator.cached())
            .finish_non_exhaustive()
    }
}

impl EngineClient {
    /// Validates `config` and connects through the `elasticsearch` transport.
    ///
    /// No request is made until the first operation.
    pub fn new(config: EngineClientConfig) -> EngineResult<Self> {
        config
            .validate()
            .map_err(|errors| EngineError::InvalidConfig {
                message: errors.join("; "),
            })?;
        let api = ElasticsearchApi::new(&config)?;
        Ok(Self::with_api(Arc::new(api), config))
    }

    /// Builds a client over any [`EngineApi`] implementation.
    pub fn with_api(api: Arc<dyn EngineApi>, config: EngineClientConfig) -> Self {
        Self {
            api,
            config,
            negotiator: VersionNegotiator::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineClientConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn api(&self) -> &dyn EngineApi {
        self.api.as_ref()
    }

    /// Detects the engine version, or returns the cached one.
    pub async fn detect_version(&self) -> EngineResult<EngineVersion> {
        Ok(self.negotiated().await?.version.clone())
    }

    /// Returns the capability set, detecting the version first if needed.
    pub async fn capabilities(&self) -> EngineResult<CapabilitySet> {
        Ok(self.negotiated().await?.capabilities)
    }

    /// Returns the detected version without any I/O.
    pub fn cached_version(&self) -> Option<EngineVersion> {
        self.negotiator.cached().map(|n| n.version.clone())
    }

    pub(crate) async fn negotiated(&self) -> EngineResult<&NegotiatedEngine> {
        self.negotiator.negotiate(self.api.as_ref()).await
    }

    /// Index lifecycle operations.
    pub fn indices(&self) -> IndexLifecycleManager<'_> {
        IndexLifecycleManager::new(self)
    }

    /// Document writes.
    pub fn documents(&self) -> DocumentWriter<'_> {
        DocumentWriter::new(self)
    }

    /// Searches.
    pub fn queries(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(self)
    }

    /// Ingest pipelines.
    pub fn pipelines(&self) -> PipelineManager<'_> {
        PipelineManager::new(self)
    }
}
