//! Crawler Search Engine Client
//!
//! A client facade between a document crawler and an Elasticsearch-compatible
//! engine whose wire API changes across major releases. The engine version is
//! detected once per session and every version-dependent choice (document
//! paths, stored-field retrieval, ingest pipelines) is derived from it.
//!
//! # Architecture
//!
//! - [`client`] - [`EngineClient`], the session object and its namespaces
//! - [`version`] - Version detection and the capability table
//! - [`index`] - Index creation, existence, health waits, refresh
//! - [`document`] - Document writes
//! - [`query`] - Searches and stored-field extraction
//! - [`pipeline`] - Ingest pipelines
//! - [`api`] - The transport seam ([`EngineApi`]) and its `elasticsearch` implementation
//! - [`config`] - Client configuration
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```no_run
//! use crawler_engine_client::{Document, EngineClient, EngineClientConfig};
//! use serde_json::json;
//!
//! # async fn run() -> crawler_engine_client::EngineResult<()> {
//! let client = EngineClient::new(EngineClientConfig::default())?;
//!
//! client.indices().create_index("docs", true, None).await?;
//! client.indices().wait_for_healthy_index_default("docs").await?;
//!
//! client
//!     .documents()
//!     .index(&Document::new("docs", "1", json!({"foo": {"bar": "bar"}})))
//!     .await?;
//! client.indices().refresh("docs").await?;
//!
//! let values = client
//!     .queries()
//!     .get_from_stored_fields_v2("docs", 10, "foo.bar", "/", json!({"term": {"foo.bar": "bar"}}))
//!     .await?;
//! assert_eq!(values, vec!["bar"]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod query;
pub mod version;

// Re-export commonly used types at crate root
pub use api::{ElasticsearchApi, EngineApi, EngineResponse, RawMethod};
pub use client::EngineClient;
pub use config::{EngineAuth, EngineClientConfig, HealthWaitConfig};
pub use document::{Document, DocumentWriter};
pub use error::{EngineError, EngineResult};
pub use index::{HealthState, IndexCreation, IndexDescriptor, IndexLifecycleManager};
pub use pipeline::{Pipeline, PipelineManager};
pub use query::{QueryExecutor, SearchHit, SearchQuery, SearchResult};
pub use version::{CapabilitySet, EngineVersion, MappingStyle, VersionNegotiator};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
