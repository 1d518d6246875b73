//! Command line configuration for the probe.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ENGINE_NODES` | http://localhost:9200 | Engine node URLs (comma-separated) |
//! | `ENGINE_USERNAME` | | Basic auth username |
//! | `ENGINE_PASSWORD` | | Basic auth password |
//! | `ENGINE_API_TOKEN` | | Bearer token |
//! | `ENGINE_INSECURE` | false | Skip certificate validation |
//! | `ENGINE_REQUEST_TIMEOUT_MS` | 30000 | Per-request timeout |
//! | `ENGINE_HEALTH_TIMEOUT` | 30s | Health wait deadline |
//! | `ENGINE_LEGACY_TYPE` | doc | Mapping type on legacy engines |
//! | `ENGINE_LOG_LEVEL` | info | Log level |

use std::time::Duration;

use clap::Parser;
use crawler_engine_client::{EngineAuth, EngineClientConfig, HealthWaitConfig};

/// Probe configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "engine-probe")]
#[command(about = "Checks a search engine the way the crawler uses it")]
pub struct ProbeConfig {
    /// Engine node URLs.
    #[arg(
        long,
        env = "ENGINE_NODES",
        value_delimiter = ',',
        default_value = "http://localhost:9200"
    )]
    pub nodes: Vec<String>,

    /// Basic auth username.
    #[arg(long, env = "ENGINE_USERNAME")]
    pub username: Option<String>,

    /// Basic auth password.
    #[arg(long, env = "ENGINE_PASSWORD")]
    pub password: Option<String>,

    /// Bearer token, used instead of basic auth.
    #[arg(long, env = "ENGINE_API_TOKEN")]
    pub api_token: Option<String>,

    /// Skip TLS certificate validation.
    #[arg(long, env = "ENGINE_INSECURE", default_value = "false")]
    pub insecure: bool,

    /// Request timeout in milliseconds.
    #[arg(long, env = "ENGINE_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// How long to wait for index health (e.g. `30s`, `2m`).
    #[arg(long, env = "ENGINE_HEALTH_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub health_timeout: Duration,

    /// Mapping type used on legacy engines.
    #[arg(long, env = "ENGINE_LEGACY_TYPE", default_value = "doc")]
    pub legacy_type: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "ENGINE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Index to inspect.
    #[arg(long)]
    pub index: Option<String>,

    /// Create the index if it is missing.
    #[arg(long, requires = "index")]
    pub create: bool,

    /// Wait for the index to become healthy.
    #[arg(long, requires = "index")]
    pub wait: bool,

    /// Pipeline whose existence to report.
    #[arg(long)]
    pub pipeline: Option<String>,
}

impl ProbeConfig {
    /// Validates the arguments and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.password.is_some() && self.username.is_none() {
            errors.push("A password requires a username".to_string());
        }

        if self.username.is_some() && self.api_token.is_some() {
            errors.push("Use either basic auth or an API token, not both".to_string());
        }

        if let Err(client_errors) = self.client_config().validate() {
            errors.extend(client_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Builds the client configuration.
    pub fn client_config(&self) -> EngineClientConfig {
        let auth = match (&self.api_token, &self.username) {
            (Some(token), _) => Some(EngineAuth::Bearer {
                token: token.clone(),
            }),
            (None, Some(username)) => Some(EngineAuth::Basic {
                username: username.clone(),
                password: self.password.clone().unwrap_or_default(),
            }),
            (None, None) => None,
        };

        EngineClientConfig {
            nodes: self.nodes.clone(),
            request_timeout_ms: self.request_timeout_ms,
            auth,
            disable_certificate_validation: self.insecure,
            legacy_type_name: self.legacy_type.clone(),
            health: HealthWaitConfig {
                timeout: self.health_timeout,
                ..Default::default()
            },
        }
    }
}
