//! Client configuration.
//!
//! All fields have defaults, so a partial document (or `Default::default()`)
//! yields a client for a local engine:
//!
//! ```
//! use crawler_engine_client::EngineClientConfig;
//!
//! let config: EngineClientConfig = serde_json::from_str(r#"{
//!     "nodes": ["http://search:9200"],
//!     "health": { "timeout": "1m" }
//! }"#).unwrap();
//!
//! assert_eq!(config.legacy_type_name, "doc");
//! assert_eq!(config.health.timeout.as_secs(), 60);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Credentials handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for an [`EngineClient`](crate::EngineClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineClientConfig {
    /// Engine node URLs (e.g., `["http://localhost:9200"]`).
    /// Only the first node is used.
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<EngineAuth>,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,

    /// Mapping type used for document paths on legacy engines (default: `"doc"`).
    #[serde(default = "default_legacy_type_name")]
    pub legacy_type_name: String,

    /// Index health wait settings.
    #[serde(default)]
    pub health: HealthWaitConfig,
}

fn default_nodes() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_legacy_type_name() -> String {
    "doc".to_string()
}

impl Default for EngineClientConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
            legacy_type_name: default_legacy_type_name(),
            health: HealthWaitConfig::default(),
        }
    }
}

impl EngineClientConfig {
    /// Returns the node the client talks to.
    pub fn primary_node(&self) -> &str {
        self.nodes
            .first()
            .map(String::as_str)
            .unwrap_or("http://localhost:9200")
    }

    /// Returns the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.nodes.iter().all(|n| n.trim().is_empty()) {
            errors.push("At least one engine node is required".to_string());
        }

        if self.request_timeout_ms == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.legacy_type_name.is_empty() || self.legacy_type_name.starts_with('_') {
            errors.push("Legacy type name must be non-empty and not start with '_'".to_string());
        }

        errors.extend(self.health.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Backoff settings for [`wait_for_healthy_index`](crate::index::IndexLifecycleManager::wait_for_healthy_index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthWaitConfig {
    /// Deadline used when the caller does not pass one.
    #[serde(with = "humantime_serde", default = "default_health_timeout")]
    pub timeout: Duration,

    /// Delay before the second poll.
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Upper bound for the delay between polls.
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for HealthWaitConfig {
    fn default() -> Self {
        Self {
            timeout: default_health_timeout(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl HealthWaitConfig {
    /// Returns the delay to use after `current`, capped at `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current
            .mul_f64(self.backoff_multiplier.max(1.0))
            .min(self.max_delay)
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.initial_delay.is_zero() {
            errors.push("Health poll initial delay cannot be 0".to_string());
        }
        if self.initial_delay > self.max_delay {
            errors.push("Health poll initial delay cannot exceed max delay".to_string());
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            errors.push("Health poll backoff multiplier must be at least 1.0".to_string());
        }
        errors
    }
}

/// Serde module for Duration with humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
