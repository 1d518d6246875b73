//! Index lifecycle: creation, existence checks, health waits and refresh.
//!
//! ```text
//! absent -> creating -> { created, failed(AlreadyExists) } -> (health poll) -> healthy | timed_out
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::EngineResponse;
use crate::client::EngineClient;
use crate::error::{EngineError, EngineResult};

/// Engine-reported replication/availability status of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// At least one primary shard is unassigned.
    Red,
    /// Primaries assigned, some replicas are not.
    Yellow,
    /// Everything assigned.
    Green,
    /// No usable status was reported.
    Unknown,
}

impl HealthState {
    /// Parses the engine's status string; anything unrecognised is `Unknown`.
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "red" => HealthState::Red,
            "yellow" => HealthState::Yellow,
            "green" => HealthState::Green,
            _ => HealthState::Unknown,
        }
    }

    /// Reads `status` from a cluster health response. The engine answers a
    /// health request that timed out with a non-2xx status but still reports
    /// a color, so the HTTP status is not consulted.
    pub fn from_response(response: &EngineResponse) -> Self {
        response
            .body
            .get("status")
            .and_then(|s| s.as_str())
            .map(Self::parse)
            .unwrap_or(HealthState::Unknown)
    }

    /// Reads the health from a cluster health answer. A 408 means the engine
    /// gave up waiting and still carries a color; any other failure is passed
    /// through.
    pub fn from_health_answer(response: EngineResponse) -> EngineResult<Self> {
        if response.is_success() || response.status == HEALTH_TIMED_OUT {
            Ok(Self::from_response(&response))
        } else {
            Err(response.into_error())
        }
    }

    /// Returns true for `Yellow` and `Green`.
    pub fn is_at_least_yellow(&self) -> bool {
        matches!(self, HealthState::Yellow | HealthState::Green)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Red => write!(f, "red"),
            HealthState::Yellow => write!(f, "yellow"),
            HealthState::Green => write!(f, "green"),
            HealthState::Unknown => write!(f, "unknown"),
        }
    }
}

/// An index as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Index name, unique per engine.
    pub name: String,
    /// Settings, mappings and aliases as reported by the engine.
    pub settings_and_mappings: Value,
    /// Health at the time of the lookup.
    pub health: HealthState,
}

/// Result of a successful create-index call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    /// The index did not exist and was created.
    Created,
    /// The index already existed and the caller allowed that.
    AlreadyExisted,
}

/// Status of a cluster health call that timed out engine-side.
const HEALTH_TIMED_OUT: u16 = 408;

/// Stand-in deadline for waits too long to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Error types the engine uses for "index already exists" across releases.
const ALREADY_EXISTS_TYPES: &[&str] = &[
    "resource_already_exists_exception",
    "index_already_exists_exception",
];

fn is_already_exists(response: &EngineResponse) -> bool {
    response.error_type().is_some_and(|t| {
        ALREADY_EXISTS_TYPES.contains(&t) || t.starts_with("IndexAlreadyExistsException")
    })
}

fn is_index_not_found(response: &EngineResponse) -> bool {
    response.is_not_found()
        || response.error_type().is_some_and(|t| {
            t == "index_not_found_exception" || t.starts_with("IndexMissingException")
        })
}

/// Index management operations, reached through [`EngineClient::indices`].
#[derive(Debug, Clone, Copy)]
pub struct IndexLifecycleManager<'a> {
    client: &'a EngineClient,
}

impl<'a> IndexLifecycleManager<'a> {
    pub(crate) fn new(client: &'a EngineClient) -> Self {
        Self { client }
    }

    /// Creates an index, with optional settings and mappings.
    ///
    /// If the index already exists this fails with
    /// [`EngineError::IndexAlreadyExists`] unless `override_if_exists` is set,
    /// in which case the existing index is left as it is.
    pub async fn create_index(
        &self,
        name: &str,
        override_if_exists: bool,
        settings_and_mappings: Option<Value>,
    ) -> EngineResult<IndexCreation> {
        let response = self
            .client
            .api()
            .create_index(name, settings_and_mappings)
            .await?;

        if response.is_success() {
            info!(index = %name, "Created index");
            return Ok(IndexCreation::Created);
        }

        if is_already_exists(&response) {
            if override_if_exists {
                debug!(index = %name, "Index already exists, keeping it");
                return Ok(IndexCreation::AlreadyExisted);
            }
            return Err(EngineError::IndexAlreadyExists {
                index: name.to_string(),
            });
        }

        Err(response.into_error())
    }

    /// Returns whether the index exists. Never mutates anything.
    pub async fn is_existing_index(&self, name: &str) -> EngineResult<bool> {
        let response = self.client.api().index_exists(name).await?;
        if response.is_success() {
            Ok(true)
        } else if response.is_not_found() {
            Ok(false)
        } else {
            Err(response.into_error())
        }
    }

    /// Waits until the index health is at least yellow.
    ///
    /// Polls with exponential backoff (see
    /// [`HealthWaitConfig`](crate::config::HealthWaitConfig)); every sleep is
    /// clamped to the time left. At least one poll is made even with a zero
    /// timeout. Returns the health that satisfied the wait.
    pub async fn wait_for_healthy_index(
        &self,
        name: &str,
        timeout: Duration,
    ) -> EngineResult<HealthState> {
        let settings = &self.client.config().health;
        let started = Instant::now();
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + FAR_FUTURE);
        let mut delay = settings.initial_delay;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let response = self
                .client
                .api()
                .cluster_health(name, remaining.min(settings.max_delay))
                .await?;
            let health = HealthState::from_health_answer(response)?;

            if health.is_at_least_yellow() {
                debug!(index = %name, health = %health, polls, "Index is healthy");
                return Ok(health);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    index = %name,
                    health = %health,
                    polls,
                    "Timed out waiting for index health"
                );
                return Err(EngineError::Timeout {
                    index: name.to_string(),
                    waited: now.duration_since(started),
                    last_health: health,
                });
            }

            debug!(index = %name, health = %health, delay = ?delay, "Index not healthy yet");
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = settings.next_delay(delay);
        }
    }

    /// [`wait_for_healthy_index`](Self::wait_for_healthy_index) with the
    /// configured deadline.
    pub async fn wait_for_healthy_index_default(&self, name: &str) -> EngineResult<HealthState> {
        self.wait_for_healthy_index(name, self.client.config().health.timeout)
            .await
    }

    /// Makes every write acknowledged so far visible to searches on `name`.
    pub async fn refresh(&self, name: &str) -> EngineResult<()> {
        self.client.api().refresh(name).await?.error_for_status()?;
        debug!(index = %name, "Refreshed index");
        Ok(())
    }

    /// Deletes an index. Returns `false` if there was nothing to delete.
    pub async fn delete_index(&self, name: &str) -> EngineResult<bool> {
        let response = self.client.api().delete_index(name).await?;
        if response.is_success() {
            debug!(index = %name, "Deleted index");
            return Ok(true);
        }
        if is_index_not_found(&response) {
            return Ok(false);
        }
        Err(response.into_error())
    }

    /// Looks up an index's configuration and current health.
    pub async fn describe_index(&self, name: &str) -> EngineResult<Option<IndexDescriptor>> {
        let response = self.client.api().get_index(name).await?;
        if is_index_not_found(&response) {
            return Ok(None);
        }
        let response = response.error_for_status()?;

        // The engine keys the body by concrete index name, which differs
        // from `name` when an alias was passed.
        let settings_and_mappings = response
            .body
            .get(name)
            .or_else(|| response.body.as_object().and_then(|m| m.values().next()))
            .cloned()
            .unwrap_or(Value::Null);

        let health_response = self
            .client
            .api()
            .cluster_health(name, self.client.config().health.initial_delay)
            .await?;

        Ok(Some(IndexDescriptor {
            name: name.to_string(),
            settings_and_mappings,
            health: HealthState::from_health_answer(health_response)?,
        }))
    }
}
