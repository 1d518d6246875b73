//! Engine version detection and the capability table derived from it.
//!
//! The engine is asked for its version once per session. Everything that
//! differs between releases is then answered by [`CapabilitySet::for_version`],
//! a pure function of the detected [`EngineVersion`]:
//!
//! | Engine version             | Mapping style | Ingest | `_doc` endpoint | `track_total_hits` |
//! |----------------------------|---------------|--------|-----------------|--------------------|
//! | `< 5.0.0-alpha1`           | legacy        | no     | no              | no                 |
//! | `>= 5.0.0-alpha1, < 6.2.0` | typeless      | yes    | no              | no                 |
//! | `>= 6.2.0, < 7.0.0`        | typeless      | yes    | yes             | no                 |
//! | `>= 7.0.0`                 | typeless      | yes    | yes             | yes                |

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::EngineApi;
use crate::error::{EngineError, EngineResult};

/// A released (or pre-released) engine version, e.g. `5.0.0-alpha1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineVersion {
    /// Major version.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
    /// Patch version.
    pub patch: u64,
    /// Pre-release tag without the leading dash (`alpha1`, `SNAPSHOT`).
    pub pre_release: Option<String>,
}

impl EngineVersion {
    /// Creates a release version.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
        }
    }

    /// Sets the pre-release tag.
    pub fn with_pre_release(mut self, tag: impl Into<String>) -> Self {
        self.pre_release = Some(tag.into());
        self
    }

    /// First version with typeless mappings and ingest pipelines.
    pub fn ingest_threshold() -> Self {
        Self::new(5, 0, 0).with_pre_release("alpha1")
    }

    /// First version that routes writes through the `_doc` endpoint.
    pub fn doc_endpoint_threshold() -> Self {
        Self::new(6, 2, 0)
    }

    /// First version that accepts `track_total_hits` on searches.
    pub fn total_hits_threshold() -> Self {
        Self::new(7, 0, 0)
    }

    /// Returns true if this version is the given one or newer.
    pub fn on_or_after(&self, other: &EngineVersion) -> bool {
        self >= other
    }
}

impl FromStr for EngineVersion {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = semver::Version::parse(s.trim())?;
        Ok(Self {
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
            pre_release: (!parsed.pre.is_empty()).then(|| parsed.pre.as_str().to_string()),
        })
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}

impl Ord for EngineVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                // A pre-release precedes its release
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_pre_release(a, b),
            })
    }
}

impl PartialOrd for EngineVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_pre_release(a: &str, b: &str) -> Ordering {
    match (semver::Prerelease::new(a), semver::Prerelease::new(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// How documents are modeled in the engine's mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStyle {
    /// Documents carry a mapping type in their path; stored fields are
    /// fetched with the `fields` search parameter.
    Legacy,
    /// Single-type indices without a per-document mapping type.
    Typeless,
}

impl fmt::Display for MappingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingStyle::Legacy => write!(f, "legacy"),
            MappingStyle::Typeless => write!(f, "typeless"),
        }
    }
}

/// Optional engine behaviors available for a detected version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Whether ingest pipelines exist.
    pub ingest_supported: bool,
    /// Document modeling convention.
    pub mapping_style: MappingStyle,
    /// Whether single documents can be written to `/{index}/_doc/{id}`.
    /// Older releases treat `_doc` as an invalid type name.
    pub doc_endpoint_supported: bool,
    /// Whether `_search` accepts `track_total_hits` (and reports
    /// `hits.total` as an object).
    pub tracks_total_hits: bool,
}

impl CapabilitySet {
    /// Derives the capability set for a version. No I/O.
    pub fn for_version(version: &EngineVersion) -> Self {
        let modern = version.on_or_after(&EngineVersion::ingest_threshold());
        Self {
            ingest_supported: modern,
            mapping_style: if modern {
                MappingStyle::Typeless
            } else {
                MappingStyle::Legacy
            },
            doc_endpoint_supported: version.on_or_after(&EngineVersion::doc_endpoint_threshold()),
            tracks_total_hits: version.on_or_after(&EngineVersion::total_hits_threshold()),
        }
    }
}

/// The negotiated view of the engine for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedEngine {
    /// Version reported by the engine.
    pub version: EngineVersion,
    /// Capabilities derived from `version`.
    pub capabilities: CapabilitySet,
}

impl NegotiatedEngine {
    /// Builds the negotiated view for a version.
    pub fn new(version: EngineVersion) -> Self {
        let capabilities = CapabilitySet::for_version(&version);
        Self {
            version,
            capabilities,
        }
    }
}

/// Detects the engine version once and caches it for the session.
///
/// Concurrent first callers may each probe the engine; the first result
/// stored wins and every caller observes that value afterwards.
#[derive(Debug, Default)]
pub struct VersionNegotiator {
    negotiated: OnceLock<NegotiatedEngine>,
}

impl VersionNegotiator {
    /// Creates an empty negotiator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached negotiation result without any I/O.
    pub fn cached(&self) -> Option<&NegotiatedEngine> {
        self.negotiated.get()
    }

    /// Returns the negotiated engine, asking the info endpoint on first use.
    pub async fn negotiate(&self, api: &dyn EngineApi) -> EngineResult<&NegotiatedEngine> {
        if let Some(negotiated) = self.negotiated.get() {
            return Ok(negotiated);
        }

        let version = probe_version(api).await?;
        let negotiated = NegotiatedEngine::new(version);

        if self.negotiated.set(negotiated.clone()).is_ok() {
            info!(
                version = %negotiated.version,
                mapping_style = %negotiated.capabilities.mapping_style,
                ingest = negotiated.capabilities.ingest_supported,
                "Detected engine version"
            );
        } else {
            debug!("Engine version was negotiated concurrently; keeping the first result");
        }

        Ok(self.negotiated.get_or_init(|| negotiated))
    }
}

/// Performs the info round trip and parses `version.number`.
async fn probe_version(api: &dyn EngineApi) -> EngineResult<EngineVersion> {
    let response = api.info().await?;
    if !response.is_success() {
        return Err(EngineError::connection(format!(
            "info endpoint returned status {}",
            response.status
        )));
    }

    let number = response
        .body
        .pointer("/version/number")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            EngineError::connection(format!(
                "info response has no version number: {}",
                response.body
            ))
        })?;

    number.parse().map_err(|e| {
        EngineError::connection(format!("malformed engine version '{}': {}", number, e))
    })
}
