#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Upstream POI provider trait and adapters.
//!
//! Each upstream service implements the [`PoiProvider`] trait to define how
//! a canonical bounding-box query is translated into its native syntax and
//! how its raw records are mapped into [`StationRecord`]. Malformed upstream
//! records are skipped with a warning (fail closed), never propagated.
//!
//! Adapters never retry internally — a failed or timed-out request surfaces
//! as a [`ProviderError`] and the aggregator decides what to do with it.

pub mod aqi_index;
pub mod poi_directory;
pub mod registry;
pub mod sensor_network;

use async_trait::async_trait;
use haze_map_geo::BoundingBox;
use haze_map_poi_models::{PoiCategory, SourceId, StationRecord};
use serde::Deserialize;

/// Errors that can occur while querying an upstream provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The upstream returned a non-success HTTP status.
    #[error("upstream returned HTTP {status}")]
    UpstreamStatus {
        /// The HTTP status code.
        status: u16,
    },

    /// The upstream payload did not have the documented shape.
    #[error("malformed upstream payload: {message}")]
    UpstreamPayload {
        /// Description of what went wrong.
        message: String,
    },
}

/// One page of provider results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Records mapped into the canonical schema.
    pub records: Vec<StationRecord>,
    /// Total records the upstream reports for this query, when it says.
    pub total_available: Option<u64>,
    /// Opaque cursor for the next page. `None` means this was the last
    /// page; `Some` is the has-more signal.
    pub next_cursor: Option<String>,
}

/// Trait that all upstream POI providers must implement.
///
/// Implementations are responsible for translating the canonical bounding
/// box into the provider's native query syntax, mapping heterogeneous field
/// names into the canonical metric map, and tagging every record with their
/// own [`SourceId`].
#[async_trait]
pub trait PoiProvider: Send + Sync {
    /// The stable source tag for this provider.
    fn id(&self) -> SourceId;

    /// Human-readable provider name, used in log messages.
    fn name(&self) -> &str;

    /// Whether this provider can contribute records for the given category
    /// filter (`None` = any category).
    fn serves(&self, category: Option<PoiCategory>) -> bool;

    /// Fetches one page of records inside `bbox`.
    ///
    /// `cursor` is the opaque continuation token from a previous page's
    /// [`SearchPage::next_cursor`]; `None` requests the first page. `limit`
    /// is a per-page size hint — providers may return fewer records.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the upstream request fails, returns a
    /// non-success status, or the payload cannot be parsed at all.
    async fn search(
        &self,
        bbox: &BoundingBox,
        limit: u64,
        cursor: Option<&str>,
    ) -> Result<SearchPage, ProviderError>;
}

/// Endpoint definition for one provider, parsed from the embedded TOML
/// configs in `providers/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderDefinition {
    /// Which provider this definition configures.
    pub id: SourceId,
    /// Human-readable name.
    pub name: String,
    /// Default base URL of the upstream service.
    pub base_url: String,
    /// Env var that overrides `base_url` (used by tests and self-hosted
    /// mirrors).
    pub base_url_env: Option<String>,
    /// Env var holding the API token, for providers that require one.
    pub token_env: Option<String>,
    /// Page size for paginated providers.
    pub page_size: Option<u64>,
}

impl ProviderDefinition {
    /// The effective base URL: the env override when set, else the default.
    #[must_use]
    pub fn resolved_base_url(&self) -> String {
        self.base_url_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .unwrap_or_else(|| self.base_url.clone())
    }

    /// The API token from the configured env var, if any is set.
    #[must_use]
    pub fn resolved_token(&self) -> Option<String> {
        self.token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }
}
