#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the haze map server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the core aggregator and passport types to allow independent
//! evolution of the API contract.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use haze_map_aggregator::{Coverage, QueryOutcome, QuerySummary};
use haze_map_passport_models::{
    DailyInsight, ExposureEvent, InsightsSummary, LogOutcome, Passport, Profile, RiskLevel,
};
use haze_map_poi_models::{PoiCategory, SourceId, StationRecord};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Generic error body. `kind` distinguishes a rejected request
/// (`validation`), a passport write that was not recorded (`ledger`), and
/// internal faults (`internal`) so clients can react differently.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Human-readable description.
    pub error: String,
    /// Machine-readable failure class.
    pub kind: String,
}

impl ApiError {
    /// A request rejected before any work happened.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: "validation".to_string(),
        }
    }

    /// A passport write that was not recorded.
    #[must_use]
    pub fn ledger(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: "ledger".to_string(),
        }
    }

    /// An internal fault.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: "internal".to_string(),
        }
    }

    /// A read for state that does not exist.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: "not_found".to_string(),
        }
    }
}

/// Query parameters for the nearby endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQueryParams {
    /// Origin latitude.
    pub lat: Option<f64>,
    /// Origin longitude.
    pub lon: Option<f64>,
    /// Search radius in kilometers.
    pub radius_km: Option<f64>,
    /// Map zoom level, converted to an approximate radius when `radiusKm`
    /// is absent.
    pub zoom: Option<f64>,
    /// Bounding box as `west,south,east,north`.
    pub bbox: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Restrict to one category (canonical SCREAMING_SNAKE_CASE name).
    pub category: Option<String>,
}

/// A POI record as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStation {
    /// Stable record id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// Canonical category.
    pub category: PoiCategory,
    /// Named metrics (pollutants or facility attributes).
    pub metrics: BTreeMap<String, Option<f64>>,
    /// Contact phone, if published.
    pub phone: Option<String>,
    /// Opening hours, if published.
    pub hours: Option<String>,
    /// Upstream freshness timestamp.
    pub updated_at: Option<DateTime<Utc>>,
    /// Distance from the query origin in meters.
    pub distance_meters: Option<f64>,
    /// Which provider supplied the record.
    pub source: SourceId,
}

impl From<StationRecord> for ApiStation {
    fn from(record: StationRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            lat: record.location.lat,
            lon: record.location.lon,
            category: record.category,
            metrics: record.metrics,
            phone: record.phone,
            hours: record.hours,
            updated_at: record.updated_at,
            distance_meters: record.distance_meters,
            source: record.source,
        }
    }
}

/// Summary statistics block of a nearby response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSummary {
    /// Number of records returned.
    pub total_stations: usize,
    /// Mean of the summary metric.
    pub average_metric: Option<f64>,
    /// Minimum of the summary metric.
    pub min_metric: Option<f64>,
    /// Maximum of the summary metric.
    pub max_metric: Option<f64>,
}

impl From<QuerySummary> for ApiSummary {
    fn from(summary: QuerySummary) -> Self {
        Self {
            total_stations: summary.total_stations,
            average_metric: summary.average_metric,
            min_metric: summary.min_metric,
            max_metric: summary.max_metric,
        }
    }
}

/// Coverage block of a nearby response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCoverage {
    /// Providers invoked for this query.
    pub providers_queried: usize,
    /// Providers that failed or timed out.
    pub providers_failed: usize,
    /// Whether the result came from cache.
    pub cache_hit: bool,
}

impl From<Coverage> for ApiCoverage {
    fn from(coverage: Coverage) -> Self {
        Self {
            providers_queried: coverage.providers_queried,
            providers_failed: coverage.providers_failed,
            cache_hit: coverage.cache_hit,
        }
    }
}

/// Response from the nearby endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiNearbyResponse {
    /// Matching records, ascending by distance.
    pub records: Vec<ApiStation>,
    /// Statistics over `records`.
    pub summary: ApiSummary,
    /// Coverage indicator.
    pub coverage: ApiCoverage,
}

impl From<QueryOutcome> for ApiNearbyResponse {
    fn from(outcome: QueryOutcome) -> Self {
        Self {
            records: outcome.records.into_iter().map(ApiStation::from).collect(),
            summary: outcome.summary.into(),
            coverage: outcome.coverage.into(),
        }
    }
}

/// Body of an exposure log request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureLogRequest {
    /// Stable user key from the authentication collaborator.
    pub user_key: String,
    /// Latitude of the exposure.
    pub lat: f64,
    /// Longitude of the exposure.
    pub lon: f64,
    /// Human-readable place label.
    pub location_name: String,
    /// Fine particulate matter reading, µg/m³.
    pub pm25: Option<f64>,
    /// Nitrogen dioxide reading, µg/m³.
    pub no2: Option<f64>,
    /// Carbon monoxide reading, ppm.
    pub co: Option<f64>,
    /// Travel mode tag; unmapped values fall back to `UNKNOWN`.
    pub mode: Option<String>,
    /// When the exposure happened; defaults to call time.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Response to an exposure log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLogOutcome {
    /// Score for this event.
    pub score: f64,
    /// Risk tier for this event.
    pub risk_level: RiskLevel,
    /// Advisory tips.
    pub tips: Vec<String>,
    /// Streak after the transition.
    pub streak: u32,
    /// Best streak after the transition.
    pub best_streak: u32,
    /// Total points after the award.
    pub points: u64,
}

impl From<LogOutcome> for ApiLogOutcome {
    fn from(outcome: LogOutcome) -> Self {
        Self {
            score: outcome.score,
            risk_level: outcome.risk_level,
            tips: outcome.tips,
            streak: outcome.streak,
            best_streak: outcome.best_streak,
            points: outcome.points,
        }
    }
}

/// Query parameters for the passport endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassportQueryParams {
    /// Whose passport to read.
    pub user_key: String,
    /// Maximum number of recent events.
    pub limit: Option<usize>,
}

/// Query parameters for the insights endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsQueryParams {
    /// Whose history to aggregate.
    pub user_key: String,
}

/// Body of an ensure-profile request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    /// Stable user key from the authentication collaborator.
    pub user_key: String,
    /// New display nickname, when updating.
    pub nickname: Option<String>,
    /// New home city label, when updating.
    pub home_city: Option<String>,
}

/// A profile as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProfile {
    /// Stable user key.
    pub user_key: String,
    /// Display nickname.
    pub nickname: Option<String>,
    /// Home city label.
    pub home_city: Option<String>,
    /// Reward points.
    pub points: u64,
    /// Current streak in days.
    pub streak: u32,
    /// Best streak ever reached.
    pub best_streak: u32,
    /// Date of the last logged event (UTC calendar date).
    pub last_active_date: Option<NaiveDate>,
}

impl From<Profile> for ApiProfile {
    fn from(profile: Profile) -> Self {
        Self {
            user_key: profile.user_key,
            nickname: profile.nickname,
            home_city: profile.home_city,
            points: profile.points,
            streak: profile.streak,
            best_streak: profile.best_streak,
            last_active_date: profile.last_active_date,
        }
    }
}

/// An exposure event as returned by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiExposureEvent {
    /// Opaque event id.
    pub id: String,
    /// Latitude of the exposure.
    pub lat: f64,
    /// Longitude of the exposure.
    pub lon: f64,
    /// Place label.
    pub location_name: String,
    /// PM2.5 reading, if supplied.
    pub pm25: Option<f64>,
    /// NO₂ reading, if supplied.
    pub no2: Option<f64>,
    /// CO reading, if supplied.
    pub co: Option<f64>,
    /// Travel mode.
    pub mode: String,
    /// When the exposure happened.
    pub recorded_at: DateTime<Utc>,
    /// Computed score.
    pub score: f64,
    /// Computed risk tier.
    pub risk_level: RiskLevel,
    /// Computed tips.
    pub tips: Vec<String>,
}

impl From<ExposureEvent> for ApiExposureEvent {
    fn from(event: ExposureEvent) -> Self {
        Self {
            id: event.id,
            lat: event.location.lat,
            lon: event.location.lon,
            location_name: event.location_name,
            pm25: event.readings.pm25,
            no2: event.readings.no2,
            co: event.readings.co,
            mode: event.mode.to_string(),
            recorded_at: event.recorded_at,
            score: event.score,
            risk_level: event.risk_level,
            tips: event.tips,
        }
    }
}

/// Response from the passport endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPassportResponse {
    /// Current profile state.
    pub profile: ApiProfile,
    /// Most recent events, newest first.
    pub recent_events: Vec<ApiExposureEvent>,
}

impl From<Passport> for ApiPassportResponse {
    fn from(passport: Passport) -> Self {
        Self {
            profile: passport.profile.into(),
            recent_events: passport
                .recent_events
                .into_iter()
                .map(ApiExposureEvent::from)
                .collect(),
        }
    }
}

/// One day of the insights breakdown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDailyInsight {
    /// The calendar day (UTC).
    pub date: NaiveDate,
    /// Mean event score that day.
    pub average_score: f64,
    /// Events logged that day.
    pub event_count: u64,
}

impl From<DailyInsight> for ApiDailyInsight {
    fn from(daily: DailyInsight) -> Self {
        Self {
            date: daily.date,
            average_score: daily.average_score,
            event_count: daily.event_count,
        }
    }
}

/// Response from the insights endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInsightsResponse {
    /// Size of the rolling window in days.
    pub window_days: u32,
    /// Events inside the window.
    pub event_count: u64,
    /// Mean score over the window.
    pub average_score: Option<f64>,
    /// Tier of the mean score.
    pub risk_level: Option<RiskLevel>,
    /// Per-day breakdown, oldest first.
    pub daily: Vec<ApiDailyInsight>,
}

impl From<InsightsSummary> for ApiInsightsResponse {
    fn from(insights: InsightsSummary) -> Self {
        Self {
            window_days: insights.window_days,
            event_count: insights.event_count,
            average_score: insights.average_score,
            risk_level: insights.risk_level,
            daily: insights.daily.into_iter().map(ApiDailyInsight::from).collect(),
        }
    }
}
