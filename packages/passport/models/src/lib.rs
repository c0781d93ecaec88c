#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Exposure passport types.
//!
//! An [`ExposureEvent`] is one logged set of pollutant readings at a place
//! and time, scored into a [`RiskLevel`]; a [`Profile`] is the per-user
//! running state (points, streaks) those events drive. Events are immutable
//! once written and append-only within a user's history.

use chrono::{DateTime, NaiveDate, Utc};
use haze_map_geo::GeoPoint;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Categorical exposure-risk bucket derived from the numeric score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Score 80-100: exposure within guideline levels
    Low,
    /// Score 50-79: elevated exposure
    Moderate,
    /// Score below 50: unhealthy exposure
    High,
}

impl RiskLevel {
    /// Buckets a 0-100 exposure score. Boundary scores round toward the
    /// safer tier: exactly 80 is `Low`, exactly 50 is `Moderate`.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Low
        } else if score >= 50.0 {
            Self::Moderate
        } else {
            Self::High
        }
    }
}

/// How the user was travelling when the exposure was logged.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelMode {
    /// On foot
    Walk,
    /// Bicycle
    Cycle,
    /// Bus, rail, or other public transport
    Transit,
    /// Private car
    Car,
    /// Motorbike
    Motorbike,
    /// Unreported or unmapped mode
    #[serde(other)]
    Unknown,
}

/// Pollutant readings attached to an exposure log. Each reading is
/// independently optional: `None` means "not measured", never "zero".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollutantReadings {
    /// Fine particulate matter, µg/m³.
    pub pm25: Option<f64>,
    /// Nitrogen dioxide, µg/m³.
    pub no2: Option<f64>,
    /// Carbon monoxide, ppm.
    pub co: Option<f64>,
}

impl PollutantReadings {
    /// Whether any reading was supplied at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pm25.is_none() && self.no2.is_none() && self.co.is_none()
    }
}

/// The scoring engine's verdict for one set of readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// Exposure score, 0 (worst) to 100 (best).
    pub score: f64,
    /// Categorical tier for `score`.
    pub risk_level: RiskLevel,
    /// Deterministic, ordered advisory tips.
    pub tips: Vec<String>,
}

/// One logged exposure. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureEvent {
    /// Opaque event id.
    pub id: String,
    /// Owning profile's user key.
    pub user_key: String,
    /// Where the exposure happened.
    pub location: GeoPoint,
    /// Human-readable place label (e.g. "Jalan Ampang").
    pub location_name: String,
    /// Readings supplied with the log.
    #[serde(flatten)]
    pub readings: PollutantReadings,
    /// Travel mode at log time.
    pub mode: TravelMode,
    /// When the exposure happened.
    pub recorded_at: DateTime<Utc>,
    /// Computed exposure score.
    pub score: f64,
    /// Computed risk tier.
    pub risk_level: RiskLevel,
    /// Computed advisory tips.
    pub tips: Vec<String>,
}

/// Per-user passport state.
///
/// `points` and `best_streak` are monotonic; `streak` moves only through
/// the day-boundary transition in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Stable pseudonymous identifier from the authentication collaborator.
    pub user_key: String,
    /// Display nickname.
    pub nickname: Option<String>,
    /// Home city label.
    pub home_city: Option<String>,
    /// Reward points. Only ever increases.
    pub points: u64,
    /// Consecutive calendar days with at least one logged event.
    pub streak: u32,
    /// High-water mark of `streak`.
    pub best_streak: u32,
    /// Calendar date (in the system streak timezone) of the last logged
    /// event. `None` = never active.
    pub last_active_date: Option<NaiveDate>,
}

impl Profile {
    /// A fresh profile for a user with no history.
    #[must_use]
    pub const fn new(user_key: String) -> Self {
        Self {
            user_key,
            nickname: None,
            home_city: None,
            points: 0,
            streak: 0,
            best_streak: 0,
            last_active_date: None,
        }
    }
}

/// Result of applying one exposure log to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOutcome {
    /// Score for this event.
    pub score: f64,
    /// Risk tier for this event.
    pub risk_level: RiskLevel,
    /// Advisory tips for this event.
    pub tips: Vec<String>,
    /// Streak after the transition.
    pub streak: u32,
    /// Best streak after the transition.
    pub best_streak: u32,
    /// Total points after the award.
    pub points: u64,
}

/// The read-side passport view: profile plus recent history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Passport {
    /// Current profile state.
    pub profile: Profile,
    /// Most recent events, newest first.
    pub recent_events: Vec<ExposureEvent>,
}

/// Average score and activity for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyInsight {
    /// The calendar day (system streak timezone).
    pub date: NaiveDate,
    /// Mean event score that day.
    pub average_score: f64,
    /// Events logged that day.
    pub event_count: u64,
}

/// Rolling aggregation over the most recent days of history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightsSummary {
    /// Size of the rolling window in days.
    pub window_days: u32,
    /// Events inside the window.
    pub event_count: u64,
    /// Mean score over the window, when any events exist.
    pub average_score: Option<f64>,
    /// Tier of `average_score`, when any events exist.
    pub risk_level: Option<RiskLevel>,
    /// Per-day breakdown, oldest first.
    pub daily: Vec<DailyInsight>,
}
