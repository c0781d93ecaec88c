#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The canonical point-of-interest record and category taxonomy.
//!
//! Every upstream provider (air-quality index service, community sensor
//! network, POI database) maps its source-specific format into
//! [`StationRecord`]. Categories form a closed enum with an explicit
//! [`PoiCategory::Unknown`] fallback rather than free-form strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use haze_map_geo::GeoPoint;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Canonical metric key for the composite air quality index.
pub const METRIC_AQI: &str = "aqi";
/// Canonical metric key for fine particulate matter (µg/m³).
pub const METRIC_PM25: &str = "pm25";
/// Canonical metric key for coarse particulate matter (µg/m³).
pub const METRIC_PM10: &str = "pm10";
/// Canonical metric key for nitrogen dioxide (µg/m³).
pub const METRIC_NO2: &str = "no2";
/// Canonical metric key for carbon monoxide (ppm).
pub const METRIC_CO: &str = "co";
/// Canonical metric key for ozone (µg/m³).
pub const METRIC_O3: &str = "o3";
/// Canonical metric key for the facility emergency-department flag
/// (1.0 = has one, 0.0 = explicitly none; absent = unreported).
pub const METRIC_EMERGENCY: &str = "emergency";

/// The upstream provider a record came from.
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
pub enum SourceId {
    /// Air-quality index aggregation service
    AqiIndex,
    /// Community-operated sensor network
    SensorNetwork,
    /// Points-of-interest database (healthcare facilities)
    PoiDirectory,
}

/// The kind of point of interest a record describes.
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
pub enum PoiCategory {
    /// Fixed air-quality monitoring station
    AirQualityStation,
    /// Hospital
    Hospital,
    /// Outpatient clinic or doctor's practice
    Clinic,
    /// Pharmacy or chemist
    Pharmacy,
    /// Community health center
    HealthCenter,
    /// Unmapped upstream category
    Unknown,
}

impl PoiCategory {
    /// Whether this category is a healthcare facility (as opposed to a
    /// monitoring station).
    #[must_use]
    pub const fn is_facility(self) -> bool {
        matches!(
            self,
            Self::Hospital | Self::Clinic | Self::Pharmacy | Self::HealthCenter
        )
    }
}

/// Maps a raw upstream amenity/healthcare tag to the canonical category.
///
/// Case-insensitive keyword matching; returns [`PoiCategory::Unknown`] when
/// no mapping can be determined.
#[must_use]
pub fn map_amenity(raw: &str) -> PoiCategory {
    let lower = raw.to_lowercase();

    if contains_any(&lower, &["hospital"]) {
        return PoiCategory::Hospital;
    }
    if contains_any(&lower, &["pharmacy", "chemist", "dispensary"]) {
        return PoiCategory::Pharmacy;
    }
    if contains_any(
        &lower,
        &["health_centre", "health centre", "health center", "centre", "community_health"],
    ) {
        return PoiCategory::HealthCenter;
    }
    if contains_any(&lower, &["clinic", "doctors", "doctor", "gp"]) {
        return PoiCategory::Clinic;
    }
    if contains_any(&lower, &["monitoring", "air_quality", "air quality"]) {
        return PoiCategory::AirQualityStation;
    }

    PoiCategory::Unknown
}

/// Checks if `haystack` contains any of the given `needles`.
fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// A point of interest normalized to the canonical schema.
///
/// Constructed fresh on every aggregator cache miss and never mutated
/// afterwards; the record is discarded when the owning cache entry expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationRecord {
    /// Stable identifier: source tag plus the provider-native id, or a
    /// rounded-coordinate form (see [`synthetic_id`]) when the provider has
    /// no native id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Location (WGS84).
    pub location: GeoPoint,
    /// Canonical category.
    pub category: PoiCategory,
    /// Named metrics: pollutant concentrations or numeric facility
    /// attributes. `None` means the provider reported the metric without a
    /// usable value.
    pub metrics: BTreeMap<String, Option<f64>>,
    /// Contact phone, for facilities that publish one.
    pub phone: Option<String>,
    /// Opening hours, for facilities that publish them.
    pub hours: Option<String>,
    /// When the provider last refreshed this record. `None` when the
    /// upstream does not report freshness.
    pub updated_at: Option<DateTime<Utc>>,
    /// Distance from the query origin in meters. Computed per query by the
    /// aggregator, never persisted.
    pub distance_meters: Option<f64>,
    /// Which provider supplied this record.
    pub source: SourceId,
}

/// Builds the stable id for a record whose provider has no native id:
/// the source tag plus coordinates rounded to 4 decimal places (~11 m).
#[must_use]
pub fn synthetic_id(source: SourceId, location: GeoPoint) -> String {
    format!("{source}:{:.4},{:.4}", location.lat, location.lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_osm_amenity_tags() {
        assert_eq!(map_amenity("hospital"), PoiCategory::Hospital);
        assert_eq!(map_amenity("pharmacy"), PoiCategory::Pharmacy);
        assert_eq!(map_amenity("chemist"), PoiCategory::Pharmacy);
        assert_eq!(map_amenity("clinic"), PoiCategory::Clinic);
        assert_eq!(map_amenity("doctors"), PoiCategory::Clinic);
        assert_eq!(map_amenity("health_centre"), PoiCategory::HealthCenter);
        assert_eq!(map_amenity("HOSPITAL"), PoiCategory::Hospital);
    }

    #[test]
    fn unknown_fallback() {
        assert_eq!(map_amenity("veterinary"), PoiCategory::Unknown);
        assert_eq!(map_amenity(""), PoiCategory::Unknown);
    }

    #[test]
    fn facility_split() {
        assert!(PoiCategory::Hospital.is_facility());
        assert!(PoiCategory::Pharmacy.is_facility());
        assert!(!PoiCategory::AirQualityStation.is_facility());
        assert!(!PoiCategory::Unknown.is_facility());
    }

    #[test]
    fn synthetic_ids_round_to_four_decimals() {
        let location = GeoPoint::new(3.139_04, 101.686_92).unwrap();
        assert_eq!(
            synthetic_id(SourceId::SensorNetwork, location),
            "SENSOR_NETWORK:3.1390,101.6869"
        );
    }

    #[test]
    fn category_serializes_screaming_snake() {
        let json = serde_json::to_string(&PoiCategory::AirQualityStation).unwrap();
        assert_eq!(json, "\"AIR_QUALITY_STATION\"");
        assert_eq!(
            "HEALTH_CENTER".parse::<PoiCategory>().unwrap(),
            PoiCategory::HealthCenter
        );
    }
}
