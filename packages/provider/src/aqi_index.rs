//! Air-quality index service adapter.
//!
//! Queries the WAQI-style `map/bounds` endpoint, which returns every
//! monitoring station inside a bounding box together with its composite AQI
//! reading. The upstream does not paginate — one request covers the box.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haze_map_geo::{BoundingBox, GeoPoint};
use haze_map_poi_models::{METRIC_AQI, PoiCategory, SourceId, StationRecord};
use serde_json::Value;

use crate::{PoiProvider, ProviderDefinition, ProviderError, SearchPage};

/// Adapter for the air-quality index aggregation service.
pub struct AqiIndexProvider {
    name: String,
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl AqiIndexProvider {
    /// Builds the adapter from its endpoint definition. The API token comes
    /// from the configured env var, falling back to the public demo token.
    #[must_use]
    pub fn new(definition: &ProviderDefinition, client: reqwest::Client) -> Self {
        Self {
            name: definition.name.clone(),
            base_url: definition.resolved_base_url(),
            token: definition
                .resolved_token()
                .unwrap_or_else(|| "demo".to_string()),
            client,
        }
    }
}

#[async_trait]
impl PoiProvider for AqiIndexProvider {
    fn id(&self) -> SourceId {
        SourceId::AqiIndex
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn serves(&self, category: Option<PoiCategory>) -> bool {
        category.is_none_or(|c| c == PoiCategory::AirQualityStation)
    }

    async fn search(
        &self,
        bbox: &BoundingBox,
        limit: u64,
        _cursor: Option<&str>,
    ) -> Result<SearchPage, ProviderError> {
        let url = format!(
            "{}/map/bounds?latlng={},{},{},{}&token={}",
            self.base_url, bbox.south, bbox.west, bbox.north, bbox.east, self.token
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::UpstreamStatus {
                status: response.status().as_u16(),
            });
        }

        let body: Value = response.json().await?;
        if body.get("status").and_then(Value::as_str) != Some("ok") {
            return Err(ProviderError::UpstreamPayload {
                message: format!(
                    "status field was {:?}, expected \"ok\"",
                    body.get("status")
                ),
            });
        }

        let data = body
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::new();
        for entry in &data {
            if let Some(record) = parse_station(entry) {
                records.push(record);
            } else {
                log::warn!("{}: skipping malformed station entry", self.name);
            }
        }

        let total = u64::try_from(records.len()).unwrap_or(u64::MAX);
        records.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(SearchPage {
            records,
            total_available: Some(total),
            next_cursor: None,
        })
    }
}

/// Maps one raw station entry into the canonical record.
///
/// Returns `None` (caller skips and logs) when coordinates or the station
/// name are missing or invalid. An unreadable AQI value (the upstream sends
/// `"-"` for stations that are up but not reporting) is kept as a metric
/// with no value.
fn parse_station(entry: &Value) -> Option<StationRecord> {
    let lat = entry.get("lat").and_then(Value::as_f64)?;
    let lon = entry.get("lon").and_then(Value::as_f64)?;
    let location = GeoPoint::new(lat, lon).ok()?;

    let station = entry.get("station")?;
    let name = station.get("name").and_then(Value::as_str)?.to_string();

    let id = entry.get("uid").and_then(Value::as_i64).map_or_else(
        || haze_map_poi_models::synthetic_id(SourceId::AqiIndex, location),
        |uid| format!("{}:{uid}", SourceId::AqiIndex),
    );

    let updated_at = station
        .get("time")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let mut metrics = std::collections::BTreeMap::new();
    metrics.insert(METRIC_AQI.to_string(), parse_aqi(entry.get("aqi")));

    Some(StationRecord {
        id,
        name,
        location,
        category: PoiCategory::AirQualityStation,
        metrics,
        phone: None,
        hours: None,
        updated_at,
        distance_meters: None,
        source: SourceId::AqiIndex,
    })
}

/// The upstream reports AQI as a number or a numeric string, with `"-"`
/// meaning no current reading.
fn parse_aqi(raw: Option<&Value>) -> Option<f64> {
    match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_complete_station() {
        let entry = json!({
            "lat": 3.139,
            "lon": 101.6869,
            "uid": 1451,
            "aqi": "57",
            "station": {
                "name": "Kuala Lumpur City Centre",
                "time": "2026-08-07T10:00:00+08:00"
            }
        });

        let record = parse_station(&entry).unwrap();
        assert_eq!(record.id, "AQI_INDEX:1451");
        assert_eq!(record.name, "Kuala Lumpur City Centre");
        assert_eq!(record.category, PoiCategory::AirQualityStation);
        assert_eq!(record.source, SourceId::AqiIndex);
        assert_eq!(record.metrics.get(METRIC_AQI), Some(&Some(57.0)));
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn keeps_station_without_reading() {
        let entry = json!({
            "lat": 3.2,
            "lon": 101.7,
            "uid": 9,
            "aqi": "-",
            "station": { "name": "Batu Muda" }
        });

        let record = parse_station(&entry).unwrap();
        assert_eq!(record.metrics.get(METRIC_AQI), Some(&None));
        assert!(record.updated_at.is_none());
    }

    #[test]
    fn skips_entry_without_coordinates_or_name() {
        assert!(parse_station(&json!({ "uid": 1, "station": { "name": "x" } })).is_none());
        assert!(parse_station(&json!({ "lat": 3.0, "lon": 101.0, "station": {} })).is_none());
        // Out-of-range coordinates fail closed too.
        assert!(
            parse_station(&json!({
                "lat": 123.0,
                "lon": 101.0,
                "station": { "name": "bad" }
            }))
            .is_none()
        );
    }

    #[test]
    fn falls_back_to_synthetic_id() {
        let entry = json!({
            "lat": 3.1111,
            "lon": 101.2222,
            "aqi": 40,
            "station": { "name": "No UID" }
        });

        let record = parse_station(&entry).unwrap();
        assert_eq!(record.id, "AQI_INDEX:3.1111,101.2222");
    }
}
