//! Community sensor network adapter.
//!
//! Queries an OpenAQ-style `measurements` endpoint. The upstream returns one
//! row per (location, parameter) measurement and paginates by page number;
//! this adapter folds the rows into one canonical station per location and
//! drives pagination through the opaque cursor in [`SearchPage`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use haze_map_geo::{BoundingBox, GeoPoint};
use haze_map_poi_models::{
    METRIC_CO, METRIC_NO2, METRIC_O3, METRIC_PM10, METRIC_PM25, PoiCategory, SourceId,
    StationRecord, synthetic_id,
};
use serde_json::Value;

use crate::{PoiProvider, ProviderDefinition, ProviderError, SearchPage};

/// Default page size when the endpoint definition does not set one.
const DEFAULT_PAGE_SIZE: u64 = 100;

/// µg/m³ per ppm of carbon monoxide at 25 °C, 1 atm. The canonical CO
/// metric is in ppm; some network nodes report µg/m³.
const CO_UG_PER_PPM: f64 = 1_145.0;

/// µg/m³ per ppm of nitrogen dioxide at 25 °C, 1 atm. The canonical NO₂
/// metric is in µg/m³; some network nodes report ppm.
const NO2_UG_PER_PPM: f64 = 1_880.0;

/// Adapter for the community-operated sensor network.
pub struct SensorNetworkProvider {
    name: String,
    base_url: String,
    page_size: u64,
    client: reqwest::Client,
}

impl SensorNetworkProvider {
    /// Builds the adapter from its endpoint definition.
    #[must_use]
    pub fn new(definition: &ProviderDefinition, client: reqwest::Client) -> Self {
        Self {
            name: definition.name.clone(),
            base_url: definition.resolved_base_url(),
            page_size: definition.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            client,
        }
    }
}

#[async_trait]
impl PoiProvider for SensorNetworkProvider {
    fn id(&self) -> SourceId {
        SourceId::SensorNetwork
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
        cursor: Option<&str>,
    ) -> Result<SearchPage, ProviderError> {
        let page = cursor.and_then(|c| c.parse::<u64>().ok()).unwrap_or(1);
        let page_size = self.page_size.min(limit.max(1));

        let url = format!(
            "{}/measurements?bbox={},{},{},{}&page={page}&limit={page_size}&sort=desc",
            self.base_url, bbox.west, bbox.south, bbox.east, bbox.north
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::UpstreamStatus {
                status: response.status().as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let row_count = u64::try_from(results.len()).unwrap_or(u64::MAX);
        let records = fold_measurements(&results, |skipped| {
            log::warn!("{}: skipping malformed measurement: {skipped}", self.name);
        });

        let found = body
            .get("meta")
            .and_then(|meta| meta.get("found"))
            .and_then(parse_found);

        // `found` counts measurement rows, not folded stations; when the
        // upstream omits it, a full page implies more may follow.
        let has_more = found.map_or(row_count == page_size, |total| page * page_size < total);

        Ok(SearchPage {
            records,
            total_available: found,
            next_cursor: has_more.then(|| (page + 1).to_string()),
        })
    }
}

/// The `meta.found` field is a number for small result sets and a string
/// like `">10000"` for large ones.
fn parse_found(raw: &Value) -> Option<u64> {
    match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim_start_matches('>').trim().parse().ok(),
        _ => None,
    }
}

/// Folds per-parameter measurement rows into one station per location.
///
/// Rows arrive newest-first; the first value seen for a (location,
/// parameter) pair wins. Rows without a recognised parameter, coordinates,
/// or location name are skipped via `on_skip`.
fn fold_measurements(results: &[Value], mut on_skip: impl FnMut(&str)) -> Vec<StationRecord> {
    let mut stations: BTreeMap<String, StationRecord> = BTreeMap::new();

    for row in results {
        let Some((location_name, point, metric, value, observed_at)) = parse_measurement(row)
        else {
            on_skip(&row.to_string());
            continue;
        };

        let station = stations.entry(location_name.clone()).or_insert_with(|| {
            StationRecord {
                id: synthetic_id(SourceId::SensorNetwork, point),
                name: location_name,
                location: point,
                category: PoiCategory::AirQualityStation,
                metrics: BTreeMap::new(),
                phone: None,
                hours: None,
                updated_at: observed_at,
                distance_meters: None,
                source: SourceId::SensorNetwork,
            }
        });

        station.metrics.entry(metric).or_insert(Some(value));
        if station.updated_at.is_none() {
            station.updated_at = observed_at;
        }
    }

    stations.into_values().collect()
}

/// Parses one measurement row into its station fold inputs.
fn parse_measurement(row: &Value) -> Option<(String, GeoPoint, String, f64, Option<DateTime<Utc>>)> {
    let location_name = row.get("location").and_then(Value::as_str)?.to_string();

    let coordinates = row.get("coordinates")?;
    let lat = coordinates.get("latitude").and_then(Value::as_f64)?;
    let lon = coordinates.get("longitude").and_then(Value::as_f64)?;
    let point = GeoPoint::new(lat, lon).ok()?;

    let parameter = row.get("parameter").and_then(Value::as_str)?;
    let unit = row.get("unit").and_then(Value::as_str).unwrap_or_default();
    let raw_value = row.get("value").and_then(Value::as_f64)?;
    let (metric, value) = canonical_metric(parameter, unit, raw_value)?;

    let observed_at = row
        .get("date")
        .and_then(|d| d.get("utc"))
        .or_else(|| row.get("lastUpdated"))
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some((location_name, point, metric, value, observed_at))
}

/// Maps an upstream (parameter, unit) pair onto the canonical metric key,
/// converting between ppm and µg/m³ where the network's unit differs from
/// the canonical one. Unrecognised parameters are dropped.
fn canonical_metric(parameter: &str, unit: &str, value: f64) -> Option<(String, f64)> {
    let is_ppm = unit.eq_ignore_ascii_case("ppm");
    match parameter.to_lowercase().as_str() {
        "pm25" | "pm2.5" => Some((METRIC_PM25.to_string(), value)),
        "pm10" => Some((METRIC_PM10.to_string(), value)),
        "no2" => {
            let value = if is_ppm { value * NO2_UG_PER_PPM } else { value };
            Some((METRIC_NO2.to_string(), value))
        }
        "co" => {
            let value = if is_ppm { value } else { value / CO_UG_PER_PPM };
            Some((METRIC_CO.to_string(), value))
        }
        "o3" => Some((METRIC_O3.to_string(), value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn measurement(location: &str, parameter: &str, value: f64, unit: &str) -> Value {
        json!({
            "location": location,
            "parameter": parameter,
            "value": value,
            "unit": unit,
            "coordinates": { "latitude": 3.1412, "longitude": 101.6865 },
            "date": { "utc": "2026-08-07T02:00:00+00:00" }
        })
    }

    #[test]
    fn folds_parameters_into_one_station() {
        let rows = vec![
            measurement("Cheras", "pm25", 18.5, "µg/m³"),
            measurement("Cheras", "no2", 22.0, "µg/m³"),
            measurement("Cheras", "pm25", 30.0, "µg/m³"), // older row, first wins
        ];

        let records = fold_measurements(&rows, |_| panic!("nothing should be skipped"));
        assert_eq!(records.len(), 1);

        let station = &records[0];
        assert_eq!(station.name, "Cheras");
        assert_eq!(station.id, "SENSOR_NETWORK:3.1412,101.6865");
        assert_eq!(station.metrics.get(METRIC_PM25), Some(&Some(18.5)));
        assert_eq!(station.metrics.get(METRIC_NO2), Some(&Some(22.0)));
        assert!(station.updated_at.is_some());
    }

    #[test]
    fn converts_co_to_ppm() {
        let rows = vec![measurement("Ampang", "co", 2_290.0, "µg/m³")];
        let records = fold_measurements(&rows, |_| panic!("nothing should be skipped"));

        let co = records[0].metrics.get(METRIC_CO).unwrap().unwrap();
        assert!((co - 2.0).abs() < 0.01);
    }

    #[test]
    fn skips_rows_without_coordinates_or_parameter() {
        let mut skipped = 0;
        let rows = vec![
            json!({ "location": "NoCoords", "parameter": "pm25", "value": 9.0 }),
            measurement("Sentul", "so2", 4.0, "µg/m³"), // unmapped parameter
            measurement("Sentul", "pm25", 11.0, "µg/m³"),
        ];

        let records = fold_measurements(&rows, |_| skipped += 1);
        assert_eq!(skipped, 2);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Sentul");
    }

    #[test]
    fn found_field_parses_both_shapes() {
        assert_eq!(parse_found(&json!(1234)), Some(1234));
        assert_eq!(parse_found(&json!(">10000")), Some(10_000));
        assert_eq!(parse_found(&json!(null)), None);
    }
}
