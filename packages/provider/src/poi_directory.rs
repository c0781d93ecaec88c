//! Points-of-interest database adapter (healthcare facilities).
//!
//! Queries an Overpass-style interpreter endpoint with a generated QL body.
//! Facility attributes (phone, opening hours, emergency department) ride in
//! the record's attribute fields and metric map; the upstream does not
//! paginate, the query itself carries the result cap.

use std::collections::BTreeMap;

use async_trait::async_trait;
use haze_map_geo::{BoundingBox, GeoPoint};
use haze_map_poi_models::{METRIC_EMERGENCY, PoiCategory, SourceId, StationRecord, map_amenity};
use serde_json::Value;

use crate::{PoiProvider, ProviderDefinition, ProviderError, SearchPage};

/// Adapter for the points-of-interest database.
pub struct PoiDirectoryProvider {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl PoiDirectoryProvider {
    /// Builds the adapter from its endpoint definition.
    #[must_use]
    pub fn new(definition: &ProviderDefinition, client: reqwest::Client) -> Self {
        Self {
            name: definition.name.clone(),
            base_url: definition.resolved_base_url(),
            client,
        }
    }
}

#[async_trait]
impl PoiProvider for PoiDirectoryProvider {
    fn id(&self) -> SourceId {
        SourceId::PoiDirectory
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn serves(&self, category: Option<PoiCategory>) -> bool {
        category.is_none_or(PoiCategory::is_facility)
    }

    async fn search(
        &self,
        bbox: &BoundingBox,
        limit: u64,
        _cursor: Option<&str>,
    ) -> Result<SearchPage, ProviderError> {
        let query = build_query(bbox, None, limit);
        self.run_query(&query, limit).await
    }
}

impl PoiDirectoryProvider {
    /// Runs a prepared interpreter query and maps the elements.
    async fn run_query(&self, query: &str, limit: u64) -> Result<SearchPage, ProviderError> {
        let url = format!("{}/api/interpreter", self.base_url);
        let response = self.client.post(&url).body(query.to_string()).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::UpstreamStatus {
                status: response.status().as_u16(),
            });
        }

        let body: Value = response.json().await?;
        let elements = body
            .get("elements")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::new();
        for element in &elements {
            match parse_element(element) {
                Some(record) => records.push(record),
                // Unnamed map features are routine, not payload damage.
                None => log::debug!("{}: skipping unusable element", self.name),
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

/// Builds the interpreter query body for a bounding box and optional
/// category filter. The result cap is compiled into the query itself.
fn build_query(bbox: &BoundingBox, category: Option<PoiCategory>, limit: u64) -> String {
    let bounds = format!("({},{},{},{})", bbox.south, bbox.west, bbox.north, bbox.east);

    let mut clauses = String::new();
    if let Some(pattern) = amenity_pattern(category) {
        clauses.push_str(&format!(
            "node[\"amenity\"~\"{pattern}\"]{bounds};way[\"amenity\"~\"{pattern}\"]{bounds};"
        ));
    }
    if matches!(category, None | Some(PoiCategory::HealthCenter)) {
        clauses.push_str(&format!(
            "node[\"healthcare\"=\"centre\"]{bounds};way[\"healthcare\"=\"centre\"]{bounds};"
        ));
    }

    format!("[out:json][timeout:25];({clauses});out center {limit};")
}

/// The amenity-tag regex for a category filter; `None` when the category is
/// served purely by the healthcare clauses.
const fn amenity_pattern(category: Option<PoiCategory>) -> Option<&'static str> {
    match category {
        None => Some("^(hospital|clinic|doctors|pharmacy|chemist)$"),
        Some(PoiCategory::Hospital) => Some("^hospital$"),
        Some(PoiCategory::Clinic) => Some("^(clinic|doctors)$"),
        Some(PoiCategory::Pharmacy) => Some("^(pharmacy|chemist)$"),
        _ => None,
    }
}

/// Maps one interpreter element into the canonical record.
///
/// Nodes carry coordinates directly; ways and relations use their computed
/// `center`. Elements without a usable position or a name are skipped.
fn parse_element(element: &Value) -> Option<StationRecord> {
    let position = element
        .get("center")
        .unwrap_or(element);
    let lat = position.get("lat").and_then(Value::as_f64)?;
    let lon = position.get("lon").and_then(Value::as_f64)?;
    let location = GeoPoint::new(lat, lon).ok()?;

    let tags = element.get("tags")?;
    let name = tags.get("name").and_then(Value::as_str)?.to_string();

    let kind = element.get("type").and_then(Value::as_str).unwrap_or("node");
    let id = element.get("id").and_then(Value::as_i64).map_or_else(
        || haze_map_poi_models::synthetic_id(SourceId::PoiDirectory, location),
        |native| format!("{}:{kind}/{native}", SourceId::PoiDirectory),
    );

    let category = match tags.get("amenity").and_then(Value::as_str) {
        Some(amenity) => map_amenity(amenity),
        None => PoiCategory::Unknown,
    };
    let category = if category == PoiCategory::Unknown {
        tags.get("healthcare")
            .and_then(Value::as_str)
            .map_or(PoiCategory::Unknown, map_amenity)
    } else {
        category
    };

    let phone = tags
        .get("phone")
        .or_else(|| tags.get("contact:phone"))
        .and_then(Value::as_str)
        .map(String::from);
    let hours = tags
        .get("opening_hours")
        .and_then(Value::as_str)
        .map(String::from);

    let mut metrics = BTreeMap::new();
    match tags.get("emergency").and_then(Value::as_str) {
        Some("yes") => {
            metrics.insert(METRIC_EMERGENCY.to_string(), Some(1.0));
        }
        Some("no") => {
            metrics.insert(METRIC_EMERGENCY.to_string(), Some(0.0));
        }
        _ => {}
    }

    Some(StationRecord {
        id,
        name,
        location,
        category,
        metrics,
        phone,
        hours,
        updated_at: None,
        distance_meters: None,
        source: SourceId::PoiDirectory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_hospital_node() {
        let element = json!({
            "type": "node",
            "id": 240691682,
            "lat": 3.1702,
            "lon": 101.7029,
            "tags": {
                "amenity": "hospital",
                "name": "Hospital Kuala Lumpur",
                "phone": "+60 3-2615 5555",
                "opening_hours": "24/7",
                "emergency": "yes"
            }
        });

        let record = parse_element(&element).unwrap();
        assert_eq!(record.id, "POI_DIRECTORY:node/240691682");
        assert_eq!(record.name, "Hospital Kuala Lumpur");
        assert_eq!(record.category, PoiCategory::Hospital);
        assert_eq!(record.phone.as_deref(), Some("+60 3-2615 5555"));
        assert_eq!(record.hours.as_deref(), Some("24/7"));
        assert_eq!(record.metrics.get(METRIC_EMERGENCY), Some(&Some(1.0)));
    }

    #[test]
    fn way_uses_center_coordinates() {
        let element = json!({
            "type": "way",
            "id": 77,
            "center": { "lat": 3.1088, "lon": 101.6643 },
            "tags": { "amenity": "pharmacy", "name": "Farmasi Mid Valley" }
        });

        let record = parse_element(&element).unwrap();
        assert_eq!(record.id, "POI_DIRECTORY:way/77");
        assert_eq!(record.category, PoiCategory::Pharmacy);
        assert!((record.location.lat - 3.1088).abs() < 1e-9);
    }

    #[test]
    fn healthcare_tag_backs_up_missing_amenity() {
        let element = json!({
            "type": "node",
            "id": 5,
            "lat": 3.0,
            "lon": 101.5,
            "tags": { "healthcare": "centre", "name": "Klinik Kesihatan Petaling" }
        });

        let record = parse_element(&element).unwrap();
        assert_eq!(record.category, PoiCategory::HealthCenter);
    }

    #[test]
    fn skips_unnamed_elements() {
        let element = json!({
            "type": "node",
            "id": 6,
            "lat": 3.0,
            "lon": 101.5,
            "tags": { "amenity": "clinic" }
        });

        assert!(parse_element(&element).is_none());
    }

    #[test]
    fn unmapped_amenity_falls_back_to_unknown() {
        let element = json!({
            "type": "node",
            "id": 7,
            "lat": 3.0,
            "lon": 101.5,
            "tags": { "amenity": "veterinary", "name": "Klinik Haiwan" }
        });

        assert_eq!(parse_element(&element).unwrap().category, PoiCategory::Unknown);
    }

    #[test]
    fn query_carries_bounds_and_cap() {
        let bbox = BoundingBox::new(101.5, 3.0, 101.9, 3.3);
        let query = build_query(&bbox, Some(PoiCategory::Hospital), 50);

        assert!(query.contains("(3,101.5,3.3,101.9)"));
        assert!(query.contains("^hospital$"));
        assert!(query.contains("out center 50"));
        assert!(!query.contains("healthcare"));
    }
}
