//! Merging, deduplication, and summary statistics for provider results.

use std::collections::HashSet;

use haze_map_poi_models::{METRIC_AQI, METRIC_PM25, StationRecord};

use crate::QuerySummary;

/// Coordinate rounding used in the dedup key: 4 decimal degrees ≈ 11 m.
const DEDUP_PRECISION: usize = 4;

/// Collapses the same physical POI reported by multiple sources.
///
/// The composite key is the trimmed, lowercased name plus coordinates
/// rounded to [`DEDUP_PRECISION`] decimal places. The first record seen for
/// a key wins; later duplicates are dropped without field-level merging.
pub(crate) fn dedup_records(records: Vec<StationRecord>) -> Vec<StationRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(dedup_key(record)))
        .collect()
}

fn dedup_key(record: &StationRecord) -> String {
    format!(
        "{}|{:.precision$}|{:.precision$}",
        record.name.trim().to_lowercase(),
        record.location.lat,
        record.location.lon,
        precision = DEDUP_PRECISION,
    )
}

/// Computes the summary block over the records being returned.
///
/// Statistics cover the composite `aqi` metric, falling back to `pm25` for
/// result sets where no station reports an AQI (e.g. pure sensor-network
/// coverage). Stations without a value for the chosen metric are excluded
/// from the statistics but still counted in `total_stations`.
pub(crate) fn summarize(records: &[StationRecord]) -> QuerySummary {
    let mut values = metric_values(records, METRIC_AQI);
    if values.is_empty() {
        values = metric_values(records, METRIC_PM25);
    }

    let (average, min, max) = if values.is_empty() {
        (None, None, None)
    } else {
        #[allow(clippy::cast_precision_loss)]
        let average = values.iter().sum::<f64>() / values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (Some(average), Some(min), Some(max))
    };

    QuerySummary {
        total_stations: records.len(),
        average_metric: average,
        min_metric: min,
        max_metric: max,
    }
}

fn metric_values(records: &[StationRecord], key: &str) -> Vec<f64> {
    records
        .iter()
        .filter_map(|record| record.metrics.get(key).copied().flatten())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use haze_map_geo::GeoPoint;
    use haze_map_poi_models::{METRIC_AQI, PoiCategory, SourceId};

    use super::*;

    fn record(name: &str, lat: f64, lon: f64, source: SourceId, aqi: Option<f64>) -> StationRecord {
        let mut metrics = BTreeMap::new();
        metrics.insert(METRIC_AQI.to_string(), aqi);
        StationRecord {
            id: format!("{source}:{name}"),
            name: name.to_string(),
            location: GeoPoint::new(lat, lon).unwrap(),
            category: PoiCategory::AirQualityStation,
            metrics,
            phone: None,
            hours: None,
            updated_at: None,
            distance_meters: None,
            source,
        }
    }

    #[test]
    fn collapses_same_poi_across_sources() {
        let records = vec![
            record("Cheras", 3.1412, 101.6865, SourceId::AqiIndex, Some(60.0)),
            // Same name, coordinates differ past the 4th decimal.
            record("Cheras", 3.141_24, 101.686_53, SourceId::SensorNetwork, Some(55.0)),
            record("Ampang", 3.15, 101.76, SourceId::AqiIndex, Some(40.0)),
        ];

        let unique = dedup_records(records);
        assert_eq!(unique.len(), 2);
        // First seen wins; no field merge.
        assert_eq!(unique[0].source, SourceId::AqiIndex);
        assert_eq!(unique[0].metrics.get(METRIC_AQI), Some(&Some(60.0)));
    }

    #[test]
    fn distinct_names_at_same_coordinates_survive() {
        let records = vec![
            record("Station A", 3.1412, 101.6865, SourceId::AqiIndex, Some(60.0)),
            record("Station B", 3.1412, 101.6865, SourceId::AqiIndex, Some(61.0)),
        ];

        assert_eq!(dedup_records(records).len(), 2);
    }

    #[test]
    fn name_comparison_ignores_case_and_whitespace() {
        let records = vec![
            record("  Cheras ", 3.1412, 101.6865, SourceId::AqiIndex, Some(60.0)),
            record("CHERAS", 3.1412, 101.6865, SourceId::SensorNetwork, Some(55.0)),
        ];

        assert_eq!(dedup_records(records).len(), 1);
    }

    #[test]
    fn summary_covers_reporting_stations_only() {
        let records = vec![
            record("A", 3.1, 101.6, SourceId::AqiIndex, Some(60.0)),
            record("B", 3.2, 101.7, SourceId::AqiIndex, Some(40.0)),
            record("C", 3.3, 101.8, SourceId::AqiIndex, None),
        ];

        let summary = summarize(&records);
        assert_eq!(summary.total_stations, 3);
        assert_eq!(summary.average_metric, Some(50.0));
        assert_eq!(summary.min_metric, Some(40.0));
        assert_eq!(summary.max_metric, Some(60.0));
    }

    #[test]
    fn empty_results_have_no_statistics() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_stations, 0);
        assert_eq!(summary.average_metric, None);
        assert_eq!(summary.min_metric, None);
        assert_eq!(summary.max_metric, None);
    }
}
