#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Best-effort fusion of POI queries across upstream providers.
//!
//! A query comes in as a point+radius or a bounding box. The aggregator
//! answers from its injected TTL caches when it can; otherwise it fans out
//! to every relevant provider concurrently (each under a timeout, with
//! sequential pagination inside one provider), merges and dedupes the
//! results, annotates exact distances, filters radius queries to the true
//! radius, sorts, caches the full set, and returns the truncated view.
//!
//! Provider failure is never fatal: a failed or timed-out provider
//! contributes nothing and is counted in the coverage block, and a query
//! where every provider failed returns an explicit empty result.

mod merge;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future;
use haze_map_cache::TtlCache;
use haze_map_geo::{BoundingBox, GeoPoint, bounding_box_from_radius, distance_meters};
use haze_map_poi_models::{PoiCategory, StationRecord};
use haze_map_provider::{PoiProvider, ProviderError};
use serde::Serialize;

/// Tuning knobs for the aggregator, owned by the process or test harness.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Radius applied when a radius query omits one, in kilometers.
    pub default_radius_km: f64,
    /// Result limit applied when the query omits one.
    pub default_limit: usize,
    /// Maximum pages requested from one provider for one query.
    pub page_cap: u32,
    /// Time allowed for one provider's whole fetch, pagination included.
    pub provider_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_radius_km: 100.0,
            default_limit: 100,
            page_cap: 5,
            provider_timeout: Duration::from_secs(10),
        }
    }
}

/// Errors surfaced to the caller. Provider failures are absorbed into the
/// coverage block instead.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// The query was malformed and no upstream call was made.
    #[error("invalid query: {message}")]
    Validation {
        /// Description of what was rejected.
        message: String,
    },
}

/// A "what is near this point/box" query.
#[derive(Debug, Clone)]
pub struct NearbyQuery {
    /// Query origin; distances are measured from here. For box queries this
    /// is typically the box center.
    pub origin: GeoPoint,
    /// Search radius in kilometers. Ignored when `bbox` is set.
    pub radius_km: Option<f64>,
    /// Explicit bounding box; takes precedence over `radius_km`.
    pub bbox: Option<BoundingBox>,
    /// Maximum records to return.
    pub limit: Option<usize>,
    /// Restrict results to one category.
    pub category: Option<PoiCategory>,
}

/// Summary statistics over the returned records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySummary {
    /// Number of records returned.
    pub total_stations: usize,
    /// Mean of the summary metric over stations reporting it.
    pub average_metric: Option<f64>,
    /// Minimum of the summary metric.
    pub min_metric: Option<f64>,
    /// Maximum of the summary metric.
    pub max_metric: Option<f64>,
}

/// Freshness/coverage indicator: how much of the provider fleet answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    /// Providers invoked for this query (0 on a cache hit).
    pub providers_queried: usize,
    /// Providers that failed or timed out.
    pub providers_failed: usize,
    /// Whether the result was served from cache.
    pub cache_hit: bool,
}

/// The answer to a nearby query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Matching records, ascending by distance, truncated to the limit.
    pub records: Vec<StationRecord>,
    /// Statistics over `records`.
    pub summary: QuerySummary,
    /// Coverage indicator.
    pub coverage: Coverage,
}

/// The normalized shape of a query: an exact radius or an explicit box.
#[derive(Debug, Clone, Copy)]
enum QueryShape {
    Radius(f64),
    Box(BoundingBox),
}

/// Cached payload: the full post-filter, sorted result set for a query key.
type CachedRecords = Arc<Vec<StationRecord>>;

/// Orchestrates provider fan-out, merging, and caching for nearby queries.
///
/// Both caches are injected so their lifecycle (and isolation in tests) is
/// owned by the caller: live pollutant readings churn quickly and get the
/// shorter TTL; facility metadata barely changes and gets the longer one.
pub struct Aggregator {
    providers: Vec<Arc<dyn PoiProvider>>,
    live_cache: Arc<TtlCache<CachedRecords>>,
    facility_cache: Arc<TtlCache<CachedRecords>>,
    config: AggregatorConfig,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Aggregator {
    /// Creates an aggregator over the given providers and caches.
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn PoiProvider>>,
        live_cache: Arc<TtlCache<CachedRecords>>,
        facility_cache: Arc<TtlCache<CachedRecords>>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            providers,
            live_cache,
            facility_cache,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Answers a nearby query with best-effort fusion across providers.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::Validation`] for malformed input. Provider
    /// failures never error — they reduce coverage.
    pub async fn nearby(&self, query: &NearbyQuery) -> Result<QueryOutcome, AggregatorError> {
        validate(query)?;

        let limit = query.limit.unwrap_or(self.config.default_limit);
        let shape = match query.bbox {
            Some(bbox) => QueryShape::Box(bbox),
            None => QueryShape::Radius(query.radius_km.unwrap_or(self.config.default_radius_km)),
        };

        // A degenerate radius matches nothing; not worth an upstream call
        // or a cache slot.
        if let QueryShape::Radius(radius_km) = shape
            && radius_km <= 0.0
        {
            return Ok(Self::outcome(Vec::new(), 0, 0, false));
        }

        let key = canonical_key(query, shape);
        let cache = self.cache_for(query.category);

        if let Some(records) = cache.get(&key) {
            return Ok(Self::outcome(view(&records, limit), 0, 0, true));
        }

        // Collapse concurrent identical queries into one upstream fan-out:
        // the first caller fetches under the per-key gate, the rest wake up
        // and hit the freshly filled cache.
        let gate = {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            Arc::clone(
                in_flight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let permit = gate.lock().await;

        if let Some(records) = cache.get(&key) {
            return Ok(Self::outcome(view(&records, limit), 0, 0, true));
        }

        let bbox = match shape {
            QueryShape::Box(bbox) => bbox,
            QueryShape::Radius(radius_km) => bounding_box_from_radius(query.origin, radius_km),
        };

        let (merged, queried, failed) = self.fan_out(&bbox, limit, query.category).await;

        let mut records = merge::dedup_records(merged);
        for record in &mut records {
            record.distance_meters = Some(distance_meters(query.origin, record.location));
        }
        if let QueryShape::Radius(radius_km) = shape {
            // The bounding box over-approximates the circle; enforce
            // exactness here.
            let radius_meters = radius_km * 1000.0;
            records.retain(|r| r.distance_meters.unwrap_or(f64::MAX) <= radius_meters);
        }
        records.sort_by(|a, b| {
            a.distance_meters
                .unwrap_or(f64::MAX)
                .total_cmp(&b.distance_meters.unwrap_or(f64::MAX))
        });

        // Cache the full pre-truncation set so a later query against the
        // same key with a larger limit is still a hit.
        let full = Arc::new(records);
        cache.put(key.clone(), Arc::clone(&full));

        drop(permit);
        self.in_flight
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&key);

        Ok(Self::outcome(view(&full, limit), queried, failed, false))
    }

    /// Invokes every relevant provider concurrently, each under the
    /// per-provider timeout, and flattens the successful contributions.
    async fn fan_out(
        &self,
        bbox: &BoundingBox,
        limit: usize,
        category: Option<PoiCategory>,
    ) -> (Vec<StationRecord>, usize, usize) {
        let relevant: Vec<Arc<dyn PoiProvider>> = self
            .providers
            .iter()
            .filter(|provider| provider.serves(category))
            .map(Arc::clone)
            .collect();

        let timeout = self.config.provider_timeout;
        let page_cap = self.config.page_cap;

        let fetches = relevant.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                match tokio::time::timeout(
                    timeout,
                    fetch_provider(provider.as_ref(), bbox, limit, page_cap),
                )
                .await
                {
                    Ok(Ok(records)) => Some(records),
                    Ok(Err(e)) => {
                        log::warn!("{}: query failed: {e}", provider.name());
                        None
                    }
                    Err(_) => {
                        log::warn!("{}: timed out after {timeout:?}", provider.name());
                        None
                    }
                }
            }
        });

        let results = future::join_all(fetches).await;
        let queried = results.len();
        let failed = results.iter().filter(|r| r.is_none()).count();
        let merged = results.into_iter().flatten().flatten().collect();

        (merged, queried, failed)
    }

    /// Live readings expire quickly; facility metadata churns far less.
    fn cache_for(&self, category: Option<PoiCategory>) -> &TtlCache<CachedRecords> {
        if category.is_some_and(PoiCategory::is_facility) {
            &self.facility_cache
        } else {
            &self.live_cache
        }
    }

    fn outcome(
        records: Vec<StationRecord>,
        providers_queried: usize,
        providers_failed: usize,
        cache_hit: bool,
    ) -> QueryOutcome {
        let summary = merge::summarize(&records);
        QueryOutcome {
            records,
            summary,
            coverage: Coverage {
                providers_queried,
                providers_failed,
                cache_hit,
            },
        }
    }
}

/// Drives one provider through its pages sequentially (each cursor depends
/// on the previous page), stopping at the page cap or once the provider has
/// contributed `2 × limit` records — whichever comes first bounds the
/// worst-case upstream calls.
async fn fetch_provider(
    provider: &dyn PoiProvider,
    bbox: &BoundingBox,
    limit: usize,
    page_cap: u32,
) -> Result<Vec<StationRecord>, ProviderError> {
    let page_limit = u64::try_from(limit).unwrap_or(u64::MAX);
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..page_cap {
        let page = provider.search(bbox, page_limit, cursor.as_deref()).await?;
        records.extend(page.records);

        if records.len() >= limit.saturating_mul(2) {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(records)
}

fn view(records: &[StationRecord], limit: usize) -> Vec<StationRecord> {
    records.iter().take(limit).cloned().collect()
}

fn validate(query: &NearbyQuery) -> Result<(), AggregatorError> {
    if let Some(radius_km) = query.radius_km
        && !radius_km.is_finite()
    {
        return Err(AggregatorError::Validation {
            message: format!("radius must be finite, got {radius_km}"),
        });
    }

    if let Some(bbox) = query.bbox {
        let finite = bbox.north.is_finite()
            && bbox.south.is_finite()
            && bbox.east.is_finite()
            && bbox.west.is_finite();
        if !finite || bbox.north <= bbox.south || bbox.east < bbox.west {
            return Err(AggregatorError::Validation {
                message: format!(
                    "malformed bounding box: west={}, south={}, east={}, north={}",
                    bbox.west, bbox.south, bbox.east, bbox.north
                ),
            });
        }
    }

    Ok(())
}

/// Canonical cache/in-flight key for a query shape.
///
/// Coordinates are rounded to 4 decimal places. The key deliberately
/// excludes the limit: the cache stores the full result set, so any limit
/// can be served from the same entry.
fn canonical_key(query: &NearbyQuery, shape: QueryShape) -> String {
    let category = query
        .category
        .map_or_else(|| "any".to_string(), |c| c.to_string());

    match shape {
        QueryShape::Radius(radius_km) => format!(
            "pt:{:.4},{:.4}:r{radius_km:.2}:c{category}",
            query.origin.lat, query.origin.lon
        ),
        QueryShape::Box(bbox) => format!(
            "box:{:.4},{:.4},{:.4},{:.4}:c{category}",
            bbox.west, bbox.south, bbox.east, bbox.north
        ),
    }
}
