//! HTTP handler functions for the haze map API.

use std::sync::Arc;

use actix_web::{HttpResponse, web};
use haze_map_aggregator::{AggregatorError, NearbyQuery};
use haze_map_geo::{BoundingBox, GeoPoint, zoom_to_approx_radius_km};
use haze_map_passport::{ExposureLog, LedgerError};
use haze_map_passport_models::{PollutantReadings, TravelMode};
use haze_map_poi_models::PoiCategory;
use haze_map_server_models::{
    ApiError, ApiHealth, ApiInsightsResponse, ApiLogOutcome, ApiNearbyResponse,
    ApiPassportResponse, ApiProfile, ExposureLogRequest, InsightsQueryParams, NearbyQueryParams,
    PassportQueryParams, ProfileRequest,
};

use crate::AppState;

/// Recent events returned by the passport endpoint when no limit is given.
const DEFAULT_PASSPORT_EVENTS: usize = 20;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/nearby`
///
/// Fused POI query across all providers: point+radius (or zoom), or an
/// explicit bounding box.
pub async fn nearby(
    state: web::Data<AppState>,
    params: web::Query<NearbyQueryParams>,
) -> HttpResponse {
    let query = match build_query(&params) {
        Ok(query) => query,
        Err(message) => return HttpResponse::BadRequest().json(ApiError::validation(message)),
    };

    match state.aggregator.nearby(&query).await {
        Ok(outcome) => HttpResponse::Ok().json(ApiNearbyResponse::from(outcome)),
        Err(e @ AggregatorError::Validation { .. }) => {
            HttpResponse::BadRequest().json(ApiError::validation(e.to_string()))
        }
    }
}

/// `POST /api/exposure`
///
/// Scores the readings and applies them to the caller's passport. Ledger
/// failures are reported with the `ledger` kind so clients can tell "your
/// event wasn't recorded" apart from an invalid request.
pub async fn log_exposure(
    state: web::Data<AppState>,
    body: web::Json<ExposureLogRequest>,
) -> HttpResponse {
    let request = body.into_inner();

    let location = match GeoPoint::new(request.lat, request.lon) {
        Ok(point) => point,
        Err(e) => return HttpResponse::BadRequest().json(ApiError::validation(e.to_string())),
    };
    let readings = PollutantReadings {
        pm25: request.pm25,
        no2: request.no2,
        co: request.co,
    };
    if let Err(message) = validate_readings(&readings) {
        return HttpResponse::BadRequest().json(ApiError::validation(message));
    }

    let entry = ExposureLog {
        user_key: request.user_key,
        location,
        location_name: request.location_name,
        readings,
        mode: parse_mode(request.mode.as_deref()),
        recorded_at: request.timestamp,
    };

    let ledger = Arc::clone(&state.ledger);
    match web::block(move || ledger.log_exposure(&entry)).await {
        Ok(Ok(outcome)) => HttpResponse::Ok().json(ApiLogOutcome::from(outcome)),
        Ok(Err(LedgerError::Conflict)) => HttpResponse::ServiceUnavailable().json(
            ApiError::ledger("concurrent passport update, resubmit the event"),
        ),
        Ok(Err(e)) => {
            log::error!("Failed to record exposure: {e}");
            HttpResponse::InternalServerError()
                .json(ApiError::ledger("the event was not recorded"))
        }
        Err(e) => {
            log::error!("Ledger task failed: {e}");
            HttpResponse::InternalServerError().json(ApiError::internal("ledger task failed"))
        }
    }
}

/// `GET /api/passport`
///
/// Returns the caller's profile plus recent exposure history.
pub async fn passport(
    state: web::Data<AppState>,
    params: web::Query<PassportQueryParams>,
) -> HttpResponse {
    let limit = params.limit.unwrap_or(DEFAULT_PASSPORT_EVENTS);
    let user_key = params.user_key.clone();

    let ledger = Arc::clone(&state.ledger);
    match web::block(move || ledger.passport(&user_key, limit)).await {
        Ok(Ok(passport)) => HttpResponse::Ok().json(ApiPassportResponse::from(passport)),
        Ok(Err(e @ LedgerError::UnknownUser { .. })) => {
            HttpResponse::NotFound().json(ApiError::not_found(e.to_string()))
        }
        Ok(Err(e)) => {
            log::error!("Failed to read passport: {e}");
            HttpResponse::InternalServerError().json(ApiError::internal("passport read failed"))
        }
        Err(e) => {
            log::error!("Ledger task failed: {e}");
            HttpResponse::InternalServerError().json(ApiError::internal("ledger task failed"))
        }
    }
}

/// `GET /api/insights`
///
/// Rolling 7-day aggregation over the caller's history.
pub async fn insights(
    state: web::Data<AppState>,
    params: web::Query<InsightsQueryParams>,
) -> HttpResponse {
    let user_key = params.user_key.clone();

    let ledger = Arc::clone(&state.ledger);
    match web::block(move || ledger.insights(&user_key)).await {
        Ok(Ok(insights)) => HttpResponse::Ok().json(ApiInsightsResponse::from(insights)),
        Ok(Err(e @ LedgerError::UnknownUser { .. })) => {
            HttpResponse::NotFound().json(ApiError::not_found(e.to_string()))
        }
        Ok(Err(e)) => {
            log::error!("Failed to compute insights: {e}");
            HttpResponse::InternalServerError().json(ApiError::internal("insights failed"))
        }
        Err(e) => {
            log::error!("Ledger task failed: {e}");
            HttpResponse::InternalServerError().json(ApiError::internal("ledger task failed"))
        }
    }
}

/// `POST /api/profile`
///
/// Ensure-profile: creates the profile if absent and updates its identity
/// fields. Never touches points, streaks, or history.
pub async fn ensure_profile(
    state: web::Data<AppState>,
    body: web::Json<ProfileRequest>,
) -> HttpResponse {
    let request = body.into_inner();

    let ledger = Arc::clone(&state.ledger);
    match web::block(move || {
        ledger.ensure_profile(
            &request.user_key,
            request.nickname.as_deref(),
            request.home_city.as_deref(),
        )
    })
    .await
    {
        Ok(Ok(profile)) => HttpResponse::Ok().json(ApiProfile::from(profile)),
        Ok(Err(e)) => {
            log::error!("Failed to ensure profile: {e}");
            HttpResponse::InternalServerError().json(ApiError::internal("profile update failed"))
        }
        Err(e) => {
            log::error!("Ledger task failed: {e}");
            HttpResponse::InternalServerError().json(ApiError::internal("ledger task failed"))
        }
    }
}

/// Builds the aggregator query from loose HTTP parameters, validating
/// everything before any upstream call is made.
fn build_query(params: &NearbyQueryParams) -> Result<NearbyQuery, String> {
    let bbox = params.bbox.as_deref().map(parse_bbox).transpose()?;

    let origin = match (params.lat, params.lon) {
        (Some(lat), Some(lon)) => GeoPoint::new(lat, lon).map_err(|e| e.to_string())?,
        _ => {
            let bbox = bbox.ok_or("either lat/lon or bbox is required")?;
            let center = bbox.center();
            GeoPoint::new(center.lat, center.lon).map_err(|e| e.to_string())?
        }
    };

    let radius_km = params
        .radius_km
        .or_else(|| params.zoom.map(zoom_to_approx_radius_km));

    let category = params
        .category
        .as_deref()
        .map(|raw| {
            raw.parse::<PoiCategory>()
                .map_err(|_| format!("unknown category {raw:?}"))
        })
        .transpose()?;

    Ok(NearbyQuery {
        origin,
        radius_km,
        bbox,
        limit: params.limit,
        category,
    })
}

/// Parses a bounding box string `"west,south,east,north"`.
fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<f64> = s.split(',').filter_map(|p| p.trim().parse().ok()).collect();
    if parts.len() == 4 {
        Ok(BoundingBox::new(parts[0], parts[1], parts[2], parts[3]))
    } else {
        Err(format!("bbox must be west,south,east,north, got {s:?}"))
    }
}

/// Travel modes are a closed enum; anything unmapped becomes `UNKNOWN`.
fn parse_mode(raw: Option<&str>) -> TravelMode {
    raw.map_or(TravelMode::Unknown, |raw| {
        raw.parse().unwrap_or(TravelMode::Unknown)
    })
}

/// Readings must be finite and non-negative when supplied.
fn validate_readings(readings: &PollutantReadings) -> Result<(), String> {
    for (name, value) in [
        ("pm25", readings.pm25),
        ("no2", readings.no2),
        ("co", readings.co),
    ] {
        if let Some(value) = value
            && (!value.is_finite() || value < 0.0)
        {
            return Err(format!("{name} must be a non-negative number, got {value}"));
        }
    }
    Ok(())
}
