#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate types and geodesy math for the haze map system.
//!
//! Everything here is pure computation: great-circle distance, radius to
//! bounding-box conversion, and the map-zoom to search-radius lookup table.
//! Provider adapters and the aggregator all speak in these types.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters, used for Haversine distances.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// WGS84 equatorial radius in meters, used by the Web-Mercator-derived
/// zoom/radius helpers. Deliberately distinct from [`EARTH_RADIUS_METERS`];
/// the two contexts use different reference spheres.
pub const WEB_MERCATOR_RADIUS_METERS: f64 = 6_378_137.0;

/// Kilometers per degree of latitude (and of longitude at the equator).
const KM_PER_DEGREE: f64 = 111.0;

/// A point on the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, -90 to 90.
    pub lat: f64,
    /// Longitude in degrees, -180 to 180.
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a point, validating that both coordinates are finite and in
    /// range.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if either coordinate is
    /// non-finite, `lat` is outside [-90, 90], or `lon` is outside
    /// [-180, 180].
    pub fn new(lat: f64, lon: f64) -> Result<Self, InvalidCoordinateError> {
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Err(InvalidCoordinateError { lat, lon });
        }
        Ok(Self { lat, lon })
    }
}

/// Error returned when attempting to create a [`GeoPoint`] from out-of-range
/// or non-finite coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidCoordinateError {
    /// The rejected latitude.
    pub lat: f64,
    /// The rejected longitude.
    pub lon: f64,
}

impl std::fmt::Display for InvalidCoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinates ({}, {}): expected lat in [-90, 90] and lon in [-180, 180]",
            self.lat, self.lon
        )
    }
}

impl std::error::Error for InvalidCoordinateError {}

/// A geographic bounding box in WGS84 coordinates.
///
/// Convention: `east >= west` always — boxes never wrap the ±180° meridian.
/// Queries crossing the antimeridian or touching a pole are outside the
/// supported contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Returns the center of the box.
    #[must_use]
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: f64::midpoint(self.south, self.north),
            lon: f64::midpoint(self.west, self.east),
        }
    }
}

/// Great-circle distance between two points in meters, via the Haversine
/// formula on a sphere of radius [`EARTH_RADIUS_METERS`].
///
/// Symmetric, zero for identical points, and monotonic with true
/// separation.
#[must_use]
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let phi_a = a.lat.to_radians();
    let phi_b = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Converts a center point and radius into the bounding box that encloses
/// the circle.
///
/// Uses the flat approximation: one degree of latitude is ~111 km, one
/// degree of longitude is ~111 km scaled by `cos(lat)`. Degenerates near the
/// poles (the cosine goes to zero and the longitude delta blows up) — a
/// documented limitation, not corrected here.
#[must_use]
pub fn bounding_box_from_radius(center: GeoPoint, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / KM_PER_DEGREE;
    let lon_delta = radius_km / (KM_PER_DEGREE * center.lat.to_radians().cos());

    BoundingBox {
        west: center.lon - lon_delta,
        south: center.lat - lat_delta,
        east: center.lon + lon_delta,
        north: center.lat + lat_delta,
    }
}

/// Approximate search radius in kilometers for each integer map zoom level,
/// indexed by `zoom - 1`. Derived from the Web-Mercator viewport extent at
/// [`WEB_MERCATOR_RADIUS_METERS`]; monotonically decreasing.
const ZOOM_RADIUS_KM: [f64; 18] = [
    2500.0, 1600.0, 1000.0, 650.0, 400.0, 230.0, 130.0, 70.0, 35.0, 18.0, 9.0, 4.5, 2.5, 1.4, 0.9,
    0.7, 0.5, 0.4,
];

/// Minimum supported map zoom level.
pub const MIN_ZOOM: f64 = 1.0;

/// Maximum supported map zoom level.
pub const MAX_ZOOM: f64 = 18.0;

/// Approximate search radius in kilometers for a map zoom level.
///
/// The zoom is clamped to [1, 18]; fractional zooms interpolate linearly
/// between the two neighboring table steps.
#[must_use]
pub fn zoom_to_approx_radius_km(zoom: f64) -> f64 {
    let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = zoom.floor() as usize;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let upper = zoom.ceil() as usize;
    if lower == upper {
        return ZOOM_RADIUS_KM[lower - 1];
    }
    let t = zoom - zoom.floor();
    let a = ZOOM_RADIUS_KM[lower - 1];
    let b = ZOOM_RADIUS_KM[upper - 1];
    t.mul_add(b - a, a)
}

/// Inverse of [`zoom_to_approx_radius_km`]: the map zoom level whose
/// viewport approximates the given search radius.
///
/// Radii larger than the zoom-1 step clamp to zoom 1; radii smaller than
/// the zoom-18 step clamp to zoom 18.
#[must_use]
pub fn approx_radius_km_to_zoom(radius_km: f64) -> f64 {
    if radius_km >= ZOOM_RADIUS_KM[0] {
        return MIN_ZOOM;
    }
    if radius_km <= ZOOM_RADIUS_KM[ZOOM_RADIUS_KM.len() - 1] {
        return MAX_ZOOM;
    }
    for i in 0..ZOOM_RADIUS_KM.len() - 1 {
        let upper = ZOOM_RADIUS_KM[i];
        let lower = ZOOM_RADIUS_KM[i + 1];
        if radius_km <= upper && radius_km >= lower {
            #[allow(clippy::cast_precision_loss)]
            let base = (i + 1) as f64;
            return base + (upper - radius_km) / (upper - lower);
        }
    }
    MAX_ZOOM
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn distance_is_symmetric_and_zero_for_identical_points() {
        let kl = point(3.139, 101.6869);
        let penang = point(5.4141, 100.3288);

        assert!((distance_meters(kl, penang) - distance_meters(penang, kl)).abs() < 1e-9);
        assert!(distance_meters(kl, kl).abs() < f64::EPSILON);
    }

    #[test]
    fn distance_matches_known_separation() {
        // KL city center to KLIA is roughly 45 km as the crow flies.
        let kl = point(3.139, 101.6869);
        let klia = point(2.7456, 101.7072);

        let d = distance_meters(kl, klia);
        assert!((40_000.0..50_000.0).contains(&d), "unexpected distance {d}");
    }

    #[test]
    fn distance_is_monotonic_with_separation() {
        let origin = point(3.139, 101.6869);
        let near = point(3.15, 101.69);
        let far = point(3.5, 102.0);

        assert!(distance_meters(origin, near) < distance_meters(origin, far));
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -181.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn bounding_box_encloses_radius() {
        let center = point(3.139, 101.6869);
        let bbox = bounding_box_from_radius(center, 10.0);

        assert!(bbox.north > bbox.south);
        assert!(bbox.east > bbox.west);
        // 10 km is ~0.09 degrees of latitude.
        assert!((bbox.north - center.lat - 10.0 / 111.0).abs() < 1e-9);
        // Longitude delta widens with latitude.
        assert!(bbox.east - center.lon >= bbox.north - center.lat);
    }

    #[test]
    fn bounding_box_center_roundtrips() {
        let center = point(3.139, 101.6869);
        let bbox = bounding_box_from_radius(center, 25.0);
        let back = bbox.center();

        assert!((back.lat - center.lat).abs() < 1e-9);
        assert!((back.lon - center.lon).abs() < 1e-9);
    }

    #[test]
    fn zoom_table_is_monotonically_decreasing() {
        for window in ZOOM_RADIUS_KM.windows(2) {
            assert!(window[0] > window[1]);
        }
    }

    #[test]
    fn zoom_clamps_to_supported_range() {
        assert!((zoom_to_approx_radius_km(0.0) - 2500.0).abs() < f64::EPSILON);
        assert!((zoom_to_approx_radius_km(25.0) - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn fractional_zoom_interpolates() {
        let mid = zoom_to_approx_radius_km(9.5);
        assert!(mid < zoom_to_approx_radius_km(9.0));
        assert!(mid > zoom_to_approx_radius_km(10.0));
        assert!((mid - 26.5).abs() < 1e-9);
    }

    #[test]
    fn radius_to_zoom_inverts_the_table() {
        for (i, radius) in ZOOM_RADIUS_KM.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let expected = (i + 1) as f64;
            assert!((approx_radius_km_to_zoom(*radius) - expected).abs() < 1e-9);
        }
        assert!((approx_radius_km_to_zoom(10_000.0) - MIN_ZOOM).abs() < f64::EPSILON);
        assert!((approx_radius_km_to_zoom(0.01) - MAX_ZOOM).abs() < f64::EPSILON);
    }
}
