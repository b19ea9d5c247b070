use crate::matching::domain::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Coarse lat/lon rectangle enclosing a radius around a center, used to
/// prefilter grid cells before the exact distance check.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundingBox {
    pub(crate) min_lat: f64,
    pub(crate) max_lat: f64,
    pub(crate) min_lon: f64,
    pub(crate) max_lon: f64,
}

pub(crate) fn bounding_box(center: GeoPoint, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / 110.574;
    // Longitude degrees shrink toward the poles; guard the cosine near them.
    let lon_scale = center.latitude.to_radians().cos().abs().max(0.01);
    let lon_delta = radius_km / (111.320 * lon_scale);

    BoundingBox {
        min_lat: (center.latitude - lat_delta).max(-90.0),
        max_lat: (center.latitude + lat_delta).min(90.0),
        min_lon: (center.longitude - lon_delta).max(-180.0),
        max_lon: (center.longitude + lon_delta).min(180.0),
    }
}
