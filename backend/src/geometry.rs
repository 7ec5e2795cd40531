use shared::{BoundingBox, Coordinate, LatLng};

pub const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Great-circle distance between two coordinates, in kilometers.
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_lat_lng_km(a.lat, a.lng, b.lat, b.lng)
}

pub fn haversine_lat_lng_km(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let lat1 = lat_a.to_radians();
    let lat2 = lat_b.to_radians();
    let dlat = (lat_b - lat_a).to_radians();
    let dlon = (lng_b - lng_a).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    // Rounding can push h a hair above 1.0 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.min(1.0).sqrt().asin()
}

/// Unrounded sum of consecutive leg lengths.
pub fn path_length_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_km(&w[0], &w[1])).sum()
}

pub fn is_valid_position(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Axis-aligned box around `points`, `None` for an empty slice.
///
/// `radius_km` is the distance from the box center to its north-east corner. It is not the
/// minimal enclosing circle and does not handle boxes that cross the antimeridian.
pub fn bounding_box(points: &[Coordinate]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut north, mut south) = (first.lat, first.lat);
    let (mut east, mut west) = (first.lng, first.lng);

    for point in &points[1..] {
        north = north.max(point.lat);
        south = south.min(point.lat);
        east = east.max(point.lng);
        west = west.min(point.lng);
    }

    let center = LatLng {
        lat: (north + south) / 2.0,
        lng: (east + west) / 2.0,
    };
    let radius_km = haversine_lat_lng_km(center.lat, center.lng, north, east);

    Some(BoundingBox {
        center,
        radius_km,
        north,
        south,
        east,
        west,
    })
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
