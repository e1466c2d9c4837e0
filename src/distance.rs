//! Great-circle distance between the viewer and the reference point.

use crate::models::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres.
///
/// Symmetric, zero for identical points and finite for every input pair,
/// including antipodes (the intermediate term is clamped to `[0, 1]` so
/// rounding can never push `sqrt(1 - a)` into NaN).
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

impl Coordinate {
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        distance_km(*self, *other)
    }
}

/// Badge text for a distance: `"< 1 km"` or whole kilometres with thousands separators.
pub fn format_distance(km: f64) -> String {
    if !km.is_finite() || km < 1.0 {
        return "< 1 km".to_string();
    }

    let whole = km.round() as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{} km", grouped)
}
