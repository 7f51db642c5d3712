use crate::models::PositionSample;

/// Mean earth radius used for the spherical approximation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters between two fixes.
///
/// Symmetric, and exactly zero for identical coordinates.
pub fn haversine_meters(a: &PositionSample, b: &PositionSample) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let half_chord = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);

    // rounding can push the chord slightly past 1.0 for antipodal points
    let central_angle = 2.0 * half_chord.sqrt().min(1.0).asin();
    (EARTH_RADIUS_METERS * central_angle).max(0.0)
}

/// Distance contributed by moving from `previous` to `current`.
pub fn accumulate(previous: &PositionSample, current: &PositionSample) -> f64 {
    haversine_meters(previous, current)
}
