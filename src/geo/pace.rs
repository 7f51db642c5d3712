/// Seconds per kilometer, or `None` while no distance has been covered.
///
/// Pure function of the accumulated state; never cached.
pub fn current_pace(distance_meters: f64, active_elapsed_seconds: f64) -> Option<f64> {
    if distance_meters <= 0.0 || !distance_meters.is_finite() {
        return None;
    }
    Some(active_elapsed_seconds.max(0.0) / (distance_meters / 1000.0))
}

/// Renders a pace as `m:ss /km`, or `--:-- /km` when it is not computable.
pub fn format_pace(pace_seconds_per_km: Option<f64>) -> String {
    match pace_seconds_per_km {
        Some(pace) if pace.is_finite() => {
            let total = pace.round() as u64;
            format!("{}:{:02} /km", total / 60, total % 60)
        }
        _ => "--:-- /km".to_string(),
    }
}
