/// Computes the arithmetic mean of a slice of values. Returns `None` for empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Rounds seconds to the nearest whole second.
pub fn round_secs(seconds: f64) -> i64 {
    seconds.round() as i64
}

/// Rounds seconds to the nearest whole minute.
pub fn round_mins(seconds: f64) -> i64 {
    (seconds / 60.0).round() as i64
}
