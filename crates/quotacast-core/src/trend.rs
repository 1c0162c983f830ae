//! Trend estimation over a single cap's usage series.
//!
//! Pure numeric functions: every degenerate input (empty series, a single
//! point, a zero regression denominator) resolves to `0.0` instead of an
//! error, so a gap in the data never stalls the polling pipeline.

use chrono::{DateTime, Utc};

/// Samples per hour at the nominal 5-minute polling cadence
pub const NOMINAL_SAMPLES_PER_HOUR: f64 = 12.0;

/// Simple moving average over the trailing `window` values.
///
/// The window is clamped to the number of values; an empty series (or a
/// zero window) averages to `0.0`.
pub fn smoothed_average(values: &[f64], window: usize) -> f64 {
    let window = window.min(values.len());
    if window == 0 {
        return 0.0;
    }

    let recent = &values[values.len() - window..];
    recent.iter().sum::<f64>() / window as f64
}

/// Least-squares slope of `values` per hour, rounded to 2 decimals.
///
/// The regression runs against the 0-based sample index, so the result
/// assumes roughly uniform sampling at `samples_per_hour`.
pub fn linear_rate(values: &[f64], samples_per_hour: f64) -> f64 {
    round_to(linear_slope(values) * samples_per_hour, 2)
}

/// Unrounded least-squares slope of `values` per sample index.
pub fn linear_slope(values: &[f64]) -> f64 {
    let points = values.iter().enumerate().map(|(i, &y)| (i as f64, y));
    ols_slope(points)
}

/// Unrounded least-squares slope per hour against elapsed wall-clock time.
///
/// `x` is the number of hours since the first point, which keeps the
/// estimate unbiased when polls are missed or arrive late.
pub fn elapsed_rate(points: &[(DateTime<Utc>, f64)]) -> f64 {
    let Some(&(origin, _)) = points.first() else {
        return 0.0;
    };

    let points = points.iter().map(|&(ts, y)| {
        let hours = (ts - origin).num_milliseconds() as f64 / 3_600_000.0;
        (hours, y)
    });
    ols_slope(points)
}

/// Round `value` to `digits` decimal places.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

/// Closed-form OLS slope from `n, Σx, Σy, Σxy, Σx²`.
fn ols_slope(points: impl Iterator<Item = (f64, f64)>) -> f64 {
    let mut n = 0usize;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);

    for (x, y) in points {
        n += 1;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    if n < 2 {
        return 0.0;
    }

    let n = n as f64;
    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_smoothed_average_full_window() {
        let data: Vec<f64> = (1..=12).map(|v| v as f64 * 10.0).collect();
        let expected = data.iter().sum::<f64>() / 12.0;
        assert_eq!(smoothed_average(&data, 12), expected);
    }

    #[test]
    fn test_smoothed_average_partial_window() {
        assert_eq!(smoothed_average(&[10.0, 20.0, 30.0], 12), 20.0);
    }

    #[test]
    fn test_smoothed_average_window_clamps() {
        let data = [3.0, 9.0, 4.0, 7.5];
        for window in [4, 5, 100] {
            assert_eq!(
                smoothed_average(&data, window),
                smoothed_average(&data, data.len())
            );
        }
    }

    #[test]
    fn test_smoothed_average_uses_trailing_values() {
        assert_eq!(smoothed_average(&[100.0, 1.0, 2.0, 3.0], 3), 2.0);
    }

    #[test]
    fn test_smoothed_average_empty() {
        for window in [0, 1, 12, 1000] {
            assert_eq!(smoothed_average(&[], window), 0.0);
        }
        assert_eq!(smoothed_average(&[42.0], 12), 42.0);
    }

    #[test]
    fn test_linear_rate_increasing() {
        let data = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        let rate = linear_rate(&data, NOMINAL_SAMPLES_PER_HOUR);
        assert!(rate > 0.0);
        // 10 points per sample at 12 samples/hour
        assert_eq!(rate, 120.0);
    }

    #[test]
    fn test_linear_rate_constant_is_zero() {
        assert_eq!(linear_rate(&[50.0, 50.0, 50.0], 12.0), 0.0);
    }

    #[test]
    fn test_linear_rate_decreasing() {
        assert!(linear_rate(&[60.0, 50.0, 40.0, 30.0], 12.0) < 0.0);
    }

    #[test]
    fn test_linear_rate_insufficient_points() {
        assert_eq!(linear_rate(&[], 12.0), 0.0);
        assert_eq!(linear_rate(&[10.0], 12.0), 0.0);
    }

    #[test]
    fn test_linear_rate_rounds_to_two_decimals() {
        // slope = 1/3 per sample -> 4/3 per hour at 4 samples/hour
        let rate = linear_rate(&[0.0, 1.0 / 3.0, 2.0 / 3.0], 4.0);
        assert_eq!(rate, 1.33);
        assert!((linear_slope(&[0.0, 1.0 / 3.0, 2.0 / 3.0]) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_elapsed_rate_handles_irregular_spacing() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        // 5%/hour with a missed poll between the second and third sample
        let points = [
            (t0, 10.0),
            (t0 + Duration::minutes(5), 10.0 + 5.0 / 12.0),
            (t0 + Duration::minutes(30), 12.5),
            (t0 + Duration::hours(1), 15.0),
        ];
        assert!((elapsed_rate(&points) - 5.0).abs() < 1e-9);

        // Index-based regression over-estimates after the gap
        let values: Vec<f64> = points.iter().map(|p| p.1).collect();
        assert!(linear_rate(&values, 12.0) > 5.0);
    }

    #[test]
    fn test_elapsed_rate_degenerate() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(elapsed_rate(&[]), 0.0);
        assert_eq!(elapsed_rate(&[(t0, 5.0)]), 0.0);
        // identical timestamps -> zero denominator
        assert_eq!(elapsed_rate(&[(t0, 5.0), (t0, 9.0)]), 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.005_1, 2), 1.01);
        assert_eq!(round_to(-2.344, 2), -2.34);
        assert_eq!(round_to(23.456, 1), 23.5);
    }
}
