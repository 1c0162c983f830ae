//! Usage threshold crossings.

use serde::Serialize;

/// Default alert thresholds in percent
pub const DEFAULT_THRESHOLDS: [u8; 3] = [80, 90, 100];

/// Severity of a crossed threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Notice,
    Warning,
    Limit,
}

impl AlertLevel {
    /// Level of a threshold: 100 is the limit, 90 and up a warning
    pub fn for_threshold(threshold: u8) -> Self {
        match threshold {
            100.. => AlertLevel::Limit,
            90..=99 => AlertLevel::Warning,
            _ => AlertLevel::Notice,
        }
    }
}

/// Thresholds reached by `current` that `previous` had not reached.
///
/// Without a previous value every reached threshold counts as crossed.
/// A drop below a threshold (window reset) re-arms it for the next rise.
pub fn crossings(previous: Option<f64>, current: f64, thresholds: &[u8]) -> Vec<u8> {
    let mut crossed: Vec<u8> = thresholds
        .iter()
        .copied()
        .filter(|&t| {
            let t = f64::from(t);
            current >= t && previous.is_none_or(|p| p < t)
        })
        .collect();
    crossed.sort_unstable();
    crossed.dedup();
    crossed
}
