//! Projection inputs, parameters and the projection record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trend::NOMINAL_SAMPLES_PER_HOUR;

/// How much history backs a projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Lowercase label used in the usage document and terminal output
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// Latest known state of one cap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapState {
    /// Latest used percentage (0-100)
    pub current_value: f64,
    /// When the cap's window rolls over, if known
    pub reset_time: Option<DateTime<Utc>>,
}

impl CapState {
    pub fn new(current_value: f64) -> Self {
        Self {
            current_value,
            reset_time: None,
        }
    }

    pub fn with_reset(mut self, reset_time: DateTime<Utc>) -> Self {
        self.reset_time = Some(reset_time);
        self
    }
}

/// Independent variable of the trend regression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionAxis {
    /// 0-based sample index, assuming uniform polling
    #[default]
    SampleIndex,
    /// Hours elapsed since the first sample
    ElapsedTime,
}

/// Tunables for [`ProjectionEngine`](super::ProjectionEngine)
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionParams {
    /// Nominal samples per hour (12 at a 5-minute cadence)
    pub samples_per_hour: f64,
    /// Trailing window of the smoothed value, in samples
    pub smoothing_window: usize,
    /// Percentage at which a cap is saturated
    pub cap_limit: f64,
    /// Regression axis for the rate estimate
    pub regression: RegressionAxis,
    /// Only regress over points after the last drop larger than this
    pub reset_drop_threshold: Option<f64>,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            samples_per_hour: NOMINAL_SAMPLES_PER_HOUR,
            smoothing_window: 12,
            cap_limit: 100.0,
            regression: RegressionAxis::SampleIndex,
            reset_drop_threshold: None,
        }
    }
}

impl ProjectionParams {
    /// Parameters for a polling cadence of `poll_interval_secs`
    pub fn from_poll_interval(poll_interval_secs: u64) -> Self {
        Self {
            samples_per_hour: 3600.0 / poll_interval_secs.max(1) as f64,
            ..Default::default()
        }
    }

    /// Sample count for medium confidence (one hour of history)
    pub fn medium_confidence_samples(&self) -> usize {
        (self.samples_per_hour.round() as usize).max(1)
    }

    /// Sample count for high confidence (two hours of history)
    pub fn high_confidence_samples(&self) -> usize {
        self.medium_confidence_samples() * 2
    }
}

/// Advisory projection for one cap, recomputed on every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Trend in percentage points per hour
    #[serde(rename = "averageRatePerHour")]
    pub rate_per_hour: f64,
    /// Trend per day (multi-day caps only)
    #[serde(
        rename = "averageRatePerDay",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub rate_per_day: Option<f64>,
    /// Projected percentage when the window resets (reset time known only)
    #[serde(
        rename = "projectedUsageAtReset",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub projected_at_reset: Option<f64>,
    /// When the cap is expected to reach its limit
    #[serde(
        rename = "estimatedTimeToLimit",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub estimated_saturation_time: Option<DateTime<Utc>>,
    pub confidence: Confidence,
    /// Simple moving average of the trailing hour
    #[serde(rename = "sma")]
    pub smoothed_value: f64,
}
