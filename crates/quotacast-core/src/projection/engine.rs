//! Per-cap projection built on the trend estimator.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use super::types::{CapState, Confidence, Projection, ProjectionParams, RegressionAxis};
use crate::caps::{Cap, CapKind};
use crate::history::{History, HistorySeries};
use crate::trend::{elapsed_rate, linear_slope, round_to, smoothed_average};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Minimum series length for a projection
const MIN_PROJECTION_SAMPLES: usize = 2;

/// When a cap growing at `rate_per_hour` reaches `cap_limit`.
///
/// Absent for flat or falling usage, for a cap that is already saturated,
/// and for an instant too far out to represent.
pub fn estimate_saturation(
    current_value: f64,
    rate_per_hour: f64,
    cap_limit: f64,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if rate_per_hour.is_nan() || rate_per_hour <= 0.0 || current_value >= cap_limit {
        return None;
    }

    let hours_remaining = (cap_limit - current_value) / rate_per_hour;
    if !hours_remaining.is_finite() || hours_remaining < 0.0 {
        return None;
    }

    let delta = TimeDelta::try_milliseconds((hours_remaining * MILLIS_PER_HOUR) as i64)?;
    now.checked_add_signed(delta)
}

/// Linear extrapolation of `current_value` to `target`, capped at `cap_limit`.
///
/// A target in the past returns `current_value` unchanged. The result is not
/// floored, so a falling rate may project below the current value.
pub fn project_at(
    current_value: f64,
    rate_per_hour: f64,
    target: DateTime<Utc>,
    cap_limit: f64,
    now: DateTime<Utc>,
) -> f64 {
    let hours_until = (target - now).num_milliseconds() as f64 / MILLIS_PER_HOUR;
    if hours_until < 0.0 {
        return current_value;
    }

    (current_value + rate_per_hour * hours_until).min(cap_limit)
}

/// [`project_at`] with an RFC 3339 target; an unparseable target yields
/// `current_value`.
pub fn project_at_time(
    current_value: f64,
    rate_per_hour: f64,
    target: &str,
    cap_limit: f64,
    now: DateTime<Utc>,
) -> f64 {
    match DateTime::parse_from_rfc3339(target.trim()) {
        Ok(target) => project_at(
            current_value,
            rate_per_hour,
            target.with_timezone(&Utc),
            cap_limit,
            now,
        ),
        Err(_) => current_value,
    }
}

/// Confidence for `sample_count` samples at the nominal 5-minute cadence.
///
/// 24 samples (two hours) or more is high, 12 (one hour) is medium. The
/// thresholds count samples, not time: use
/// [`ProjectionEngine::confidence_tier`] for other cadences.
pub fn confidence_tier(sample_count: usize) -> Confidence {
    tier(sample_count, 12, 24)
}

fn tier(sample_count: usize, medium_at: usize, high_at: usize) -> Confidence {
    if sample_count >= high_at {
        Confidence::High
    } else if sample_count >= medium_at {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Builds projections for every tracked cap
#[derive(Debug, Clone, Default)]
pub struct ProjectionEngine {
    params: ProjectionParams,
}

impl ProjectionEngine {
    pub fn new(params: ProjectionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ProjectionParams {
        &self.params
    }

    /// [`estimate_saturation`] against the configured cap limit
    pub fn estimate_saturation(
        &self,
        current_value: f64,
        rate_per_hour: f64,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        estimate_saturation(current_value, rate_per_hour, self.params.cap_limit, now)
    }

    /// [`project_at_time`] against the configured cap limit
    pub fn project_at_time(
        &self,
        current_value: f64,
        rate_per_hour: f64,
        target: &str,
        now: DateTime<Utc>,
    ) -> f64 {
        project_at_time(
            current_value,
            rate_per_hour,
            target,
            self.params.cap_limit,
            now,
        )
    }

    /// Confidence tier scaled to the configured sampling cadence
    pub fn confidence_tier(&self, sample_count: usize) -> Confidence {
        tier(
            sample_count,
            self.params.medium_confidence_samples(),
            self.params.high_confidence_samples(),
        )
    }

    /// Unrounded trend of `series` in percentage points per hour
    pub fn hourly_rate(&self, series: &HistorySeries) -> f64 {
        match self.params.regression {
            RegressionAxis::SampleIndex => {
                linear_slope(&series.values()) * self.params.samples_per_hour
            }
            RegressionAxis::ElapsedTime => elapsed_rate(series.points()),
        }
    }

    /// Projection for one cap, or `None` with fewer than two samples.
    ///
    /// Saturation and the reset projection use the unrounded rate; only the
    /// stored record is rounded.
    pub fn build_projection(
        &self,
        history: &HistorySeries,
        cap_state: &CapState,
        kind: CapKind,
        now: DateTime<Utc>,
    ) -> Option<Projection> {
        let series = match self.params.reset_drop_threshold {
            Some(threshold) => Cow::Owned(history.since_last_reset(threshold)),
            None => Cow::Borrowed(history),
        };
        if series.len() < MIN_PROJECTION_SAMPLES {
            return None;
        }

        let rate_per_hour = self.hourly_rate(&series);
        let smoothed = smoothed_average(&series.values(), self.params.smoothing_window);
        let current = cap_state.current_value;

        let estimated_saturation_time = self.estimate_saturation(current, rate_per_hour, now);
        let projected_at_reset = cap_state.reset_time.map(|reset| {
            let projected = project_at(current, rate_per_hour, reset, self.params.cap_limit, now);
            round_to(projected, 1)
        });
        let rate_per_day = match kind {
            CapKind::LongWindow => Some(round_to(rate_per_hour * 24.0, 2)),
            CapKind::ShortWindow => None,
        };

        Some(Projection {
            rate_per_hour: round_to(rate_per_hour, 2),
            rate_per_day,
            projected_at_reset,
            estimated_saturation_time,
            confidence: self.confidence_tier(series.len()),
            smoothed_value: round_to(smoothed, 1),
        })
    }

    /// Projections for every cap. Caps are computed independently; a cap
    /// without a known state or with too little history maps to `None`.
    pub fn project_all(
        &self,
        history: &History,
        states: &BTreeMap<Cap, CapState>,
        now: DateTime<Utc>,
    ) -> BTreeMap<Cap, Option<Projection>> {
        Cap::ALL
            .iter()
            .map(|&cap| {
                let projection = states.get(&cap).and_then(|state| {
                    self.build_projection(&history.series(cap), state, cap.kind(), now)
                });
                (cap, projection)
            })
            .collect()
    }
}
