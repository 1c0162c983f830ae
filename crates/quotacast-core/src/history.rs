//! Bounded usage history and per-cap series views.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::caps::Cap;

/// One trailing week at 12 samples per hour (7 * 24 * 12)
pub const DEFAULT_HISTORY_CAPACITY: usize = 2016;

/// A single poll result: the used percentage of every cap that was read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the values were read
    pub timestamp: DateTime<Utc>,
    /// Used percentage per cap (caps that could not be read are absent)
    pub values: BTreeMap<Cap, f64>,
}

impl Sample {
    /// Create an empty sample at `timestamp`
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter for one cap value
    pub fn with(mut self, cap: Cap, value: f64) -> Self {
        self.values.insert(cap, value);
        self
    }

    /// Value of `cap`, if it was read
    pub fn get(&self, cap: Cap) -> Option<f64> {
        self.values.get(&cap).copied()
    }
}

/// Chronological sample history bounded to a fixed capacity.
///
/// When the capacity is exceeded the oldest samples are dropped first;
/// samples are never reordered.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl History {
    /// Create an empty history with the default capacity
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty history holding at most `capacity` samples (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Build a history from samples already in chronological order
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>, capacity: usize) -> Self {
        let mut history = Self::with_capacity(capacity);
        for sample in samples {
            history.push(sample);
        }
        history
    }

    /// Append a sample, dropping the oldest ones while over capacity
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Maximum number of retained samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are retained
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate samples oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Ordered series of one cap, skipping samples that lack it
    pub fn series(&self, cap: Cap) -> HistorySeries {
        let points = self
            .samples
            .iter()
            .filter_map(|s| s.get(cap).map(|v| (s.timestamp, v)))
            .collect();
        HistorySeries { points }
    }
}

/// Read-only, chronological `(timestamp, value)` series for one cap
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySeries {
    points: Vec<(DateTime<Utc>, f64)>,
}

impl HistorySeries {
    /// Build a series from points already in chronological order
    pub fn from_points(points: Vec<(DateTime<Utc>, f64)>) -> Self {
        Self { points }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamped points, oldest first
    pub fn points(&self) -> &[(DateTime<Utc>, f64)] {
        &self.points
    }

    /// Values only, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|&(_, v)| v).collect()
    }

    /// Most recent point
    pub fn latest(&self) -> Option<(DateTime<Utc>, f64)> {
        self.points.last().copied()
    }

    /// The trailing `n` points
    pub fn tail(&self, n: usize) -> HistorySeries {
        let start = self.points.len().saturating_sub(n);
        Self {
            points: self.points[start..].to_vec(),
        }
    }

    /// Points after the most recent window roll-over.
    ///
    /// A roll-over is a drop between consecutive values larger than
    /// `drop_threshold` percentage points. Without one the whole series
    /// is returned.
    pub fn since_last_reset(&self, drop_threshold: f64) -> HistorySeries {
        let start = self
            .points
            .windows(2)
            .rposition(|w| w[0].1 - w[1].1 > drop_threshold)
            .map_or(0, |i| i + 1);
        Self {
            points: self.points[start..].to_vec(),
        }
    }
}
