//! Usage document types (camelCase JSON).

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::SCHEMA_VERSION;
use crate::caps::Cap;
use crate::history::{History, Sample};
use crate::projection::{CapState, Projection};

/// Latest state of one cap as persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapMetric {
    /// Used percentage (0-100)
    pub percentage: f64,
    /// RFC 3339 instant at which the window rolls over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<String>,
    /// Human-readable reset text as shown by the dashboard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_info: Option<String>,
    /// Advisory projection from the last run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projections: Option<Projection>,
}

impl CapMetric {
    /// Parsed reset time; a malformed value is treated as unknown
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.reset_time.as_deref()?;
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                warn!("Ignoring malformed reset time {:?}: {}", raw, e);
                None
            }
        }
    }
}

/// Per-cap metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_cap: Option<CapMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_cap: Option<CapMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_week_cap: Option<CapMetric>,
}

impl Metrics {
    pub fn get(&self, cap: Cap) -> Option<&CapMetric> {
        self.slot(cap).as_ref()
    }

    pub fn get_mut(&mut self, cap: Cap) -> Option<&mut CapMetric> {
        self.slot_mut(cap).as_mut()
    }

    /// Metric for `cap`, created empty when missing
    pub fn entry(&mut self, cap: Cap) -> &mut CapMetric {
        self.slot_mut(cap).get_or_insert_with(CapMetric::default)
    }

    fn slot(&self, cap: Cap) -> &Option<CapMetric> {
        match cap {
            Cap::Session => &self.session_cap,
            Cap::Week => &self.week_cap,
            Cap::ModelWeek => &self.model_week_cap,
        }
    }

    fn slot_mut(&mut self, cap: Cap) -> &mut Option<CapMetric> {
        match cap {
            Cap::Session => &mut self.session_cap,
            Cap::Week => &mut self.week_cap,
            Cap::ModelWeek => &mut self.model_week_cap,
        }
    }
}

/// One persisted history sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_week_used: Option<f64>,
}

impl HistoryPoint {
    pub fn get(&self, cap: Cap) -> Option<f64> {
        match cap {
            Cap::Session => self.session_used,
            Cap::Week => self.week_used,
            Cap::ModelWeek => self.model_week_used,
        }
    }

    pub fn to_sample(&self) -> Sample {
        let values = Cap::ALL
            .iter()
            .filter_map(|&cap| self.get(cap).map(|v| (cap, v)))
            .collect();
        Sample {
            timestamp: self.timestamp,
            values,
        }
    }
}

impl From<&Sample> for HistoryPoint {
    fn from(sample: &Sample) -> Self {
        Self {
            timestamp: sample.timestamp,
            session_used: sample.get(Cap::Session),
            week_used: sample.get(Cap::Week),
            model_week_used: sample.get(Cap::ModelWeek),
        }
    }
}

/// A problem found by [`UsageDocument::validate`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("unexpected schema version {0}")]
    SchemaVersion(String),

    #[error("{cap}.percentage must be between 0 and 100 (got {value})")]
    PercentageOutOfRange { cap: &'static str, value: f64 },

    #[error("historical data point {index} {field} must be between 0 and 100 (got {value})")]
    HistoryValueOutOfRange {
        index: usize,
        field: &'static str,
        value: f64,
    },

    #[error("historical data point {index} is older than the point before it")]
    OutOfOrder { index: usize },
}

/// The persisted usage document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDocument {
    pub schema_version: String,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub historical_data: Vec<HistoryPoint>,
}

impl Default for UsageDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            last_updated: None,
            metrics: Metrics::default(),
            historical_data: Vec::new(),
        }
    }
}

impl UsageDocument {
    /// Bounded history view of the stored points
    pub fn history(&self, capacity: usize) -> History {
        History::from_samples(
            self.historical_data.iter().map(HistoryPoint::to_sample),
            capacity,
        )
    }

    /// Projection inputs for every cap with a stored percentage
    pub fn cap_states(&self) -> BTreeMap<Cap, CapState> {
        Cap::ALL
            .iter()
            .filter_map(|&cap| {
                self.metrics.get(cap).map(|m| {
                    let state = CapState {
                        current_value: m.percentage,
                        reset_time: m.reset_at(),
                    };
                    (cap, state)
                })
            })
            .collect()
    }

    /// Latest value of `cap` in the history
    pub fn last_value(&self, cap: Cap) -> Option<f64> {
        self.historical_data.iter().rev().find_map(|p| p.get(cap))
    }

    /// Store a new sample: update the caps it carries and append it to the
    /// history, dropping the oldest points beyond `capacity`.
    pub fn record(&mut self, sample: &Sample, capacity: usize) {
        for (&cap, &value) in &sample.values {
            self.metrics.entry(cap).percentage = value;
        }

        self.historical_data.push(HistoryPoint::from(sample));
        let capacity = capacity.max(1);
        if self.historical_data.len() > capacity {
            let excess = self.historical_data.len() - capacity;
            self.historical_data.drain(..excess);
        }

        self.last_updated = Some(sample.timestamp);
    }

    /// Set the reset details of a cap that has a stored reading.
    ///
    /// Returns `false` and leaves the document untouched when the cap was
    /// never read, so no metric is created without a percentage behind it.
    pub fn set_reset(
        &mut self,
        cap: Cap,
        reset_time: Option<DateTime<Utc>>,
        reset_info: Option<String>,
    ) -> bool {
        let Some(metric) = self.metrics.get_mut(cap) else {
            return false;
        };
        if let Some(ts) = reset_time {
            metric.reset_time = Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        }
        if reset_info.is_some() {
            metric.reset_info = reset_info;
        }
        true
    }

    /// Replace the projection annex of every cap in `projections`.
    ///
    /// Projections are never merged: an absent projection clears the
    /// previous one. Caps without a stored metric are skipped.
    pub fn apply_projections(&mut self, projections: BTreeMap<Cap, Option<Projection>>) {
        for (cap, projection) in projections {
            if let Some(metric) = self.metrics.get_mut(cap) {
                metric.projections = projection;
            }
        }
    }

    /// Check value ranges and history ordering
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.schema_version != SCHEMA_VERSION {
            issues.push(ValidationIssue::SchemaVersion(self.schema_version.clone()));
        }

        for cap in Cap::ALL {
            if let Some(metric) = self.metrics.get(cap) {
                if !(0.0..=100.0).contains(&metric.percentage) {
                    issues.push(ValidationIssue::PercentageOutOfRange {
                        cap: cap.metric_key(),
                        value: metric.percentage,
                    });
                }
            }
        }

        for (index, point) in self.historical_data.iter().enumerate() {
            for cap in Cap::ALL {
                if let Some(value) = point.get(cap) {
                    if !(0.0..=100.0).contains(&value) {
                        issues.push(ValidationIssue::HistoryValueOutOfRange {
                            index,
                            field: cap.history_key(),
                            value,
                        });
                    }
                }
            }
            if index > 0 && point.timestamp < self.historical_data[index - 1].timestamp {
                issues.push(ValidationIssue::OutOfOrder { index });
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{Confidence, ProjectionEngine};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn sample(minutes: i64, session: f64, week: f64) -> Sample {
        Sample::new(t(minutes))
            .with(Cap::Session, session)
            .with(Cap::Week, week)
    }

    #[test]
    fn test_record_updates_metrics_and_history() {
        let mut doc = UsageDocument::default();
        doc.record(&sample(0, 10.0, 40.0), 100);
        doc.record(&sample(5, 12.0, 41.0), 100);

        assert_eq!(doc.metrics.get(Cap::Session).unwrap().percentage, 12.0);
        assert_eq!(doc.metrics.get(Cap::Week).unwrap().percentage, 41.0);
        assert!(doc.metrics.get(Cap::ModelWeek).is_none());
        assert_eq!(doc.historical_data.len(), 2);
        assert_eq!(doc.last_updated, Some(t(5)));
        assert_eq!(doc.last_value(Cap::Session), Some(12.0));
        assert_eq!(doc.last_value(Cap::ModelWeek), None);
    }

    #[test]
    fn test_record_trims_oldest_points() {
        let mut doc = UsageDocument::default();
        for i in 0..5 {
            doc.record(&sample(i * 5, i as f64, 0.0), 3);
        }
        let sessions: Vec<_> = doc.historical_data.iter().map(|p| p.session_used).collect();
        assert_eq!(sessions, vec![Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_history_round_trips_samples() {
        let mut doc = UsageDocument::default();
        doc.record(&sample(0, 10.0, 40.0), 100);
        doc.record(&Sample::new(t(5)).with(Cap::Week, 42.0), 100);

        let history = doc.history(100);
        assert_eq!(history.len(), 2);
        assert_eq!(history.series(Cap::Session).values(), vec![10.0]);
        assert_eq!(history.series(Cap::Week).values(), vec![40.0, 42.0]);
    }

    #[test]
    fn test_cap_states_parse_reset_time() {
        let mut doc = UsageDocument::default();
        doc.record(&sample(0, 10.0, 40.0), 100);
        assert!(doc.set_reset(Cap::Session, Some(t(120)), Some("Resets 11am".to_string())));
        doc.metrics.entry(Cap::Week).reset_time = Some("next tuesday".to_string());

        let states = doc.cap_states();
        assert_eq!(states[&Cap::Session].reset_time, Some(t(120)));
        assert_eq!(states[&Cap::Week].reset_time, None);
        assert_eq!(states[&Cap::Week].current_value, 40.0);
        assert!(!states.contains_key(&Cap::ModelWeek));
        assert_eq!(
            doc.metrics.get(Cap::Session).unwrap().reset_info.as_deref(),
            Some("Resets 11am")
        );
    }

    #[test]
    fn test_set_reset_requires_reading() {
        let mut doc = UsageDocument::default();
        doc.record(&Sample::new(t(0)).with(Cap::Session, 42.0), 100);

        assert!(!doc.set_reset(Cap::Week, Some(t(60)), Some("Resets Mon".to_string())));
        assert_eq!(doc.metrics.get(Cap::Week), None);
        assert!(!doc.cap_states().contains_key(&Cap::Week));

        assert!(doc.set_reset(Cap::Session, Some(t(60)), None));
        assert_eq!(
            doc.metrics.get(Cap::Session).unwrap().reset_time.as_deref(),
            Some("2026-03-01T10:00:00Z")
        );
    }

    #[test]
    fn test_apply_projections_replaces_annex() {
        let mut doc = UsageDocument::default();
        for i in 0..3 {
            doc.record(&sample(i * 5, 20.0 + i as f64, 50.0), 100);
        }

        let engine = ProjectionEngine::default();
        let projections = engine.project_all(&doc.history(100), &doc.cap_states(), t(10));
        doc.apply_projections(projections);

        let session = doc.metrics.get(Cap::Session).unwrap().projections.clone().unwrap();
        assert_eq!(session.rate_per_hour, 12.0);
        assert_eq!(session.confidence, Confidence::Low);
        assert!(doc.metrics.get(Cap::Week).unwrap().projections.is_some());

        // insufficient history clears the previous annex
        let mut cleared = BTreeMap::new();
        cleared.insert(Cap::Session, None);
        doc.apply_projections(cleared);
        assert!(doc.metrics.get(Cap::Session).unwrap().projections.is_none());
        assert!(doc.metrics.get(Cap::Week).unwrap().projections.is_some());
    }

    #[test]
    fn test_validate() {
        let mut doc = UsageDocument::default();
        doc.record(&sample(5, 10.0, 40.0), 100);
        doc.record(&sample(0, 120.0, 40.0), 100);
        doc.metrics.entry(Cap::ModelWeek).percentage = -1.0;

        let issues = doc.validate();
        assert_eq!(
            issues,
            vec![
                ValidationIssue::PercentageOutOfRange {
                    cap: "sessionCap",
                    value: 120.0
                },
                ValidationIssue::PercentageOutOfRange {
                    cap: "modelWeekCap",
                    value: -1.0
                },
                ValidationIssue::HistoryValueOutOfRange {
                    index: 1,
                    field: "sessionUsed",
                    value: 120.0
                },
                ValidationIssue::OutOfOrder { index: 1 },
            ]
        );
        assert!(UsageDocument::default().validate().is_empty());
    }

    #[test]
    fn test_serialized_layout() {
        let mut doc = UsageDocument::default();
        doc.record(&Sample::new(t(0)).with(Cap::Session, 22.0), 100);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(json["lastUpdated"], "2026-03-01T09:00:00Z");
        assert_eq!(json["metrics"]["sessionCap"]["percentage"], 22.0);
        assert!(json["metrics"].get("weekCap").is_none());
        assert_eq!(json["historicalData"][0]["sessionUsed"], 22.0);
        assert!(json["historicalData"][0].get("weekUsed").is_none());
    }
}
