//! Usage data types parsed from Claude Code `/usage` output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::caps::Cap;
use crate::history::Sample;

/// A single usage meter (e.g., "Current session", "Current week")
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageMeter {
    /// Label (e.g., "Current session", "Current week (all models)")
    pub label: String,
    /// Percentage used (0-100)
    pub percent: f64,
    /// Reset info (e.g., "Resets 1am (Asia/Tokyo)")
    pub reset_info: Option<String>,
    /// Spending detail (e.g., "$22.22 / $50.00 spent")
    pub spending: Option<String>,
}

impl UsageMeter {
    /// Cap tracked by this meter, if any
    pub fn cap(&self) -> Option<Cap> {
        Cap::from_meter_label(&self.label)
    }
}

/// Complete usage snapshot from one `/usage` screen
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSnapshot {
    /// Individual usage meters
    pub meters: Vec<UsageMeter>,
    /// When this snapshot was captured
    pub fetched_at: Option<DateTime<Utc>>,
}

impl UsageSnapshot {
    /// Meters that map to a tracked cap (first meter wins per cap)
    pub fn cap_meters(&self) -> BTreeMap<Cap, &UsageMeter> {
        let mut out = BTreeMap::new();
        for meter in &self.meters {
            if let Some(cap) = meter.cap() {
                out.entry(cap).or_insert(meter);
            }
        }
        out
    }

    /// Convert to a history sample; `None` when no meter maps to a cap
    pub fn to_sample(&self, timestamp: DateTime<Utc>) -> Option<Sample> {
        let values: BTreeMap<Cap, f64> = self
            .cap_meters()
            .into_iter()
            .map(|(cap, meter)| (cap, meter.percent))
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(Sample { timestamp, values })
    }
}
