//! One-step migration of older usage document layouts.
//!
//! Recognized layouts:
//! - current (`schemaVersion` 2.x): returned unchanged
//! - 1.x `metrics` layout: `fourHourCap` / `weekCap` / `opusWeekCap` with
//!   `fourHourUsed` / `weekUsed` / `opusWeekUsed` history points
//! - 1.x `currentState` layout: `fourHour` / `oneWeek` / `opusOneWeek`
//!   entries carrying `usagePercent` and display-only `resetTime` text
//! - a bare array of history points

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{StoreError, SCHEMA_VERSION};
use crate::caps::Cap;

/// Key aliases per cap, current key first: (metric keys, history point keys)
fn legacy_keys(cap: Cap) -> (&'static [&'static str], &'static [&'static str]) {
    match cap {
        Cap::Session => (
            &["sessionCap", "fourHourCap"],
            &["sessionUsed", "fourHourUsed", "fourHour"],
        ),
        Cap::Week => (&["weekCap"], &["weekUsed", "oneWeek"]),
        Cap::ModelWeek => (
            &["modelWeekCap", "opusWeekCap"],
            &["modelWeekUsed", "opusWeekUsed", "opusOneWeek"],
        ),
    }
}

/// Current-state keys of the 1.x `currentState` layout
fn current_state_key(cap: Cap) -> &'static str {
    match cap {
        Cap::Session => "fourHour",
        Cap::Week => "oneWeek",
        Cap::ModelWeek => "opusOneWeek",
    }
}

/// Convert any recognized layout to the current schema.
pub fn migrate(value: Value) -> Result<Value, StoreError> {
    let root = match value {
        Value::Object(map) => map,
        Value::Array(points) => {
            debug!("Migrating bare history array ({} points)", points.len());
            let mut map = Map::new();
            map.insert("historicalData".to_string(), Value::Array(points));
            map
        }
        other => return Err(StoreError::Layout(type_name(&other).to_string())),
    };

    if let Some(version) = root.get("schemaVersion").and_then(Value::as_str) {
        match major_version(version) {
            Some(2) => return Ok(Value::Object(root)),
            Some(1) => {}
            _ => {
                return Err(StoreError::UnsupportedSchema {
                    found: version.to_string(),
                })
            }
        }
    }

    Ok(migrate_legacy(&root))
}

fn migrate_legacy(root: &Map<String, Value>) -> Value {
    let mut metrics = Map::new();
    for cap in Cap::ALL {
        if let Some(metric) = legacy_metric(root, cap) {
            metrics.insert(cap.metric_key().to_string(), metric);
        }
    }

    let points = root
        .get("historicalData")
        .and_then(Value::as_array)
        .map(|points| points.iter().filter_map(legacy_point).collect::<Vec<_>>())
        .unwrap_or_default();

    let last_updated = root
        .get("lastUpdated")
        .or_else(|| root.get("metadata").and_then(|m| m.get("lastUpdate")))
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    json!({
        "schemaVersion": SCHEMA_VERSION,
        "lastUpdated": last_updated,
        "metrics": metrics,
        "historicalData": points,
    })
}

/// Metric of one cap from either 1.x layout
fn legacy_metric(root: &Map<String, Value>, cap: Cap) -> Option<Value> {
    let (metric_keys, _) = legacy_keys(cap);

    if let Some(metric) = root
        .get("metrics")
        .and_then(Value::as_object)
        .and_then(|m| metric_keys.iter().find_map(|k| m.get(*k)))
        .and_then(Value::as_object)
    {
        let percentage = metric.get("percentage").and_then(Value::as_f64).or_else(|| {
            // `used` / `limit` counts without a precomputed percentage
            let used = metric.get("used")?.as_f64()?;
            let limit = metric.get("limit")?.as_f64()?;
            (limit > 0.0).then(|| used / limit * 100.0)
        })?;
        let reset = metric.get("resetTime").and_then(Value::as_str);
        return Some(cap_metric(percentage, reset));
    }

    let entry = root
        .get("currentState")
        .and_then(|s| s.get(current_state_key(cap)))?;
    let percentage = entry.get("usagePercent").and_then(Value::as_f64)?;
    let reset = entry.get("resetTime").and_then(Value::as_str);
    Some(cap_metric(percentage, reset))
}

/// Build a current-schema metric; legacy reset text that is not an instant
/// is kept for display only.
fn cap_metric(percentage: f64, reset: Option<&str>) -> Value {
    let mut metric = Map::new();
    metric.insert("percentage".to_string(), json!(percentage));
    if let Some(reset) = reset.map(str::trim).filter(|r| !r.is_empty()) {
        match parse_timestamp(reset) {
            Some(ts) => metric.insert("resetTime".to_string(), json!(ts)),
            None => metric.insert("resetInfo".to_string(), json!(reset)),
        };
    }
    Value::Object(metric)
}

/// History point with current keys; points without a valid timestamp are dropped
fn legacy_point(point: &Value) -> Option<Value> {
    let raw_ts = point.get("timestamp").and_then(Value::as_str);
    let Some(timestamp) = raw_ts.and_then(parse_timestamp) else {
        warn!("Dropping history point with invalid timestamp: {:?}", raw_ts);
        return None;
    };

    let mut out = Map::new();
    out.insert("timestamp".to_string(), json!(timestamp));
    for cap in Cap::ALL {
        let (_, history_keys) = legacy_keys(cap);
        if let Some(value) = history_keys
            .iter()
            .find_map(|k| point.get(*k).and_then(Value::as_f64))
        {
            out.insert(cap.history_key().to_string(), json!(value));
        }
    }
    Some(Value::Object(out))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
        .or_else(|| {
            // Naive ISO timestamps written without an offset are UTC
            raw.trim()
                .parse::<chrono::NaiveDateTime>()
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn major_version(version: &str) -> Option<u64> {
    version.split('.').next()?.trim().parse().ok()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
