//! Parse Claude Code `/usage` output from captured pane text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{UsageMeter, UsageSnapshot};

/// "72% used", "7.5 % used"
static PERCENT_USED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%\s*used").expect("valid regex"));

/// Parse `/usage` output from plain captured text.
///
/// Expected format (each meter block):
/// ```text
///   Current session
///   ████████████████████████████████████               72% used
///   Resets 1am (Asia/Tokyo)
///
///   Current week (all models)
///   ███████████▌                                       23% used
///   Resets Mar 3, 12am (Asia/Tokyo)
/// ```
pub fn parse_usage_output(text: &str) -> UsageSnapshot {
    let lines: Vec<&str> = text.lines().collect();
    let mut meters = Vec::new();

    for (i, raw) in lines.iter().enumerate() {
        let Some(percent) = extract_percent(raw.trim()) else {
            continue;
        };

        // The label is on the line above the bar
        let label = match i.checked_sub(1).map(|j| lines[j].trim()) {
            Some(label) if !label.is_empty() && !label.starts_with("Settings:") => label,
            _ => continue,
        };

        // Reset and spending details follow the bar until a blank line
        let mut reset_info = None;
        let mut spending = None;
        for next in lines[i + 1..].iter().map(|l| l.trim()) {
            if next.is_empty() {
                break;
            }
            if next.contains('·') && next.contains("Resets ") {
                // "$22.22 / $50.00 spent · Resets Mar 1 (Asia/Tokyo)"
                if let Some((spend, reset)) = next.split_once('·') {
                    spending = Some(spend.trim().to_string());
                    reset_info = Some(reset.trim().to_string());
                }
            } else if next.starts_with("Resets ") {
                reset_info = Some(next.to_string());
            } else if next.contains('$') && next.contains("spent") {
                spending = Some(next.to_string());
            }
        }

        meters.push(UsageMeter {
            label: label.to_string(),
            percent,
            reset_info,
            spending,
        });
    }

    UsageSnapshot {
        meters,
        fetched_at: Some(chrono::Utc::now()),
    }
}

/// Extract the percentage from a line containing "N% used"
fn extract_percent(line: &str) -> Option<f64> {
    let caps = PERCENT_USED.captures(line)?;
    let percent: f64 = caps[1].parse().ok()?;
    (0.0..=100.0).contains(&percent).then_some(percent)
}
