//! Terminal output for `quotacast show` and `watch`

use chrono::{DateTime, TimeDelta, Utc};
use quotacast_core::store::UsageDocument;
use quotacast_core::{Cap, Confidence, Projection};

/// Whether color output is enabled (TTY + NO_COLOR not set)
fn use_color() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// ANSI color codes container (empty strings when color is disabled)
pub struct Colors {
    bold: &'static str,
    dim: &'static str,
    reset: &'static str,
    green: &'static str,
    yellow: &'static str,
    red: &'static str,
}

impl Colors {
    /// Colors for stdout
    pub fn new() -> Self {
        if use_color() {
            Self {
                bold: "\x1b[1m",
                dim: "\x1b[2m",
                reset: "\x1b[0m",
                green: "\x1b[32m",
                yellow: "\x1b[33m",
                red: "\x1b[31m",
            }
        } else {
            Self::plain()
        }
    }

    /// No escape codes at all
    pub fn plain() -> Self {
        Self {
            bold: "",
            dim: "",
            reset: "",
            green: "",
            yellow: "",
            red: "",
        }
    }

    fn confidence(&self, confidence: Confidence) -> &str {
        match confidence {
            Confidence::High => self.green,
            Confidence::Medium => self.yellow,
            Confidence::Low => self.red,
        }
    }

    fn usage(&self, percent: f64) -> &str {
        if percent >= 90.0 {
            self.red
        } else if percent >= 80.0 {
            self.yellow
        } else {
            self.green
        }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the stored metrics and projections
pub fn render(doc: &UsageDocument, now: DateTime<Utc>, c: &Colors) -> String {
    let mut lines = vec![format!("{}=== Claude usage ==={}", c.bold, c.reset)];

    if Cap::ALL.iter().all(|&cap| doc.metrics.get(cap).is_none()) {
        lines.push(String::new());
        lines.push("No usage recorded yet.".to_string());
        lines.push(format!(
            "Run {}quotacast ingest{} with captured /usage output, or {}quotacast record{}.",
            c.bold, c.reset, c.bold, c.reset
        ));
        return lines.join("\n");
    }

    if let Some(updated) = doc.last_updated {
        lines.push(format!(
            "  {}Updated:{} {} ({} ago, {} samples)",
            c.dim,
            c.reset,
            format_timestamp(updated),
            format_duration(now - updated),
            doc.historical_data.len()
        ));
    }
    lines.push(String::new());

    for cap in Cap::ALL {
        let Some(metric) = doc.metrics.get(cap) else {
            continue;
        };

        let mut header = format!(
            "  {:<12} {}{:>5.1}%{}  {}",
            cap.display_name(),
            c.usage(metric.percentage),
            metric.percentage,
            c.reset,
            make_bar(c, metric.percentage, 20)
        );
        match (metric.reset_at(), metric.reset_info.as_deref()) {
            (Some(reset), _) if reset > now => {
                header.push_str(&format!("  resets in {}", format_duration(reset - now)));
            }
            (_, Some(info)) => header.push_str(&format!("  {}", info)),
            _ => {}
        }
        lines.push(header);

        if let Some(projection) = &metric.projections {
            lines.push(format!("      {}", describe_projection(c, projection, now)));
        }
    }

    lines.join("\n")
}

/// One-line summary of a projection
fn describe_projection(c: &Colors, projection: &Projection, now: DateTime<Utc>) -> String {
    let mut parts = vec![format!("{:+.2}%/h", projection.rate_per_hour)];
    if let Some(per_day) = projection.rate_per_day {
        parts.push(format!("{:+.2}%/day", per_day));
    }
    match projection.estimated_saturation_time {
        Some(at) => parts.push(format!(
            "{}limit in {}{} ({})",
            c.red,
            format_duration(at - now),
            c.reset,
            format_timestamp(at)
        )),
        None => parts.push("no limit in sight".to_string()),
    }
    if let Some(at_reset) = projection.projected_at_reset {
        parts.push(format!("{:.1}% at reset", at_reset));
    }
    parts.push(format!("avg {:.1}%", projection.smoothed_value));
    parts.push(format!(
        "{}{} confidence{}",
        c.confidence(projection.confidence),
        projection.confidence.as_str(),
        c.reset
    ));
    parts.join(" · ")
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Compact duration ("45m", "3h 12m", "2d 4h")
fn format_duration(delta: TimeDelta) -> String {
    let minutes = delta.num_minutes().max(0);
    if minutes < 1 {
        return "<1m".to_string();
    }
    let (days, hours, mins) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// Fixed-width usage bar
fn make_bar(c: &Colors, percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!(
        "{}{}{}{}",
        "█".repeat(filled),
        c.dim,
        "░".repeat(width - filled),
        c.reset
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use quotacast_core::store::CapMetric;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(TimeDelta::seconds(30)), "<1m");
        assert_eq!(format_duration(TimeDelta::minutes(45)), "45m");
        assert_eq!(format_duration(TimeDelta::minutes(192)), "3h 12m");
        assert_eq!(format_duration(TimeDelta::hours(52)), "2d 4h");
        assert_eq!(format_duration(TimeDelta::hours(-3)), "<1m");
    }

    #[test]
    fn test_make_bar() {
        let c = Colors::plain();
        assert_eq!(make_bar(&c, 50.0, 10), "█████░░░░░");
        assert_eq!(make_bar(&c, 0.0, 4), "░░░░");
        assert_eq!(make_bar(&c, 130.0, 4), "████");
    }

    #[test]
    fn test_render_empty_document() {
        let out = render(&UsageDocument::default(), now(), &Colors::plain());
        assert!(out.contains("No usage recorded yet."));
    }

    #[test]
    fn test_render_metrics_and_projection() {
        let mut doc = UsageDocument::default();
        doc.last_updated = Some(now() - TimeDelta::minutes(5));
        *doc.metrics.entry(Cap::Session) = CapMetric {
            percentage: 24.0,
            reset_time: Some("2026-03-01T14:00:00Z".to_string()),
            reset_info: None,
            projections: Some(Projection {
                rate_per_hour: 12.0,
                rate_per_day: None,
                projected_at_reset: Some(48.0),
                estimated_saturation_time: Some(now() + TimeDelta::minutes(380)),
                confidence: Confidence::Low,
                smoothed_value: 23.0,
            }),
        };
        *doc.metrics.entry(Cap::Week) = CapMetric {
            percentage: 61.5,
            reset_time: None,
            reset_info: Some("Resets Mar 3, 9am".to_string()),
            projections: None,
        };

        let out = render(&doc, now(), &Colors::plain());
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[1], "  Updated: 2026-03-01 11:55 UTC (5m ago, 0 samples)");
        assert_eq!(
            lines[3],
            "  Session       24.0%  █████░░░░░░░░░░░░░░░  resets in 2h 0m"
        );
        assert_eq!(
            lines[4],
            concat!(
                "      +12.00%/h · limit in 6h 20m (2026-03-01 18:20 UTC) · ",
                "48.0% at reset · avg 23.0% · low confidence"
            )
        );
        assert_eq!(
            lines[5],
            "  Week          61.5%  ████████████░░░░░░░░  Resets Mar 3, 9am"
        );
        assert!(!out.contains("Model week"));
    }
}
