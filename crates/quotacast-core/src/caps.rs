//! The usage caps tracked by quotacast.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Window length class of a cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    /// Rolling window of a few hours
    ShortWindow,
    /// Multi-day window (rates are also reported per day)
    LongWindow,
}

/// A usage quota window expressed as a percentage 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cap {
    /// Short rolling session window
    Session,
    /// Weekly window across all models
    Week,
    /// Weekly window scoped to a single model
    ModelWeek,
}

impl Cap {
    /// All caps in display order
    pub const ALL: [Cap; 3] = [Cap::Session, Cap::Week, Cap::ModelWeek];

    /// Window class of this cap
    pub fn kind(self) -> CapKind {
        match self {
            Cap::Session => CapKind::ShortWindow,
            Cap::Week | Cap::ModelWeek => CapKind::LongWindow,
        }
    }

    /// Key of this cap under `metrics` in the usage document
    pub fn metric_key(self) -> &'static str {
        match self {
            Cap::Session => "sessionCap",
            Cap::Week => "weekCap",
            Cap::ModelWeek => "modelWeekCap",
        }
    }

    /// Key of this cap in a `historicalData` point
    pub fn history_key(self) -> &'static str {
        match self {
            Cap::Session => "sessionUsed",
            Cap::Week => "weekUsed",
            Cap::ModelWeek => "modelWeekUsed",
        }
    }

    /// Short label for terminal output
    pub fn display_name(self) -> &'static str {
        match self {
            Cap::Session => "Session",
            Cap::Week => "Week",
            Cap::ModelWeek => "Model week",
        }
    }

    /// Map a `/usage` meter label to a cap.
    ///
    /// ```text
    /// Current session              -> Session
    /// Current week (all models)    -> Week
    /// Current week (Opus only)     -> ModelWeek
    /// Extra usage                  -> None
    /// ```
    pub fn from_meter_label(label: &str) -> Option<Cap> {
        let label = label.trim().to_ascii_lowercase();
        if label.starts_with("current session") {
            return Some(Cap::Session);
        }
        if label.starts_with("current week") {
            if label.contains("all models") || !label.contains('(') {
                return Some(Cap::Week);
            }
            if label.contains(" only") {
                return Some(Cap::ModelWeek);
            }
        }
        None
    }
}

impl fmt::Display for Cap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
