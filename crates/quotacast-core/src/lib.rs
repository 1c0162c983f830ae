//! Core library for quotacast.
//!
//! Turns a time series of usage-cap percentages into per-cap projections:
//! a smoothed level, a linear trend, an estimated saturation time and a
//! confidence label. Around that numeric core sit the storage boundary
//! (the persisted usage document), the `/usage` text parser that produces
//! samples, and the settings shared with the `quotacast` binary.

pub mod alerts;
pub mod caps;
pub mod config;
pub mod history;
pub mod projection;
pub mod retry;
pub mod store;
pub mod trend;
pub mod usage;

pub use caps::{Cap, CapKind};
pub use history::{History, HistorySeries, Sample};
pub use projection::{CapState, Confidence, Projection, ProjectionEngine, ProjectionParams};
