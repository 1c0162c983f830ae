//! Projection engine: turns a cap's usage series into a rate, a saturation
//! estimate and a confidence label.
//!
//! Every function here is pure: time-dependent operations take `now`
//! explicitly and nothing mutates the history it reads.

mod engine;
mod types;

pub use engine::{
    confidence_tier, estimate_saturation, project_at, project_at_time, ProjectionEngine,
};
pub use types::{CapState, Confidence, Projection, ProjectionParams, RegressionAxis};
