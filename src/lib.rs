//! quotacast - track Claude usage caps and project when they run out
//!
//! The projection core lives in `quotacast-core`; this crate holds the
//! command runners and terminal output of the `quotacast` binary.

pub mod app;
pub mod report;

pub use app::App;
