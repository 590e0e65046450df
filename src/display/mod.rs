//! Human-readable views of a run.
pub mod report;

pub use report::{format_step_report, format_storage_summary};
