//! Output module for run statistics and the end-of-run report
//!
//! This module handles:
//! - Counting task outcomes across runs (`RunStats`, persisted in checkpoints)
//! - Summarizing a run for the operator (`RunReport`)

mod report;
pub mod stats;

pub use report::{print_report, RunReport, StopReason};
pub use stats::{FailureNote, RunStats, RECENT_FAILURES};
