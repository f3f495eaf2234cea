//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlTask`: one URL waiting for, or undergoing, a fetch attempt
//! - `TaskState`: lifecycle of a task from discovery to resolution
//! - `HostState`: per-host pacing and error bookkeeping

mod host_state;
mod task;

// Re-export main types
pub use host_state::{HostSnapshot, HostState, Reservation, RobotsStatus};
pub use task::{CrawlTask, TaskState};
