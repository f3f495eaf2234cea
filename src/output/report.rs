use crate::output::stats::RunStats;
use std::fmt;

/// Why the scheduler loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing left to fetch
    Completed,
    /// `max-pages` fetches were reached this run
    PageBudget,
    /// The operator asked to stop
    Interrupted,
    /// No progress for `max-idle-ms`
    IdleTimeout,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Completed => "frontier drained",
            Self::PageBudget => "page budget reached",
            Self::Interrupted => "interrupted",
            Self::IdleTimeout => "idle timeout",
        };
        f.write_str(text)
    }
}

/// Summary returned by a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Cumulative counters, including earlier runs resumed from a checkpoint
    pub stats: RunStats,

    /// Pages fetched by this run alone
    pub fetched_this_run: u64,

    pub stop_reason: StopReason,

    /// Tasks still waiting in the frontier
    pub pending: usize,

    /// Size of the dedup index
    pub resolved: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, "=== Harvest Report ===")?;
        writeln!(f)?;
        writeln!(f, "Stopped: {}", self.stop_reason)?;
        writeln!(f, "  Fetched this run: {}", self.fetched_this_run)?;
        writeln!(f, "  Pending: {}", self.pending)?;
        writeln!(f, "  Resolved URLs: {}", self.resolved)?;
        writeln!(f)?;
        writeln!(f, "Totals:")?;
        writeln!(f, "  Fetched: {}", s.fetched)?;
        writeln!(f, "  Redirected: {}", s.redirected)?;
        writeln!(f, "  Abandoned (permanent): {}", s.abandoned_permanent)?;
        writeln!(f, "  Abandoned (after retries): {}", s.abandoned_after_retries)?;
        writeln!(f, "  Retries: {}", s.retries)?;
        writeln!(f, "  Rate limited: {}", s.rate_limited)?;
        writeln!(f, "  Parse errors: {}", s.parse_errors)?;
        writeln!(f, "  Storage errors: {}", s.storage_errors)?;
        writeln!(f, "  Links: {} new, {} known, {} refused", s.discovered, s.duplicates, s.disallowed)?;

        if !s.recent_failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Recent failures:")?;
            for note in &s.recent_failures {
                writeln!(f, "  - [{}] {}: {}", note.state, note.url, note.detail)?;
            }
        }
        Ok(())
    }
}

/// Prints the report to stdout
pub fn print_report(report: &RunReport) {
    print!("{}", report);
}
