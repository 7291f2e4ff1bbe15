//! Aggregated counters for a run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counters describing what a run (or any part of one) executed.
///
/// Summaries combine with [`RunSummary::merge`]: the operation is commutative
/// and associative, and `RunSummary::default()` is its identity, so partial
/// results can be folded in any grouping without changing the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items executed, including failures and skips.
    pub total: usize,
    /// Items that reported a failure.
    pub failed: usize,
    /// Items that were skipped without running.
    pub skipped: usize,
}

impl RunSummary {
    /// Fold another summary's counters into this one.
    pub fn merge(&mut self, other: RunSummary) {
        self.total += other.total;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// Items that ran and passed.
    pub fn passed(&self) -> usize {
        self.total - self.failed - self.skipped
    }

    /// True when at least one item failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} run: {} passed, {} failed, {} skipped",
            self.total,
            self.passed(),
            self.failed,
            self.skipped
        )
    }
}
