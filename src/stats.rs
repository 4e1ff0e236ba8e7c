use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// In-memory counters for one run.
///
/// Only refined (non-test) artifacts are recorded, so the totals always equal
/// the sums over files refined during this process.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Wall-clock start of the run
    pub started_at: DateTime<Local>,

    #[serde(skip)]
    started: Instant,

    /// Refined files written
    pub total_files: u64,

    /// Lines of refined code written
    pub total_loc: u64,

    /// Lines of refined code per extension (`.py` → 120)
    pub loc_by_extension: BTreeMap<String, u64>,

    /// Extensions seen this run
    pub extensions: BTreeSet<String>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    /// Starts a new run clock with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            started: Instant::now(),
            total_files: 0,
            total_loc: 0,
            loc_by_extension: BTreeMap::new(),
            extensions: BTreeSet::new(),
        }
    }

    /// Records one refined file.
    pub fn record_file(&mut self, extension: &str, loc: u64) {
        self.total_files += 1;
        self.total_loc += loc;
        *self
            .loc_by_extension
            .entry(extension.to_string())
            .or_insert(0) += loc;
        self.extensions.insert(extension.to_string());
    }

    /// Time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Converts a duration to minutes rounded to two decimals.
#[must_use]
pub fn minutes_rounded(elapsed: Duration) -> f64 {
    round2(elapsed.as_secs_f64() / 60.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
