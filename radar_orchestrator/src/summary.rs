// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! The structured end-of-run report: counts per outcome plus a truncated list
//! of skipped timestamps, printed instead of a stack trace unless logging is
//! at DEBUG.

use std::fmt;

#[derive(Default, Debug, Clone)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped_exists: usize,
    pub skipped_insufficient: usize,
    pub failed: usize,
    pub skipped_timestamps: Vec<String>,
    /// `coverage_percent` of the most recently written composite, if any.
    pub last_coverage_percent: Option<f64>,
}

impl RunSummary {
    pub fn note_skip(&mut self, timestamp: &str) {
        if self.skipped_timestamps.len() < 3 {
            self.skipped_timestamps.push(timestamp.to_string());
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} skipped_exists={} skipped_insufficient={} failed={} skipped={:?}",
            self.processed, self.skipped_exists, self.skipped_insufficient, self.failed, self.skipped_timestamps
        )
    }
}
