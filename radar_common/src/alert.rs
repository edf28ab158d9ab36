// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Replaces the reference implementation's global `AlertManager` singleton with an
//! explicit `AlertSink` passed into the orchestrator, per the "replace global
//! singletons with explicit context objects" design note. `FailureTracker` keeps the
//! per-source consecutive-failure count and promotes to an alert once a threshold is
//! crossed, same as the original's `AlertManager.record_failure`.

use std::collections::HashMap;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Clone, Debug)]
pub struct Alert {
    pub level: AlertLevel,
    pub source: String,
    pub message: String,
    pub details: Option<String>,
}

/// Receives alerts raised during a run. The one production implementation just logs
/// through `tracing`; tests can swap in a collecting sink.
pub trait AlertSink: Send + Sync {
    fn record(&self, alert: Alert);
}

pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn record(&self, alert: Alert) {
        match alert.level {
            AlertLevel::Info => info!(source = %alert.source, details = ?alert.details, "{}", alert.message),
            AlertLevel::Warning => warn!(source = %alert.source, details = ?alert.details, "{}", alert.message),
            AlertLevel::Error | AlertLevel::Critical => error!(source = %alert.source, details = ?alert.details, "{}", alert.message),
        }
    }
}

/// Counts consecutive failures per source, promoting to an alert once
/// `threshold` consecutive failures have been seen. A success resets the count.
pub struct FailureTracker {
    threshold: u32,
    counts: HashMap<String, u32>,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        FailureTracker { threshold, counts: HashMap::new() }
    }

    /// Record a failure for `source`; returns `Some(Alert)` once the threshold is
    /// reached (fired again on every subsequent failure, not just the crossing).
    pub fn record_failure(&mut self, source: &str, message: impl ToString) -> Option<Alert> {
        let count = self.counts.entry(source.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.threshold {
            Some(Alert {
                level: if *count >= self.threshold * 2 { AlertLevel::Critical } else { AlertLevel::Error },
                source: source.to_string(),
                message: message.to_string(),
                details: Some(format!("{count} consecutive failures")),
            })
        } else {
            None
        }
    }

    pub fn record_success(&mut self, source: &str) {
        self.counts.remove(source);
    }

    pub fn consecutive_failures(&self, source: &str) -> u32 {
        self.counts.get(source).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_after_threshold() {
        let mut t = FailureTracker::new(3);
        assert!(t.record_failure("dwd", "timeout").is_none());
        assert!(t.record_failure("dwd", "timeout").is_none());
        let alert = t.record_failure("dwd", "timeout").expect("should alert at threshold");
        assert_eq!(alert.level, AlertLevel::Error);
    }

    #[test]
    fn success_resets_count() {
        let mut t = FailureTracker::new(2);
        t.record_failure("shmu", "x");
        t.record_success("shmu");
        assert_eq!(t.consecutive_failures("shmu"), 0);
    }

    #[test]
    fn escalates_to_critical() {
        let mut t = FailureTracker::new(2);
        t.record_failure("chmi", "x");
        t.record_failure("chmi", "x");
        t.record_failure("chmi", "x");
        let alert = t.record_failure("chmi", "x").unwrap();
        assert_eq!(alert.level, AlertLevel::Critical);
    }
}
