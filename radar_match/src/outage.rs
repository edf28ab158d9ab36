// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// DWD, SHMU, CHMI, OMSZ, IMGW. ARSO is the one optional source - it has no
/// archive and is routinely the first thing dropped by the matcher's degradation
/// ladder, so it must never gate the run by itself.
pub const CORE_SOURCES: [&str; 5] = ["dwd", "shmu", "chmi", "omsz", "imgw"];
pub const OPTIONAL_SOURCES: [&str; 1] = ["arso"];

pub fn is_core(source: &str) -> bool {
    CORE_SOURCES.contains(&source)
}

#[derive(Clone, Debug, PartialEq)]
pub enum SourceStatus {
    Available,
    Outage { reason: String },
}

pub struct OutageDetector {
    pub max_data_age_minutes: i64,
    pub min_core_sources: usize,
}

impl Default for OutageDetector {
    fn default() -> Self {
        OutageDetector { max_data_age_minutes: 30, min_core_sources: 3 }
    }
}

impl OutageDetector {
    /// `newest_timestamps` maps source name to its most recently available
    /// timestamp (from a fresh probe or the cache), if any.
    pub fn classify(&self, newest_timestamps: &HashMap<String, Option<DateTime<Utc>>>, now: DateTime<Utc>) -> HashMap<String, SourceStatus> {
        let mut out = HashMap::new();
        for (source, newest) in newest_timestamps {
            let status = match newest {
                None => SourceStatus::Outage { reason: "no data available".to_string() },
                Some(ts) => {
                    let age = (now - *ts).num_minutes();
                    if age <= self.max_data_age_minutes {
                        SourceStatus::Available
                    } else {
                        SourceStatus::Outage { reason: format!("stale data (age={age}m)") }
                    }
                }
            };
            out.insert(source.clone(), status);
        }
        out
    }

    /// Returns `Ok(())` if enough core sources are available, else `Err` with one
    /// reason string per missing core source.
    pub fn check_core_quorum(&self, statuses: &HashMap<String, SourceStatus>) -> Result<(), Vec<String>> {
        let available_core = CORE_SOURCES.iter().filter(|s| matches!(statuses.get(**s), Some(SourceStatus::Available))).count();
        if available_core >= self.min_core_sources {
            return Ok(());
        }
        let reasons = CORE_SOURCES
            .iter()
            .filter_map(|s| match statuses.get(*s) {
                Some(SourceStatus::Outage { reason }) => Some(format!("{s}: {reason}")),
                None => Some(format!("{s}: no data available")),
                Some(SourceStatus::Available) => None,
            })
            .collect();
        Err(reasons)
    }
}
