// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::outage::OPTIONAL_SOURCES;

/// One source's available timestamps, paired with an opaque handle (a download
/// path, an `S3Object`, whatever the caller needs later) the matcher hands back
/// unexamined.
pub type SourceTimestamps<D> = HashMap<String, Vec<(DateTime<Utc>, D)>>;

#[derive(Clone, Debug)]
pub struct MatchedTimestamp<D: Clone> {
    pub timestamp: DateTime<Utc>,
    pub per_source: HashMap<String, D>,
    pub arso_dropped: bool,
}

/// One rung of the degradation ladder: try matching over `sources` requiring at
/// least `min_sources` of them, in order, stopping at the first rung that yields
/// any match at all.
struct DegradationStep<'a> {
    sources: Vec<&'a str>,
    min_sources: usize,
    arso_dropped: bool,
}

/// Find up to `max_count` non-overlapping timestamps (1-minute granularity) for
/// which enough sources have a file within `tolerance` of each other, applying the
/// ARSO-drop-before-quorum-relax degradation ladder (§4.6 Open Question
/// resolution) when a full match across every requested source fails.
pub fn match_timestamps<D: Clone>(
    available: &SourceTimestamps<D>,
    requested_sources: &[String],
    tolerance: Duration,
    core_quorum: usize,
    max_count: usize,
) -> Vec<MatchedTimestamp<D>> {
    let full: Vec<&str> = requested_sources.iter().map(String::as_str).collect();
    let has_arso = full.iter().any(|s| OPTIONAL_SOURCES.contains(s));

    let mut steps = vec![DegradationStep { sources: full.clone(), min_sources: full.len(), arso_dropped: false }];
    if has_arso {
        let without_arso: Vec<&str> = full.iter().copied().filter(|s| !OPTIONAL_SOURCES.contains(s)).collect();
        steps.push(DegradationStep { min_sources: without_arso.len(), sources: without_arso, arso_dropped: true });
    }
    let relaxed_min = core_quorum.max(full.len().saturating_sub(1)).min(full.len());
    steps.push(DegradationStep { sources: full.clone(), min_sources: relaxed_min, arso_dropped: false });

    for step in steps {
        let result = find_matches_for_sources(available, &step.sources, step.min_sources, tolerance, max_count, step.arso_dropped);
        if !result.is_empty() {
            if step.arso_dropped {
                info!("ARSO dropped from match: no full-quorum match available");
            }
            return result;
        }
    }
    Vec::new()
}

fn find_matches_for_sources<D: Clone>(
    available: &SourceTimestamps<D>,
    sources: &[&str],
    min_sources: usize,
    tolerance: Duration,
    max_count: usize,
    arso_dropped: bool,
) -> Vec<MatchedTimestamp<D>> {
    let mut candidates: Vec<DateTime<Utc>> = sources
        .iter()
        .filter_map(|s| available.get(*s))
        .flat_map(|entries| entries.iter().map(|(ts, _)| *ts))
        .collect();
    candidates.sort_unstable_by(|a, b| b.cmp(a));
    candidates.dedup();

    let mut accepted_windows: Vec<DateTime<Utc>> = Vec::new();
    let mut out = Vec::new();

    for candidate in candidates {
        if accepted_windows.iter().any(|w| (*w - candidate).num_minutes().abs() < 1) {
            continue;
        }

        let mut per_source = HashMap::new();
        for source in sources {
            if let Some(entries) = available.get(*source) {
                if let Some((_, handle)) = entries
                    .iter()
                    .filter(|(ts, _)| (*ts - candidate).abs() <= tolerance)
                    .min_by_key(|(ts, _)| (*ts - candidate).abs())
                {
                    per_source.insert((*source).to_string(), handle.clone());
                }
            }
        }

        if per_source.len() >= min_sources {
            accepted_windows.push(candidate);
            out.push(MatchedTimestamp { timestamp: candidate, per_source, arso_dropped });
            if out.len() >= max_count {
                break;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(0) + Duration::minutes(minute)
    }

    fn sources(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn full_quorum_match_when_all_sources_present() {
        let t0 = ts(0);
        let mut available: SourceTimestamps<()> = HashMap::new();
        for s in ["dwd", "shmu", "chmi", "omsz", "imgw", "arso"] {
            available.insert(s.to_string(), vec![(t0, ())]);
        }
        let result = match_timestamps(&available, &sources(&["dwd", "shmu", "chmi", "omsz", "imgw", "arso"]), Duration::minutes(2), 3, 6);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].per_source.len(), 6);
        assert!(!result[0].arso_dropped);
    }

    #[test]
    fn arso_dropped_before_quorum_relaxed() {
        let t0 = ts(0);
        let mut available: SourceTimestamps<()> = HashMap::new();
        for s in ["dwd", "shmu", "chmi", "omsz", "imgw"] {
            available.insert(s.to_string(), vec![(t0, ())]);
        }
        // arso missing entirely; every core source present
        let result = match_timestamps(&available, &sources(&["dwd", "shmu", "chmi", "omsz", "imgw", "arso"]), Duration::minutes(2), 3, 6);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].per_source.len(), 5);
        assert!(result[0].arso_dropped);
    }

    #[test]
    fn no_match_below_core_quorum() {
        let t0 = ts(0);
        let mut available: SourceTimestamps<()> = HashMap::new();
        for s in ["dwd", "shmu"] {
            available.insert(s.to_string(), vec![(t0, ())]);
        }
        let result = match_timestamps(&available, &sources(&["dwd", "shmu", "chmi", "omsz", "imgw"]), Duration::minutes(2), 3, 6);
        assert!(result.is_empty());
    }
}
