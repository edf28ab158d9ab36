// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{timestamp_error, Result};
use crate::timestamps::normalize_to_14;

/// Milliseconds since the Unix epoch, UTC. Used as the on-disk/S3 key granularity
/// for unix-timestamp-named PNG outputs (`{unix_ts}.png`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct EpochMillis(pub i64);

impl EpochMillis {
    pub fn now() -> Self {
        EpochMillis(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        EpochMillis(dt.timestamp_millis())
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0).single().unwrap_or_else(Utc::now)
    }

    pub fn unix_seconds(&self) -> i64 {
        self.0 / 1000
    }
}

impl fmt::Display for EpochMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_datetime().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

/// Anything carrying a UTC timestamp - frames, cache entries, downloaded objects.
pub trait Dated {
    fn date(&self) -> DateTime<Utc>;

    fn is_newer_than(&self, dt: DateTime<Utc>) -> bool {
        self.date() > dt
    }

    fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.date()).num_minutes()
    }
}

/// Parse a canonical 14-digit `YYYYMMDDHHMMSS` timestamp (after normalization) into
/// a UTC `DateTime`.
pub fn parse_ts14(ts: &str) -> Result<DateTime<Utc>> {
    let ts14 = normalize_to_14(ts)?;
    let naive = NaiveDateTime::parse_from_str(&ts14, "%Y%m%d%H%M%S")
        .map_err(|e| timestamp_error(format!("invalid timestamp {ts14:?}: {e}")))?;
    Ok(Utc.from_utc_datetime(&naive))
}

pub fn format_ts14(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_ts14() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 28, 12, 0, 0).unwrap();
        let ts = format_ts14(dt);
        assert_eq!(parse_ts14(&ts).unwrap(), dt);
    }

    #[test]
    fn epoch_millis_display_is_utc() {
        let em = EpochMillis::from_datetime(Utc.with_ymd_and_hms(2026, 1, 28, 12, 0, 0).unwrap());
        assert_eq!(em.unix_seconds(), 1769601600);
    }
}
