// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Timestamp normalization for the 14-digit `YYYYMMDDHHMMSS` canonical form used
//! throughout `RadarFrame` and the caches. Providers hand us a mix of native forms
//! (`YYYYMMDD_HHMM`, bare `YYYYMMDDHHMM`, a full 14-digit stamp) and this module
//! collapses all of them to one representation.

use crate::errors::{timestamp_error, Result};

/// Normalize any supported provider timestamp form to the canonical 14-digit
/// `YYYYMMDDHHMMSS` string. Accepts (after stripping `_`) 8, 12, 13 or 14 digits.
pub fn normalize_to_14(raw: &str) -> Result<String> {
    let digits: String = raw.chars().filter(|c| *c != '_').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(timestamp_error(format!("non-digit characters in timestamp {raw:?}")));
    }
    match digits.len() {
        14 => Ok(digits),
        12 => Ok(format!("{digits}00")),
        8 => Ok(format!("{digits}000000")),
        n => Err(timestamp_error(format!("unsupported timestamp length {n} in {raw:?}"))),
    }
}

/// Collapse a (possibly already-normalized) timestamp to the 12-digit
/// `YYYYMMDDHHMM` form used as the Processed-Data Cache key granularity.
pub fn normalize_to_12(raw: &str) -> Result<String> {
    let full = normalize_to_14(raw)?;
    Ok(full[..12].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_form_passes_through() {
        assert_eq!(normalize_to_14("20260128120000").unwrap(), "20260128120000");
    }

    #[test]
    fn short_form_gets_seconds_padded() {
        assert_eq!(normalize_to_14("202601281200").unwrap(), "20260128120000");
    }

    #[test]
    fn underscore_form_strips_and_pads() {
        assert_eq!(normalize_to_14("20260128_1200").unwrap(), "20260128120000");
    }

    #[test]
    fn date_only_form_pads_full_day() {
        assert_eq!(normalize_to_14("20260128").unwrap(), "20260128000000");
    }

    #[test]
    fn rejects_bad_length() {
        assert!(normalize_to_14("2026012812").is_err());
    }

    #[test]
    fn to_12_truncates() {
        assert_eq!(normalize_to_12("20260128120034").unwrap(), "202601281200");
    }

    proptest::proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[0-9]{14}") {
            let once = normalize_to_14(&s).unwrap();
            let twice = normalize_to_14(&once).unwrap();
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
