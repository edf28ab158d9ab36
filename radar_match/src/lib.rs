// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

pub mod outage;
pub mod matcher;

pub use outage::{is_core, OutageDetector, SourceStatus, CORE_SOURCES, OPTIONAL_SOURCES};
pub use matcher::{match_timestamps, MatchedTimestamp, SourceTimestamps};
