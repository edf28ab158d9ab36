// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

pub mod errors;
pub mod entry;
pub mod processed_cache;

pub use errors::{RadarCacheError, Result};
pub use entry::{FrameCodec, FrameKey, ProcessedEntry};
pub use processed_cache::ProcessedDataCache;
