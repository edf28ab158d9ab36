// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use radar_common::geo::{MercatorBounds, ProjectionInfo, WgsBounds};
use radar_common::frame::RadarFrame;

use crate::errors::Result;

/// The outcome of one (timestamp, product) download attempt.
#[derive(Clone, Debug)]
pub struct DownloadResult {
    pub timestamp: String,
    pub product: String,
    pub path: Option<PathBuf>,
    pub cached_in_session: bool,
    pub error: Option<String>,
}

/// A provider's static footprint, used as a fallback when a file's own
/// metadata isn't available yet and as the basis for side-car extent files.
#[derive(Clone, Debug)]
pub struct NativeExtent {
    pub wgs84_bounds: WgsBounds,
    pub mercator_bounds: Option<MercatorBounds>,
    pub grid_size: (usize, usize),
    pub resolution_m: f64,
}

/// What `decode_extent_only` can learn from a file's headers alone, without
/// loading the pixel payload.
#[derive(Clone, Debug)]
pub struct ExtentOnly {
    pub wgs84_bounds: WgsBounds,
    pub dimensions: (usize, usize),
    pub projection_info: ProjectionInfo,
}

/// One adapter per national provider. Every method that talks to the network
/// is async; decoding is synchronous CPU work the caller is expected to run
/// via `tokio::task::spawn_blocking`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_core(&self) -> bool;

    async fn list_available_timestamps(&self, count: usize, products: &[String], range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Result<Vec<String>>;

    async fn download(&self, timestamps: &[String], products: &[String]) -> Result<Vec<DownloadResult>>;

    fn decode(&self, path: &Path) -> Result<RadarFrame>;

    fn decode_extent_only(&self, path: &Path) -> Result<ExtentOnly>;

    fn native_extent(&self) -> NativeExtent;

    fn cleanup_temp_files(&self) -> usize;
}

/// Per-adapter record of files already fetched this run, keyed by
/// `(timestamp, product)`, so a reprocess pass within one invocation never
/// re-downloads a file it already has on disk.
#[derive(Default)]
pub struct SessionCache {
    entries: Mutex<HashMap<(String, String), PathBuf>>,
}

impl SessionCache {
    pub fn new() -> Self {
        SessionCache::default()
    }

    pub fn get(&self, timestamp: &str, product: &str) -> Option<PathBuf> {
        self.entries.lock().unwrap().get(&(timestamp.to_string(), product.to_string())).cloned()
    }

    pub fn insert(&self, timestamp: &str, product: &str, path: PathBuf) {
        self.entries.lock().unwrap().insert((timestamp.to_string(), product.to_string()), path);
    }

    /// Removes every tracked file from disk, returning how many were deleted.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let mut removed = 0;
        for (_, path) in entries.drain() {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cache_tracks_and_cleans_up() {
        let cache = SessionCache::new();
        let dir = std::env::temp_dir().join(format!("radar_sources_session_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("file.hdf");
        std::fs::write(&path, b"x").unwrap();

        cache.insert("20260128120000", "dmax", path.clone());
        assert_eq!(cache.get("20260128120000", "dmax"), Some(path.clone()));
        assert_eq!(cache.cleanup(), 1);
        assert!(!path.exists());
        assert!(cache.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
