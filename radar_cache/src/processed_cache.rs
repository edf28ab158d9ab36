// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use radar_common::cache::LayeredCache;
use radar_common::store::ObjectStore;
use radar_common::RadarFrame;

use crate::entry::{FrameCodec, FrameKey, ProcessedEntry};
use crate::errors::Result;

/// Bridges fast sources (which publish an archive) and ARSO (which only ever
/// exposes its latest frame) by giving every downloaded frame a write-through local
/// + remote home, independent of whether the provider itself can be asked for it
/// again later.
pub struct ProcessedDataCache {
    inner: LayeredCache<FrameKey, ProcessedEntry, FrameCodec>,
    ttl_minutes: i64,
}

impl ProcessedDataCache {
    pub fn new(local_root: impl Into<PathBuf>, store: Arc<dyn ObjectStore>, ttl_minutes: i64) -> Result<Self> {
        Ok(ProcessedDataCache { inner: LayeredCache::new(local_root, store, FrameCodec)?, ttl_minutes })
    }

    fn is_expired(&self, cached_at: i64) -> bool {
        let age_seconds = Utc::now().timestamp() - cached_at;
        age_seconds > self.ttl_minutes * 60
    }

    /// `None` both when there is no entry and when the entry has expired.
    pub async fn get(&self, source: &str, ts12: &str, product: &str) -> Result<Option<RadarFrame>> {
        let key = FrameKey::new(source, product, ts12)?;
        match self.inner.get(&key).await? {
            Some(entry) if !self.is_expired(entry.cached_at) => Ok(Some(entry.frame.clone())),
            Some(_) => {
                self.inner.forget(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Write-through: called immediately after a source adapter decodes a frame, so
    /// the timestamp matcher can see it within the same run. No-op if a valid
    /// (non-expired) entry already exists unless `force` is set.
    pub async fn put(&self, ts12: &str, frame: RadarFrame, force: bool) -> Result<()> {
        let key = FrameKey::new(&frame.metadata.source, &frame.metadata.product, ts12)?;
        if !force {
            if let Some(existing) = self.inner.get(&key).await? {
                if !self.is_expired(existing.cached_at) {
                    return Ok(());
                }
            }
        }
        let entry = ProcessedEntry { frame, cached_at: Utc::now().timestamp() };
        self.inner.put(key, entry).await.map_err(Into::into)
    }

    /// Union of local + object-store timestamps for `source` (and `product` if
    /// given), newest first, expired entries excluded.
    pub async fn list_timestamps(&self, source: &str, product: Option<&str>) -> Result<Vec<String>> {
        radar_common::cache::validate_source_name(source)?;
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        let source_dir = self.inner.local_root().join(source);
        if source_dir.is_dir() {
            for entry in fs::read_dir(&source_dir).map_err(radar_common::RadarCommonError::from)? {
                let entry = entry.map_err(radar_common::RadarCommonError::from)?;
                if let Some(ts12) = parse_ts12_from_filename(&entry.file_name().to_string_lossy(), source, product) {
                    if seen.insert(ts12.clone()) {
                        out.push(ts12);
                    }
                }
            }
        }

        let prefix = format!("iradar-data/data/{source}/");
        for key in self.inner.store().list(&prefix).await? {
            if let Some(ts12) = parse_ts12_from_filename(key.rsplit('/').next().unwrap_or(&key), source, product) {
                if seen.insert(ts12.clone()) {
                    out.push(ts12);
                }
            }
        }

        out.sort_unstable_by(|a, b| b.cmp(a));
        Ok(out)
    }

    pub fn clear_local(&self) -> Result<usize> {
        Ok(self.inner.clear_local()?)
    }
}

fn parse_ts12_from_filename(filename: &str, source: &str, product: Option<&str>) -> Option<String> {
    let stem = filename.strip_suffix(".npz")?;
    let prefix = match product {
        Some(p) => format!("{source}_{p}_"),
        None => format!("{source}_"),
    };
    let ts = stem.strip_prefix(&prefix)?;
    if ts.len() == 12 && ts.chars().all(|c| c.is_ascii_digit()) {
        Some(ts.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_common::frame::FrameMetadata;
    use radar_common::geo::{ProjectionInfo, WgsBounds};
    use radar_common::store::NullObjectStore;

    fn sample_frame(source: &str, ts: &str) -> RadarFrame {
        RadarFrame::new(
            ndarray::arr2(&[[1.0f32, 2.0], [3.0, 4.0]]),
            WgsBounds { west: 0.0, east: 1.0, south: 0.0, north: 1.0 },
            ProjectionInfo::Wgs84,
            FrameMetadata { product: "zmax".into(), quantity: "DBZH".into(), source: source.into(), units: "dBZ".into(), nodata_sentinel: None, gain: 1.0, offset: 0.0 },
            ts,
        ).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = std::env::temp_dir().join(format!("radar_processed_cache_test_{}", std::process::id()));
        let cache = ProcessedDataCache::new(&dir, Arc::new(NullObjectStore), 60).unwrap();
        let frame = sample_frame("dwd", "202601281200");
        cache.put("202601281200", frame.clone(), false).await.unwrap();

        let got = cache.get("dwd", "202601281200", "zmax").await.unwrap().unwrap();
        assert_eq!(got.data, frame.data);
        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let dir = std::env::temp_dir().join(format!("radar_processed_cache_test2_{}", std::process::id()));
        let cache = ProcessedDataCache::new(&dir, Arc::new(NullObjectStore), 0).unwrap();
        let frame = sample_frame("shmu", "202601281200");
        cache.put("202601281200", frame, false).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert!(cache.get("shmu", "202601281200", "zmax").await.unwrap().is_none());
        let _ = fs::remove_dir_all(&dir);
    }
}
