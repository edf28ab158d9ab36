// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! CHMI (Czech Hydrometeorological Institute), Czechia. ODIM_H5, 8-bit
//! reflectivity. The WGS84 corner coordinates look like a regular grid, but
//! the underlying projection is a native Mercator with a nonzero false
//! easting/northing; it must be used as-is, never approximated as plain
//! lat/lon.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use radar_common::frame::{FrameMetadata, RadarFrame};
use radar_common::geo::{ProjectionInfo, WgsBounds};

use crate::adapter::{DownloadResult, ExtentOnly, NativeExtent, SessionCache, SourceAdapter};
use crate::errors::{decode_error, Result};
use crate::http::{download_to, probe_exists};
use crate::odim::{open_odim, read_corner_bounds, read_dataset_dims, read_dataset_u8, read_proj_def, read_scaling, CornerBounds};

const FALLBACK_EXTENT: WgsBounds = WgsBounds { west: 12.0, east: 19.0, south: 48.5, north: 51.1 };
const NATIVE_PROJ4: &str = "+proj=merc +lat_ts=0 +lon_0=15.0 +x_0=-1254222.15 +y_0=-6702777.85 +ellps=WGS84";

pub struct ChmiAdapter {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
    session: SessionCache,
}

impl ChmiAdapter {
    pub fn new(cache_dir: PathBuf) -> Self {
        ChmiAdapter { client: reqwest::Client::new(), base_url: "https://opendata.chmi.cz/meteorology/weather/radar/composite/maxz/hdf5".to_string(), cache_dir, session: SessionCache::new() }
    }

    fn product_url(&self, timestamp: &str) -> String {
        format!("{}/T_PABV23_C_OKPR_{}.hdf", self.base_url, timestamp)
    }
}

#[async_trait]
impl SourceAdapter for ChmiAdapter {
    fn name(&self) -> &'static str {
        "chmi"
    }

    fn is_core(&self) -> bool {
        true
    }

    async fn list_available_timestamps(&self, count: usize, _products: &[String], range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Result<Vec<String>> {
        let now = Utc::now();
        let (start, end) = range.unwrap_or((now - chrono::Duration::hours(2), now));
        let mut out = Vec::new();
        let mut t = end;
        while t >= start && out.len() < count {
            let ts = t.format("%Y%m%d%H%M00").to_string();
            if probe_exists(&self.client, &self.product_url(&ts)).await {
                out.push(ts);
            }
            t -= chrono::Duration::minutes(5);
        }
        Ok(out)
    }

    async fn download(&self, timestamps: &[String], products: &[String]) -> Result<Vec<DownloadResult>> {
        let product = products.first().cloned().unwrap_or_else(|| "maxz".to_string());
        let mut results = Vec::new();
        for timestamp in timestamps {
            if let Some(path) = self.session.get(timestamp, &product) {
                results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: Some(path), cached_in_session: true, error: None });
                continue;
            }
            let url = self.product_url(timestamp);
            let prefix = format!("chmi_{product}_{timestamp}_");
            match download_to(&self.client, &url, &self.cache_dir, &prefix, ".hdf").await {
                Ok(path) => {
                    self.session.insert(timestamp, &product, path.clone());
                    results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: Some(path), cached_in_session: false, error: None });
                }
                Err(e) => {
                    warn!(source = "chmi", %timestamp, error = %e, "download failed");
                    results.push(DownloadResult { timestamp: timestamp.clone(), product, path: None, cached_in_session: false, error: Some(e.to_string()) });
                }
            }
        }
        Ok(results)
    }

    fn decode(&self, path: &Path) -> Result<RadarFrame> {
        let file = open_odim(path)?;
        let scaling = read_scaling(&file);
        let data = read_dataset_u8(&file, &scaling)?;
        let bounds = read_corner_bounds(&file, CornerBounds { west: FALLBACK_EXTENT.west, east: FALLBACK_EXTENT.east, south: FALLBACK_EXTENT.south, north: FALLBACK_EXTENT.north });
        let wgs84_bounds = WgsBounds { west: bounds.west, east: bounds.east, south: bounds.south, north: bounds.north };
        let proj4 = read_proj_def(&file).unwrap_or_else(|| NATIVE_PROJ4.to_string());
        let corners = [(bounds.west, bounds.south), (bounds.east, bounds.south), (bounds.west, bounds.north), (bounds.east, bounds.north)];
        let metadata = FrameMetadata { product: "maxz".to_string(), quantity: "DBZH".to_string(), source: self.name().to_string(), units: "dBZ".to_string(), nodata_sentinel: None, gain: scaling.gain, offset: scaling.offset };
        RadarFrame::new(data, wgs84_bounds, ProjectionInfo::Projected { proj4_string: proj4, corner_coords_wgs84: corners }, metadata, ts_from_path(path)).map_err(|e| decode_error(e.to_string()))
    }

    fn decode_extent_only(&self, path: &Path) -> Result<ExtentOnly> {
        let file = open_odim(path)?;
        let bounds = read_corner_bounds(&file, CornerBounds { west: FALLBACK_EXTENT.west, east: FALLBACK_EXTENT.east, south: FALLBACK_EXTENT.south, north: FALLBACK_EXTENT.north });
        let corners = [(bounds.west, bounds.south), (bounds.east, bounds.south), (bounds.west, bounds.north), (bounds.east, bounds.north)];
        Ok(ExtentOnly {
            wgs84_bounds: WgsBounds { west: bounds.west, east: bounds.east, south: bounds.south, north: bounds.north },
            dimensions: read_dataset_dims(&file)?,
            projection_info: ProjectionInfo::Projected { proj4_string: NATIVE_PROJ4.to_string(), corner_coords_wgs84: corners },
        })
    }

    fn native_extent(&self) -> NativeExtent {
        NativeExtent { wgs84_bounds: FALLBACK_EXTENT, mercator_bounds: None, grid_size: (880, 700), resolution_m: 1000.0 }
    }

    fn cleanup_temp_files(&self) -> usize {
        self.session.cleanup()
    }
}

fn ts_from_path(path: &Path) -> String {
    let re = regex::Regex::new(r"OKPR_(\d{14})").unwrap();
    path.file_name().and_then(|n| n.to_str()).and_then(|n| re.captures(n)).map(|c| c[1].to_string()).unwrap_or_else(|| "00000000000000".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_from_path_extracts_the_ok_pr_timestamp() {
        let path = Path::new("/tmp/T_PABV23_C_OKPR_20240115123000.hdf");
        assert_eq!(ts_from_path(path), "20240115123000");
    }

    #[test]
    fn ts_from_path_falls_back_when_unparseable() {
        let path = Path::new("/tmp/garbage.hdf");
        assert_eq!(ts_from_path(path), "00000000000000");
    }

    #[test]
    fn product_url_embeds_timestamp_in_ok_pr_filename() {
        let adapter = ChmiAdapter::new(PathBuf::from("/tmp"));
        let url = adapter.product_url("20240115123000");
        assert!(url.ends_with("T_PABV23_C_OKPR_20240115123000.hdf"));
    }

    #[test]
    fn native_proj4_carries_the_nonzero_false_easting_northing() {
        assert!(NATIVE_PROJ4.contains("x_0=-1254222.15"));
        assert!(NATIVE_PROJ4.contains("y_0=-6702777.85"));
    }
}
