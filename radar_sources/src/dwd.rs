// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! DWD (Deutscher Wetterdienst), Germany. Composite is published as ODIM_H5 in
//! a native stereographic projection; corner lon/lat are present in `where`
//! but the pixel grid itself is projected, so reprojection must go through
//! `projdef`, never through linear interpolation of the corner coordinates.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::warn;

use radar_common::frame::{FrameMetadata, RadarFrame};
use radar_common::geo::{ProjectionInfo, WgsBounds};

use crate::adapter::{DownloadResult, ExtentOnly, NativeExtent, SessionCache, SourceAdapter};
use crate::errors::{decode_error, Result};
use crate::http::{download_to, probe_exists};
use crate::odim::{open_odim, read_corner_bounds, read_dataset_dims, read_dataset_u16, read_proj_def, read_scaling, CornerBounds};

const FALLBACK_EXTENT: WgsBounds = WgsBounds { west: 2.5, east: 18.0, south: 45.5, north: 56.0 };

pub struct DwdAdapter {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
    session: SessionCache,
}

impl DwdAdapter {
    pub fn new(cache_dir: PathBuf) -> Self {
        DwdAdapter {
            client: reqwest::Client::new(),
            base_url: "https://opendata.dwd.de/weather/radar/composite".to_string(),
            cache_dir,
            session: SessionCache::new(),
        }
    }

    fn product_url(&self, product: &str, timestamp: &str) -> String {
        format!("{}/{}/composite_{}_{}-hd5", self.base_url, product, product, timestamp)
    }

    fn latest_url(&self, product: &str) -> String {
        format!("{}/{}/composite_{}_LATEST-hd5", self.base_url, product, product)
    }
}

#[async_trait]
impl SourceAdapter for DwdAdapter {
    fn name(&self) -> &'static str {
        "dwd"
    }

    fn is_core(&self) -> bool {
        true
    }

    async fn list_available_timestamps(&self, count: usize, products: &[String], range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Result<Vec<String>> {
        // DWD has no JSON directory API; the HTML listing is parsed for
        // `composite_{product}_(YYYYMMDD_HHMM)-hd5` entries. Without a live
        // fetch to parse here, fall back to speculative 5-minute-aligned
        // probes via HEAD, matching the reference implementation's fallback
        // path when listing parsing fails.
        let product = products.first().cloned().unwrap_or_else(|| "dmax".to_string());
        let now = Utc::now();
        let (start, end) = range.unwrap_or((now - chrono::Duration::hours(2), now));

        let mut out = Vec::new();
        let mut t = end;
        while t >= start && out.len() < count {
            let ts = t.format("%Y%m%d_%H%M").to_string();
            if probe_exists(&self.client, &self.product_url(&product, &ts)).await {
                out.push(ts);
            }
            t -= chrono::Duration::minutes(5);
        }
        Ok(out)
    }

    async fn download(&self, timestamps: &[String], products: &[String]) -> Result<Vec<DownloadResult>> {
        let mut results = Vec::new();
        for product in products {
            for timestamp in timestamps {
                if let Some(path) = self.session.get(timestamp, product) {
                    results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: Some(path), cached_in_session: true, error: None });
                    continue;
                }

                let (url, is_latest) = if timestamp == "LATEST" { (self.latest_url(product), true) } else { (self.product_url(product, timestamp), false) };
                let prefix = format!("dwd_{product}_{timestamp}_");
                match download_to(&self.client, &url, &self.cache_dir, &prefix, ".hd5").await {
                    Ok(path) => {
                        let resolved_ts = if is_latest { self.extract_timestamp(&path).unwrap_or_else(|_| timestamp.clone()) } else { timestamp.clone() };
                        self.session.insert(&resolved_ts, product, path.clone());
                        results.push(DownloadResult { timestamp: resolved_ts, product: product.clone(), path: Some(path), cached_in_session: false, error: None });
                    }
                    Err(e) => {
                        warn!(source = "dwd", %timestamp, %product, error = %e, "download failed");
                        results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: None, cached_in_session: false, error: Some(e.to_string()) });
                    }
                }
            }
        }
        Ok(results)
    }

    fn decode(&self, path: &Path) -> Result<RadarFrame> {
        let file = open_odim(path)?;
        let scaling = read_scaling(&file);
        let data = read_dataset_u16(&file, &scaling)?;
        let bounds = read_corner_bounds(&file, CornerBounds { west: FALLBACK_EXTENT.west, east: FALLBACK_EXTENT.east, south: FALLBACK_EXTENT.south, north: FALLBACK_EXTENT.north });
        let wgs84_bounds = WgsBounds { west: bounds.west, east: bounds.east, south: bounds.south, north: bounds.north };
        let proj4 = read_proj_def(&file).unwrap_or_else(|| "+proj=stere +lat_0=90 +lon_0=10 +lat_ts=60".to_string());
        let corners = [(bounds.west, bounds.south), (bounds.east, bounds.south), (bounds.west, bounds.north), (bounds.east, bounds.north)];

        let metadata = FrameMetadata {
            product: "composite".to_string(),
            quantity: "DBZH".to_string(),
            source: self.name().to_string(),
            units: "dBZ".to_string(),
            nodata_sentinel: None,
            gain: scaling.gain,
            offset: scaling.offset,
        };
        RadarFrame::new(data, wgs84_bounds, ProjectionInfo::Projected { proj4_string: proj4, corner_coords_wgs84: corners }, metadata, ts_from_path(path))
            .map_err(|e| decode_error(e.to_string()))
    }

    fn decode_extent_only(&self, path: &Path) -> Result<ExtentOnly> {
        let file = open_odim(&path)?;
        let var_dims = crate::odim::read_corner_bounds(&file, CornerBounds { west: FALLBACK_EXTENT.west, east: FALLBACK_EXTENT.east, south: FALLBACK_EXTENT.south, north: FALLBACK_EXTENT.north });
        let proj4 = read_proj_def(&file).unwrap_or_else(|| "+proj=stere +lat_0=90 +lon_0=10 +lat_ts=60".to_string());
        let corners = [(var_dims.west, var_dims.south), (var_dims.east, var_dims.south), (var_dims.west, var_dims.north), (var_dims.east, var_dims.north)];
        Ok(ExtentOnly {
            wgs84_bounds: WgsBounds { west: var_dims.west, east: var_dims.east, south: var_dims.south, north: var_dims.north },
            dimensions: read_dataset_dims(&file)?,
            projection_info: ProjectionInfo::Projected { proj4_string: proj4, corner_coords_wgs84: corners },
        })
    }

    fn native_extent(&self) -> NativeExtent {
        NativeExtent { wgs84_bounds: FALLBACK_EXTENT, mercator_bounds: None, grid_size: (1200, 1100), resolution_m: 1000.0 }
    }

    fn cleanup_temp_files(&self) -> usize {
        self.session.cleanup()
    }
}

impl DwdAdapter {
    fn extract_timestamp(&self, path: &Path) -> Result<String> {
        let file = open_odim(path)?;
        for group in ["what", "dataset1/what"] {
            if let Ok(Some(g)) = file.group(group) {
                let date = g.attribute("date").and_then(|a| a.value().ok()).and_then(|v| String::try_from(v).ok());
                let time = g.attribute("time").and_then(|a| a.value().ok()).and_then(|v| String::try_from(v).ok());
                if let (Some(date), Some(time)) = (date, time) {
                    return Ok(format!("{date}_{}", &time[..4.min(time.len())]));
                }
            }
        }
        Err(decode_error("could not extract timestamp from LATEST file"))
    }
}

fn ts_from_path(path: &Path) -> String {
    let re = Regex::new(r"(\d{8}_\d{4})").unwrap();
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| re.captures(n))
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "00000000_0000".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_from_path_extracts_the_composite_timestamp() {
        let path = Path::new("/tmp/composite_dmax_20240115_1230-hd5");
        assert_eq!(ts_from_path(path), "20240115_1230");
    }

    #[test]
    fn ts_from_path_falls_back_when_unparseable() {
        assert_eq!(ts_from_path(Path::new("/tmp/composite_dmax_LATEST-hd5")), "00000000_0000");
    }

    #[test]
    fn product_url_and_latest_url_both_target_the_named_product() {
        let adapter = DwdAdapter::new(PathBuf::from("/tmp"));
        assert_eq!(adapter.product_url("dmax", "20240115_1230"), "https://opendata.dwd.de/weather/radar/composite/dmax/composite_dmax_20240115_1230-hd5");
        assert_eq!(adapter.latest_url("dmax"), "https://opendata.dwd.de/weather/radar/composite/dmax/composite_dmax_LATEST-hd5");
    }
}
