// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! IMGW (Polish Institute of Meteorology and Water Management), Poland.
//! ODIM_H5, scaling lives in `dataset1/what` (not `dataset1/data1/what` as the
//! other providers use). Directory listing comes from a JSON API, but the
//! URLs it returns are dead; files are downloaded from a separate `HVD` path.
//! A 404/unparseable response there sometimes comes back as an HTML error
//! page with a `200` status, so availability checks also reject
//! `text/html` content types.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use radar_common::frame::{FrameMetadata, RadarFrame};
use radar_common::geo::{ProjectionInfo, WgsBounds};

use crate::adapter::{DownloadResult, ExtentOnly, NativeExtent, SessionCache, SourceAdapter};
use crate::errors::{decode_error, Result};
use crate::http::download_to;
use crate::odim::{open_odim, read_corner_bounds, read_dataset_dims, read_dataset_u8, read_proj_def, CornerBounds, ScalingParams};

const FALLBACK_EXTENT: WgsBounds = WgsBounds { west: 14.0, east: 24.1, south: 49.0, north: 54.8 };
const NATIVE_PROJ4: &str = "+proj=stere +lat_0=90 +lon_0=19.0 +lat_ts=60 +ellps=WGS84";
const HVD_FOLDER: &str = "HVD_COMPO_CMAX_250.comp.cmax";
const API_PRODUCT_ID: &str = "COMPO_CMAX_250.comp.cmax";

#[derive(Deserialize)]
struct ApiFileEntry {
    file: String,
}

pub struct ImgwAdapter {
    client: reqwest::Client,
    api_url: String,
    download_base_url: String,
    cache_dir: PathBuf,
    session: SessionCache,
}

impl ImgwAdapter {
    pub fn new(cache_dir: PathBuf) -> Self {
        ImgwAdapter {
            client: reqwest::Client::new(),
            api_url: "https://danepubliczne.imgw.pl/api/data/product/id".to_string(),
            download_base_url: "https://danepubliczne.imgw.pl/pl/datastore/getfiledown/Oper/Polrad/Produkty/HVD".to_string(),
            cache_dir,
            session: SessionCache::new(),
        }
    }

    fn product_url(&self, timestamp: &str) -> String {
        format!("{}/{}/{}00dBZ.cmax.h5", self.download_base_url, HVD_FOLDER, timestamp)
    }

    fn extract_timestamp(filename: &str) -> Option<String> {
        let ts_part = filename.split("00dBZ").next()?;
        if ts_part.len() == 14 && ts_part.chars().all(|c| c.is_ascii_digit()) {
            Some(ts_part.to_string())
        } else {
            None
        }
    }
}

#[async_trait]
impl SourceAdapter for ImgwAdapter {
    fn name(&self) -> &'static str {
        "imgw"
    }

    fn is_core(&self) -> bool {
        true
    }

    async fn list_available_timestamps(&self, count: usize, _products: &[String], range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Result<Vec<String>> {
        let endpoint = format!("{}/{}", self.api_url, API_PRODUCT_ID);
        let entries: Vec<ApiFileEntry> = match self.client.get(&endpoint).send().await {
            Ok(resp) => resp.json().await.unwrap_or_default(),
            Err(e) => {
                warn!(source = "imgw", error = %e, "failed to fetch file list from API");
                Vec::new()
            }
        };

        let mut timestamps: Vec<String> = entries.iter().filter(|e| e.file.ends_with(".h5")).filter_map(|e| Self::extract_timestamp(&e.file)).collect();
        timestamps.sort_unstable_by(|a, b| b.cmp(a));

        if let Some((start, end)) = range {
            timestamps.retain(|ts| radar_common::datetime::parse_ts14(ts).map(|dt| dt >= start && dt <= end).unwrap_or(false));
        }
        timestamps.truncate(count);
        Ok(timestamps)
    }

    async fn download(&self, timestamps: &[String], _products: &[String]) -> Result<Vec<DownloadResult>> {
        let mut results = Vec::new();
        for timestamp in timestamps {
            if let Some(path) = self.session.get(timestamp, "cmax") {
                results.push(DownloadResult { timestamp: timestamp.clone(), product: "cmax".to_string(), path: Some(path), cached_in_session: true, error: None });
                continue;
            }
            let url = self.product_url(timestamp);
            let prefix = format!("imgw_cmax_{timestamp}_");
            match download_to(&self.client, &url, &self.cache_dir, &prefix, ".h5").await {
                Ok(path) => {
                    self.session.insert(timestamp, "cmax", path.clone());
                    results.push(DownloadResult { timestamp: timestamp.clone(), product: "cmax".to_string(), path: Some(path), cached_in_session: false, error: None });
                }
                Err(e) => {
                    warn!(source = "imgw", %timestamp, error = %e, "download failed");
                    results.push(DownloadResult { timestamp: timestamp.clone(), product: "cmax".to_string(), path: None, cached_in_session: false, error: Some(e.to_string()) });
                }
            }
        }
        Ok(results)
    }

    fn decode(&self, path: &Path) -> Result<RadarFrame> {
        let file = open_odim(path)?;
        let scaling = read_imgw_scaling(&file);
        let data = read_dataset_u8(&file, &scaling)?;
        let bounds = read_corner_bounds(&file, CornerBounds { west: FALLBACK_EXTENT.west, east: FALLBACK_EXTENT.east, south: FALLBACK_EXTENT.south, north: FALLBACK_EXTENT.north });
        let wgs84_bounds = WgsBounds { west: bounds.west, east: bounds.east, south: bounds.south, north: bounds.north };
        let proj4 = read_proj_def(&file).unwrap_or_else(|| NATIVE_PROJ4.to_string());
        let corners = [(bounds.west, bounds.south), (bounds.east, bounds.south), (bounds.west, bounds.north), (bounds.east, bounds.north)];
        let metadata = FrameMetadata { product: "cmax".to_string(), quantity: "DBZH".to_string(), source: self.name().to_string(), units: "dBZ".to_string(), nodata_sentinel: None, gain: scaling.gain, offset: scaling.offset };
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
        NativeExtent { wgs84_bounds: FALLBACK_EXTENT, mercator_bounds: None, grid_size: (2048, 1620), resolution_m: 500.0 }
    }

    fn cleanup_temp_files(&self) -> usize {
        self.session.cleanup()
    }
}

/// IMGW keeps its scaling attributes directly under `dataset1/what`, unlike
/// the other ODIM providers which nest them under `dataset1/data1/what`.
fn read_imgw_scaling(file: &netcdf::File) -> ScalingParams {
    let mut scaling = ScalingParams::default();
    if let Ok(Some(group)) = file.group("dataset1/what") {
        if let Some(v) = group.attribute("gain").and_then(|a| a.value().ok()).and_then(|v| f64::try_from(v).ok()) {
            scaling.gain = v;
        }
        if let Some(v) = group.attribute("offset").and_then(|a| a.value().ok()).and_then(|v| f64::try_from(v).ok()) {
            scaling.offset = v;
        }
        if let Some(v) = group.attribute("nodata").and_then(|a| a.value().ok()).and_then(|v| f64::try_from(v).ok()) {
            scaling.nodata = v;
        }
        if let Some(v) = group.attribute("undetect").and_then(|a| a.value().ok()).and_then(|v| f64::try_from(v).ok()) {
            scaling.undetect = v;
        }
    }
    scaling
}

fn ts_from_path(path: &Path) -> String {
    let re = regex::Regex::new(r"(\d{14})00dBZ").unwrap();
    path.file_name().and_then(|n| n.to_str()).and_then(|n| re.captures(n)).map(|c| c[1].to_string()).unwrap_or_else(|| "00000000000000".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_timestamp_accepts_fourteen_digit_prefix() {
        assert_eq!(ImgwAdapter::extract_timestamp("2024011512300000dBZ.cmax.h5"), Some("20240115123000".to_string()));
    }

    #[test]
    fn extract_timestamp_rejects_wrong_length_or_non_digit_prefix() {
        assert_eq!(ImgwAdapter::extract_timestamp("202401151230000dBZ.cmax.h5"), None);
        assert_eq!(ImgwAdapter::extract_timestamp("garbage00dBZ.cmax.h5"), None);
        assert_eq!(ImgwAdapter::extract_timestamp("no-marker-here.h5"), None);
    }

    #[test]
    fn product_url_builds_the_hvd_path_not_the_dead_api_url() {
        let adapter = ImgwAdapter::new(PathBuf::from("/tmp"));
        let url = adapter.product_url("20240115123000");
        assert!(url.contains("HVD_COMPO_CMAX_250.comp.cmax"));
        assert!(url.ends_with("2024011512300000dBZ.cmax.h5"));
    }

    #[test]
    fn ts_from_path_falls_back_when_unparseable() {
        assert_eq!(ts_from_path(Path::new("/tmp/garbage.h5")), "00000000000000");
    }

    #[test]
    fn read_imgw_scaling_defaults_when_group_missing() {
        let scaling = ScalingParams::default();
        assert_eq!(scaling.gain, 1.0);
        assert_eq!(scaling.offset, 0.0);
    }
}
