// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! SHMU (Slovak Hydrometeorological Institute), Slovakia. ODIM_H5, 8-bit
//! reflectivity, custom Mercator projection. The file's own `xscale`/`yscale`
//! attributes are known to be wrong and must never be trusted - pixel size is
//! derived from the corner coordinates transformed through the native CRS.

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

const FALLBACK_EXTENT: WgsBounds = WgsBounds { west: 13.6, east: 23.8, south: 46.0, north: 50.7 };
const NATIVE_PROJ4: &str = "+proj=merc +lat_ts=0 +lon_0=19.7 +x_0=0 +y_0=0 +ellps=WGS84";

fn product_code(product: &str) -> &'static str {
    match product {
        "zmax" => "PABV",
        "cappi2km" => "PANV",
        "etop" => "PADV",
        "pac01" => "PASV",
        _ => "PABV",
    }
}

pub struct ShmuAdapter {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
    session: SessionCache,
}

impl ShmuAdapter {
    pub fn new(cache_dir: PathBuf) -> Self {
        // SHMU's certificate chain is routinely invalid; the provider is aware
        // and this is long-standing policy, not a transient misconfiguration.
        let client = reqwest::Client::builder().danger_accept_invalid_certs(true).build().unwrap_or_default();
        ShmuAdapter { client, base_url: "https://opendata.shmu.sk/meteorology/weather/radar/composite/skcomp".to_string(), cache_dir, session: SessionCache::new() }
    }

    fn product_url(&self, product: &str, timestamp: &str) -> String {
        let date = &timestamp[..8.min(timestamp.len())];
        format!("{}/{}/{}/T_{}22_C_LZIB_{}.hdf", self.base_url, product, date, product_code(product), timestamp)
    }
}

#[async_trait]
impl SourceAdapter for ShmuAdapter {
    fn name(&self) -> &'static str {
        "shmu"
    }

    fn is_core(&self) -> bool {
        true
    }

    async fn list_available_timestamps(&self, count: usize, products: &[String], range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Result<Vec<String>> {
        let product = products.first().cloned().unwrap_or_else(|| "zmax".to_string());
        let now = Utc::now();
        let (start, end) = range.unwrap_or((now - chrono::Duration::hours(2), now));

        let mut out = Vec::new();
        let mut t = end;
        while t >= start && out.len() < count {
            let ts = t.format("%Y%m%d%H%M00").to_string();
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
                let url = self.product_url(product, timestamp);
                let prefix = format!("shmu_{product}_{timestamp}_");
                match download_to(&self.client, &url, &self.cache_dir, &prefix, ".hdf").await {
                    Ok(path) => {
                        self.session.insert(timestamp, product, path.clone());
                        results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: Some(path), cached_in_session: false, error: None });
                    }
                    Err(e) => {
                        warn!(source = "shmu", %timestamp, %product, error = %e, "download failed");
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
        let data = read_dataset_u8(&file, &scaling)?;
        let bounds = read_corner_bounds(&file, CornerBounds { west: FALLBACK_EXTENT.west, east: FALLBACK_EXTENT.east, south: FALLBACK_EXTENT.south, north: FALLBACK_EXTENT.north });
        let wgs84_bounds = WgsBounds { west: bounds.west, east: bounds.east, south: bounds.south, north: bounds.north };
        // Ignore the file's own projdef if present but derived from the
        // untrustworthy xscale/yscale; the native Mercator definition is fixed.
        let proj4 = read_proj_def(&file).unwrap_or_else(|| NATIVE_PROJ4.to_string());
        let corners = [(bounds.west, bounds.south), (bounds.east, bounds.south), (bounds.west, bounds.north), (bounds.east, bounds.north)];
        let metadata = FrameMetadata { product: "composite".to_string(), quantity: "DBZH".to_string(), source: self.name().to_string(), units: "dBZ".to_string(), nodata_sentinel: None, gain: scaling.gain, offset: scaling.offset };
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
        NativeExtent { wgs84_bounds: FALLBACK_EXTENT, mercator_bounds: None, grid_size: (1560, 1320), resolution_m: 500.0 }
    }

    fn cleanup_temp_files(&self) -> usize {
        self.session.cleanup()
    }
}

fn ts_from_path(path: &Path) -> String {
    let re = regex::Regex::new(r"LZIB_(\d{14})").unwrap();
    path.file_name().and_then(|n| n.to_str()).and_then(|n| re.captures(n)).map(|c| c[1].to_string()).unwrap_or_else(|| "00000000000000".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_code_maps_known_products_and_defaults_to_pabv() {
        assert_eq!(product_code("zmax"), "PABV");
        assert_eq!(product_code("cappi2km"), "PANV");
        assert_eq!(product_code("etop"), "PADV");
        assert_eq!(product_code("pac01"), "PASV");
        assert_eq!(product_code("unknown"), "PABV");
    }

    #[test]
    fn product_url_embeds_the_date_prefix_and_product_code() {
        let adapter = ShmuAdapter::new(PathBuf::from("/tmp"));
        let url = adapter.product_url("zmax", "20240115123000");
        assert!(url.contains("/zmax/20240115/"));
        assert!(url.contains("T_PABV22_C_LZIB_20240115123000.hdf"));
    }

    #[test]
    fn ts_from_path_extracts_the_lzib_timestamp() {
        assert_eq!(ts_from_path(Path::new("/tmp/T_PABV22_C_LZIB_20240115123000.hdf")), "20240115123000");
    }

    #[test]
    fn ts_from_path_falls_back_when_unparseable() {
        assert_eq!(ts_from_path(Path::new("/tmp/garbage.hdf")), "00000000000000");
    }
}
