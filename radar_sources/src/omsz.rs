// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! OMSZ (Hungarian Meteorological Service), Hungary. The only netCDF provider
//! in the composite, delivered zipped. Its one sharp edge: the reflectivity
//! variable is stored as `int8` but its bit pattern must be reinterpreted as
//! `uint8` (values ≥128 otherwise wrap negative), and two distinct raw values
//! both mean "no echo" for different reasons - 255 is outside radar coverage,
//! 0 is the static background/coverage mask - both become `NaN`.

use std::io::Read as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use tracing::warn;

use radar_common::fs::ScopedTempFile;
use radar_common::frame::{FrameMetadata, RadarFrame};
use radar_common::geo::{ProjectionInfo, WgsBounds};

use crate::adapter::{DownloadResult, ExtentOnly, NativeExtent, SessionCache, SourceAdapter};
use crate::errors::{decode_error, netcdf_error, Result};
use crate::http::download_to;

const FALLBACK_EXTENT: WgsBounds = WgsBounds { west: 13.5, east: 25.5, south: 44.0, north: 50.5 };

fn nc_product(product: &str) -> &'static str {
    match product {
        "pscappi" => "refl2D_pscappi",
        _ => "refl2D",
    }
}

pub struct OmszAdapter {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
    session: SessionCache,
}

impl OmszAdapter {
    pub fn new(cache_dir: PathBuf) -> Self {
        OmszAdapter { client: reqwest::Client::new(), base_url: "https://odp.met.hu/weather/radar/composite/nc".to_string(), cache_dir, session: SessionCache::new() }
    }

    fn zip_url(&self, product: &str, timestamp: &str) -> String {
        let var = nc_product(product);
        format!("{}/{}/radar_composite-{}-{}.nc.zip", self.base_url, var, var, timestamp)
    }
}

#[async_trait]
impl SourceAdapter for OmszAdapter {
    fn name(&self) -> &'static str {
        "omsz"
    }

    fn is_core(&self) -> bool {
        true
    }

    async fn list_available_timestamps(&self, count: usize, products: &[String], range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Result<Vec<String>> {
        let product = products.first().cloned().unwrap_or_else(|| "cmax".to_string());
        let now = Utc::now();
        let (start, end) = range.unwrap_or((now - chrono::Duration::hours(2), now));
        let mut out = Vec::new();
        let mut t = end;
        while t >= start && out.len() < count {
            let ts = t.format("%Y%m%d_%H%M").to_string();
            if crate::http::probe_exists(&self.client, &self.zip_url(&product, &ts)).await {
                out.push(ts);
            }
            t -= chrono::Duration::minutes(10);
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
                let url = self.zip_url(product, timestamp);
                let prefix = format!("omsz_{product}_{timestamp}_");
                let outcome = async {
                    let zip_path = download_to(&self.client, &url, &self.cache_dir, &prefix, ".nc.zip").await?;
                    let nc_path = extract_nc_from_zip(&zip_path, &self.cache_dir, &prefix)?;
                    let _ = std::fs::remove_file(&zip_path);
                    Ok::<_, crate::errors::RadarSourcesError>(nc_path)
                }
                .await;

                match outcome {
                    Ok(path) => {
                        self.session.insert(timestamp, product, path.clone());
                        results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: Some(path), cached_in_session: false, error: None });
                    }
                    Err(e) => {
                        warn!(source = "omsz", %timestamp, %product, error = %e, "download failed");
                        results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: None, cached_in_session: false, error: Some(e.to_string()) });
                    }
                }
            }
        }
        Ok(results)
    }

    fn decode(&self, path: &Path) -> Result<RadarFrame> {
        let is_pscappi = path.to_string_lossy().contains("pscappi");
        let var_name = if is_pscappi { "refl2D_pscappi" } else { "refl2D" };

        let file = netcdf::open(path).map_err(netcdf_error)?;
        let var = file.variable(var_name).ok_or_else(|| decode_error(format!("missing {var_name} variable")))?;
        let dims = var.dimensions();
        let (rows, cols) = (dims[0].len(), dims[1].len());
        // Stored as int8 but must be reinterpreted as uint8: read the raw
        // bytes and reinterpret rather than sign-extending through i8.
        let raw_i8: Vec<i8> = var.get_values(..).map_err(netcdf_error)?;

        let la1: f64 = scalar_f64(&file, "La1")?;
        let lo1: f64 = scalar_f64(&file, "Lo1")?;
        let dx: f64 = scalar_f64(&file, "Dx")?;
        let dy: f64 = scalar_f64(&file, "Dy")?;

        let scaled = scale_raw_i8(&raw_i8);
        let data = Array2::from_shape_vec((rows, cols), scaled).map_err(|e| decode_error(e.to_string()))?;

        let wgs84_bounds = corner_bounds(la1, lo1, dx, dy, rows, cols);

        let metadata = FrameMetadata { product: if is_pscappi { "pscappi" } else { "cmax" }.to_string(), quantity: "DBZH".to_string(), source: self.name().to_string(), units: "dBZ".to_string(), nodata_sentinel: None, gain: 0.5, offset: -32.0 };
        RadarFrame::new(data, wgs84_bounds, ProjectionInfo::Wgs84, metadata, ts_from_path(path)).map_err(|e| decode_error(e.to_string()))
    }

    fn decode_extent_only(&self, path: &Path) -> Result<ExtentOnly> {
        let file = netcdf::open(path).map_err(netcdf_error)?;
        let var_name = if path.to_string_lossy().contains("pscappi") { "refl2D_pscappi" } else { "refl2D" };
        let var = file.variable(var_name).ok_or_else(|| decode_error(format!("missing {var_name} variable")))?;
        let dims = var.dimensions();
        let (rows, cols) = (dims[0].len(), dims[1].len());

        let la1 = scalar_f64(&file, "La1")?;
        let lo1 = scalar_f64(&file, "Lo1")?;
        let dx = scalar_f64(&file, "Dx")?;
        let dy = scalar_f64(&file, "Dy")?;
        let wgs84_bounds = corner_bounds(la1, lo1, dx, dy, rows, cols);

        Ok(ExtentOnly { wgs84_bounds, dimensions: (rows, cols), projection_info: ProjectionInfo::Wgs84 })
    }

    fn native_extent(&self) -> NativeExtent {
        NativeExtent { wgs84_bounds: FALLBACK_EXTENT, mercator_bounds: None, grid_size: (813, 961), resolution_m: 1000.0 }
    }

    fn cleanup_temp_files(&self) -> usize {
        self.session.cleanup()
    }
}

fn scalar_f64(file: &netcdf::File, name: &str) -> Result<f64> {
    let var = file.variable(name).ok_or_else(|| decode_error(format!("missing {name} variable")))?;
    let values: Vec<f64> = var.get_values(..).map_err(netcdf_error)?;
    values.first().copied().ok_or_else(|| decode_error(format!("{name} has no values")))
}

fn extract_nc_from_zip(zip_path: &Path, cache_dir: &Path, prefix: &str) -> Result<PathBuf> {
    let zip_file = std::fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(zip_file).map_err(|e| decode_error(e.to_string()))?;
    let mut entry = (0..archive.len())
        .find_map(|i| {
            let f = archive.by_index(i).ok()?;
            if f.name().ends_with(".nc") { Some(i) } else { None }
        })
        .and_then(|i| archive.by_index(i).ok())
        .ok_or_else(|| decode_error("zip archive has no .nc entry"))?;

    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;
    drop(entry);

    let tmp = ScopedTempFile::new_in(cache_dir, prefix, ".nc")?;
    std::fs::write(tmp.path(), &contents)?;
    let dest = cache_dir.join(format!("{prefix}.nc"));
    tmp.persist_as(&dest)?;
    Ok(dest)
}

fn ts_from_path(path: &Path) -> String {
    let re = regex::Regex::new(r"(\d{8}_\d{4})").unwrap();
    path.file_name().and_then(|n| n.to_str()).and_then(|n| re.captures(n)).map(|c| c[1].to_string()).unwrap_or_else(|| "00000000_0000".to_string())
}

/// Reinterprets the raw `int8` reflectivity bytes as `uint8` and applies the
/// fixed `v / 2 - 32` scaling, mapping both nodata sentinels (255 outside
/// coverage, 0 background mask) to `NaN`.
fn scale_raw_i8(raw: &[i8]) -> Vec<f32> {
    raw.iter().map(|&b| b as u8).map(|v| if v == 255 || v == 0 { f32::NAN } else { v as f32 / 2.0 - 32.0 }).collect()
}

/// La1 is the *north* boundary (rows run south as `Dy` is applied), Lo1 is west.
fn corner_bounds(la1: f64, lo1: f64, dx: f64, dy: f64, rows: usize, cols: usize) -> WgsBounds {
    WgsBounds { west: lo1, east: lo1 + dx * (cols as f64 - 1.0), south: la1 - dy * (rows as f64 - 1.0), north: la1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_0xff_bytes_reinterpret_as_255_and_become_nan() {
        // 0xFF as a raw int8 byte is -1; it must never be read as -1 dBZ.
        let raw: Vec<i8> = vec![-1, -1, -1, -1];
        let scaled = scale_raw_i8(&raw);
        assert!(scaled.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn zero_background_mask_also_becomes_nan() {
        let scaled = scale_raw_i8(&[0]);
        assert!(scaled[0].is_nan());
    }

    #[test]
    fn ordinary_values_apply_the_fixed_scale() {
        // raw 100 -> 100/2 - 32 = 18.0 dBZ
        let scaled = scale_raw_i8(&[100]);
        assert_eq!(scaled[0], 18.0);
    }

    #[test]
    fn negative_i8_bytes_reinterpret_through_the_full_uint8_range() {
        // -2i8 reinterprets as 254u8, not as a negative dBZ value.
        let scaled = scale_raw_i8(&[-2]);
        assert_eq!(scaled[0], 254.0 / 2.0 - 32.0);
    }

    #[test]
    fn corner_bounds_places_la1_at_the_north_edge() {
        let bounds = corner_bounds(50.0, 13.0, 0.01, 0.01, 3, 3);
        assert_eq!(bounds.north, 50.0);
        assert_eq!(bounds.west, 13.0);
        assert_eq!(bounds.south, 50.0 - 0.01 * 2.0);
        assert_eq!(bounds.east, 13.0 + 0.01 * 2.0);
    }

    #[test]
    fn nc_product_selects_pscappi_variable() {
        assert_eq!(nc_product("pscappi"), "refl2D_pscappi");
        assert_eq!(nc_product("cmax"), "refl2D");
    }

    #[test]
    fn ts_from_path_falls_back_when_unparseable() {
        assert_eq!(ts_from_path(Path::new("/tmp/garbage.nc")), "00000000_0000");
    }
}
