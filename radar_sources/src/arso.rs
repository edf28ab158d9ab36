// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! ARSO (Slovenian Environment Agency), Slovenia. The one optional, non-core
//! source: it ships no archive, only the current frame, and its own ASCII
//! "SRD-3" format rather than ODIM_H5 - a text header followed by a data
//! section whose bytes are raw ASCII character codes, not binary samples.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ndarray::Array2;
use tracing::warn;

use radar_common::frame::{FrameMetadata, RadarFrame};
use radar_common::geo::{ProjectionInfo, WgsBounds};
use radar_gdal::{spatial_ref_from_proj4, transform_points_batch};
use gdal::spatial_ref::CoordTransform;

use crate::adapter::{DownloadResult, ExtentOnly, NativeExtent, SessionCache, SourceAdapter};
use crate::errors::{decode_error, Result};
use crate::http::download_to;

const FALLBACK_EXTENT: WgsBounds = WgsBounds { west: 13.2, east: 16.7, south: 45.3, north: 46.9 };
const SIRAD_PROJ4: &str = "+proj=lcc +lat_1=46.12 +lat_2=46.12 +lat_0=46.12 +lon_0=14.815 +x_0=0 +y_0=0 +R=6371000 +units=km +no_defs";
const GRID_NCELL: (usize, usize) = (401, 301);
const GRID_CELLSIZE_KM: f64 = 1.0;
const GEOSS_CELL: (f64, f64) = (205.0, 145.0);

fn product_file(product: &str) -> &'static str {
    match product {
        "rrg" => "si0-rrg.srd",
        _ => "si0-zm.srd",
    }
}

pub struct ArsoAdapter {
    client: reqwest::Client,
    base_url: String,
    cache_dir: PathBuf,
    session: SessionCache,
}

impl ArsoAdapter {
    pub fn new(cache_dir: PathBuf) -> Self {
        ArsoAdapter { client: reqwest::Client::new(), base_url: "https://meteo.arso.gov.si/uploads/probase/www/observ/radar".to_string(), cache_dir, session: SessionCache::new() }
    }

    fn product_url(&self, product: &str) -> String {
        format!("{}/{}", self.base_url, product_file(product))
    }
}

#[async_trait]
impl SourceAdapter for ArsoAdapter {
    fn name(&self) -> &'static str {
        "arso"
    }

    fn is_core(&self) -> bool {
        false
    }

    // ARSO publishes no archive: the endpoint always serves "now", so the
    // only meaningful answer is a single synthetic "current" timestamp,
    // resolved to its real value once the header is actually read back in
    // `download`/`decode`.
    async fn list_available_timestamps(&self, count: usize, _products: &[String], _range: Option<(DateTime<Utc>, DateTime<Utc>)>) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        Ok(vec!["LATEST".to_string()])
    }

    async fn download(&self, timestamps: &[String], products: &[String]) -> Result<Vec<DownloadResult>> {
        let mut results = Vec::new();
        for product in products {
            for timestamp in timestamps {
                if let Some(path) = self.session.get(timestamp, product) {
                    results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: Some(path), cached_in_session: true, error: None });
                    continue;
                }
                let url = self.product_url(product);
                let prefix = format!("arso_{product}_{timestamp}_");
                match download_to(&self.client, &url, &self.cache_dir, &prefix, ".srd").await {
                    Ok(path) => {
                        self.session.insert(timestamp, product, path.clone());
                        results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: Some(path), cached_in_session: false, error: None });
                    }
                    Err(e) => {
                        warn!(source = "arso", %timestamp, %product, error = %e, "download failed");
                        results.push(DownloadResult { timestamp: timestamp.clone(), product: product.clone(), path: None, cached_in_session: false, error: Some(e.to_string()) });
                    }
                }
            }
        }
        Ok(results)
    }

    fn decode(&self, path: &Path) -> Result<RadarFrame> {
        let raw = std::fs::read(path)?;
        let frame = SrdFrame::parse(&raw)?;
        let wgs84_bounds = frame.wgs84_bounds()?;

        let scaled: Vec<f32> = frame.bytes.iter().map(|&b| frame.quantize(b)).collect();
        let data = Array2::from_shape_vec((frame.height, frame.width), scaled).map_err(|e| decode_error(e.to_string()))?;

        let metadata = FrameMetadata {
            product: frame.product.clone(),
            quantity: "DBZH".to_string(),
            source: self.name().to_string(),
            units: "dBZ".to_string(),
            nodata_sentinel: None,
            gain: frame.slope,
            offset: frame.start - frame.slope * frame.offset_byte as f64,
        };
        RadarFrame::new(data, wgs84_bounds, lcc_projection_info(), metadata, frame.timestamp.clone()).map_err(|e| decode_error(e.to_string()))
    }

    fn decode_extent_only(&self, path: &Path) -> Result<ExtentOnly> {
        let raw = std::fs::read(path)?;
        let frame = SrdFrame::parse(&raw)?;
        let wgs84_bounds = frame.wgs84_bounds()?;
        Ok(ExtentOnly { wgs84_bounds, dimensions: (frame.height, frame.width), projection_info: lcc_projection_info() })
    }

    fn native_extent(&self) -> NativeExtent {
        NativeExtent { wgs84_bounds: FALLBACK_EXTENT, mercator_bounds: None, grid_size: GRID_NCELL, resolution_m: GRID_CELLSIZE_KM * 1000.0 }
    }

    fn cleanup_temp_files(&self) -> usize {
        self.session.cleanup()
    }
}

fn lcc_projection_info() -> ProjectionInfo {
    ProjectionInfo::LambertConformalConic { proj4_string: SIRAD_PROJ4.to_string(), lat_0: 46.12, lon_0: 14.815, lat_1: 46.12, lat_2: 46.12 }
}

/// A parsed SRD-3 composite: the ASCII key/value header plus the decoded
/// byte grid, still in its raw 0..=255 form (quantization is applied lazily
/// via `quantize`).
struct SrdFrame {
    width: usize,
    height: usize,
    offset_byte: u8,
    start: f64,
    slope: f64,
    product: String,
    timestamp: String,
    bytes: Vec<u8>,
}

impl SrdFrame {
    fn parse(raw: &[u8]) -> Result<Self> {
        let (header_text, data_start) = split_header(raw)?;
        let header = parse_header(&header_text);

        let (width, height) = header
            .get("ncell")
            .and_then(|v| {
                let mut parts = v.split_whitespace();
                let w: usize = parts.next()?.parse().ok()?;
                let h: usize = parts.next()?.parse().ok()?;
                Some((w, h))
            })
            .unwrap_or(GRID_NCELL);

        let offset_byte = header.get("offset").and_then(|v| v.trim().parse::<f64>().ok()).map(|v| v as u8).unwrap_or(64);
        let start = header.get("start").and_then(|v| v.trim().parse::<f64>().ok()).unwrap_or(12.0);
        let slope = header.get("slope").and_then(|v| v.trim().parse::<f64>().ok()).unwrap_or(3.0);
        let product = header.get("product").cloned().unwrap_or_else(|| "zm".to_string());
        let timestamp = header.get("time").cloned().unwrap_or_else(|| "00000000000000".to_string());

        let bytes = parse_data_section(&raw[data_start..], width * height)?;

        Ok(SrdFrame { width, height, offset_byte, start, slope, product, timestamp, bytes })
    }

    fn quantize(&self, byte: u8) -> f32 {
        if byte == self.offset_byte {
            return f32::NAN;
        }
        (self.start + self.slope * (byte as f64 - self.offset_byte as f64)) as f32
    }

    /// Reproject the grid's four corners from the native Lambert conformal
    /// conic definition to WGS84 using the GEOSS-relative indexing scheme:
    /// grid cell `(i, j)` (1-indexed) sits `(i - geoss_i, geoss_j - j)`
    /// cells away from the projection's false origin, in kilometres.
    fn wgs84_bounds(&self) -> Result<WgsBounds> {
        let to_km = |i: f64, j: f64| ((i - GEOSS_CELL.0) * GRID_CELLSIZE_KM, (GEOSS_CELL.1 - j) * GRID_CELLSIZE_KM);

        let (x0, y0) = to_km(1.0, self.height as f64);
        let (x1, y1) = to_km(self.width as f64, self.height as f64);
        let (x2, y2) = to_km(1.0, 1.0);
        let (x3, y3) = to_km(self.width as f64, 1.0);

        let src = spatial_ref_from_proj4(SIRAD_PROJ4)?;
        let dst = radar_gdal::wgs84_spatial_ref()?;
        let transform = CoordTransform::new(&src, &dst).map_err(|e| decode_error(e.to_string()))?;

        let mut xs = [x0, x1, x2, x3];
        let mut ys = [y0, y1, y2, y3];
        transform_points_batch(&transform, &mut xs, &mut ys)?;

        // gdal's axis order for EPSG:4326 is (lat, lon); xs/ys here are lon/lat
        // since SpatialRef::from_proj4 keeps the traditional GIS ordering.
        let west = xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let east = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let south = ys.iter().cloned().fold(f64::INFINITY, f64::min);
        let north = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Ok(WgsBounds { west, east, south, north })
    }
}

/// Splits the raw file into the header text and the byte offset where the
/// data section begins. The header ends at a line that is exactly `DATA`;
/// the data section itself starts right after that line's terminator.
fn split_header(raw: &[u8]) -> Result<(String, usize)> {
    const MARKER_LF: &[u8] = b"\nDATA\n";
    const MARKER_CRLF: &[u8] = b"\nDATA\r\n";

    let (marker, marker_len) = if let Some(pos) = find_subslice(raw, MARKER_CRLF) {
        (pos, MARKER_CRLF.len())
    } else if let Some(pos) = find_subslice(raw, MARKER_LF) {
        (pos, MARKER_LF.len())
    } else {
        return Err(decode_error("SRD file has no DATA marker"));
    };

    let header_text = String::from_utf8_lossy(&raw[..marker]).to_string();
    Ok((header_text, marker + marker_len))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses `key value1 value2 ... # comment` lines into a map of
/// whitespace-joined value strings, stripping trailing `#` comments.
fn parse_header(text: &str) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for line in text.lines() {
        let line = match line.split_once('#') {
            Some((before, _)) => before,
            None => line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        if let (Some(key), Some(rest)) = (parts.next(), parts.next()) {
            map.insert(key.to_string(), rest.trim().to_string());
        }
    }
    map
}

/// The data section is not binary: each sample is the raw ASCII character
/// code of a byte in the file, with control characters (`< 32`) skipped
/// as formatting whitespace rather than counted as samples.
fn parse_data_section(section: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let bytes: Vec<u8> = section.iter().copied().filter(|&b| b >= 32).take(expected_len).collect();
    if bytes.len() != expected_len {
        return Err(decode_error(format!("SRD data section too short: got {} of {expected_len} samples", bytes.len())));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_srd(width: usize, height: usize, offset: u8, fill: u8) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(format!("product zm\ntime 20260101120000\nncell {width} {height}\noffset {offset}\nstart 12.0\nslope 3.0\n").as_bytes());
        out.extend_from_slice(b"DATA\n");
        out.extend(std::iter::repeat(fill).take(width * height));
        out
    }

    #[test]
    fn parses_header_key_values() {
        let text = "product zm\ntime 20260101120000 # generated\nncell 401 301\n";
        let map = parse_header(text);
        assert_eq!(map.get("product").unwrap(), "zm");
        assert_eq!(map.get("time").unwrap(), "20260101120000");
        assert_eq!(map.get("ncell").unwrap(), "401 301");
    }

    #[test]
    fn splits_on_data_marker() {
        let raw = sample_srd(3, 2, 64, 64);
        let (header, data_start) = split_header(&raw).unwrap();
        assert!(header.contains("ncell 3 2"));
        assert_eq!(&raw[data_start..], &[64u8; 6][..]);
    }

    #[test]
    fn offset_byte_quantizes_to_nan() {
        let raw = sample_srd(2, 2, 64, 64);
        let frame = SrdFrame::parse(&raw).unwrap();
        assert!(frame.bytes.iter().all(|&b| frame.quantize(b).is_nan()));
    }

    #[test]
    fn non_offset_byte_quantizes_via_formula() {
        let raw = sample_srd(2, 2, 64, 70);
        let frame = SrdFrame::parse(&raw).unwrap();
        let expected = 12.0 + 3.0 * (70.0 - 64.0);
        assert!((frame.quantize(70) as f64 - expected).abs() < 1e-6);
    }

    #[test]
    fn control_bytes_in_data_are_skipped() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"ncell 2 2\noffset 64\nstart 12.0\nslope 3.0\n");
        raw.extend_from_slice(b"DATA\n");
        raw.extend_from_slice(&[64, b'\r', 64, b'\n', 64, 64]);
        let frame = SrdFrame::parse(&raw).unwrap();
        assert_eq!(frame.bytes, vec![64, 64, 64, 64]);
    }

    #[test]
    fn short_data_section_is_rejected() {
        let raw = sample_srd(401, 301, 64, 64)[..1000].to_vec();
        assert!(SrdFrame::parse(&raw).is_err());
    }

    #[test]
    fn is_not_a_core_source() {
        let adapter = ArsoAdapter::new(PathBuf::from("/tmp"));
        assert!(!adapter.is_core());
    }
}
