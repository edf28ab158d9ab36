// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use radar_common::cache::{validate_source_name, CacheKey, Codec};
use radar_common::errors::codec_error;
use radar_common::frame::FrameMetadata;
use radar_common::geo::{ProjectionInfo, WgsBounds};
use radar_common::{RadarCommonError, RadarFrame};
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, RadarCommonError>;

/// A cached frame plus the wall-clock time it was written, used by
/// `ProcessedDataCache` to enforce the TTL. The raw `f32` array is stored as a flat
/// little-endian payload after the JSON sidecar - not re-derived-serialized through
/// `serde` - matching the NPZ-equivalent container described for the cache.
#[derive(Clone)]
pub struct ProcessedEntry {
    pub frame: RadarFrame,
    pub cached_at: i64,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FrameKey {
    pub source: String,
    pub product: String,
    pub ts12: String,
}

impl FrameKey {
    pub fn new(source: &str, product: &str, ts12: &str) -> Result<Self> {
        validate_source_name(source)?;
        Ok(FrameKey { source: source.to_string(), product: product.to_string(), ts12: ts12.to_string() })
    }
}

impl CacheKey for FrameKey {
    fn local_filename(&self) -> String {
        format!("{}/{}_{}_{}.npz", self.source, self.source, self.product, self.ts12)
    }

    fn object_key(&self) -> String {
        format!("iradar-data/data/{}/{}_{}_{}.npz", self.source, self.source, self.product, self.ts12)
    }
}

#[derive(Serialize, Deserialize)]
struct EntrySidecar {
    source: String,
    timestamp: String,
    product: String,
    extent: WgsBounds,
    projection: ProjectionInfo,
    dimensions: (usize, usize),
    source_metadata: FrameMetadata,
    cached_at: i64,
}

pub struct FrameCodec;

impl Codec<ProcessedEntry> for FrameCodec {
    fn encode(&self, entry: &ProcessedEntry) -> Result<Vec<u8>> {
        let (h, w) = entry.frame.dimensions();
        let sidecar = EntrySidecar {
            source: entry.frame.metadata.source.clone(),
            timestamp: entry.frame.timestamp.clone(),
            product: entry.frame.metadata.product.clone(),
            extent: entry.frame.wgs84_bounds,
            projection: entry.frame.projection_info.clone(),
            dimensions: (h, w),
            source_metadata: entry.frame.metadata.clone(),
            cached_at: entry.cached_at,
        };
        let header = serde_json::to_vec(&sidecar).map_err(|e| codec_error(e.to_string()))?;

        let mut out = Vec::with_capacity(8 + header.len() + entry.frame.data.len() * 4);
        out.extend_from_slice(b"RFRM");
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        for v in entry.frame.data.iter() {
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<ProcessedEntry> {
        if bytes.len() < 8 || &bytes[0..4] != b"RFRM" {
            return Err(codec_error("bad magic"));
        }
        let header_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let header_start: usize = 8;
        let header_end = header_start.checked_add(header_len).ok_or_else(|| codec_error("header length overflow"))?;
        if bytes.len() < header_end {
            return Err(codec_error("truncated header"));
        }
        let sidecar: EntrySidecar = serde_json::from_slice(&bytes[header_start..header_end]).map_err(|e| codec_error(e.to_string()))?;

        let (h, w) = sidecar.dimensions;
        let n = h.saturating_mul(w);
        let payload = &bytes[header_end..];
        if payload.len() != n * 4 {
            return Err(codec_error("payload size does not match declared dimensions"));
        }
        let mut data = ndarray::Array2::<f32>::zeros((h, w));
        for (i, v) in data.iter_mut().enumerate() {
            *v = f32::from_le_bytes(payload[i * 4..i * 4 + 4].try_into().unwrap());
        }

        let frame = RadarFrame {
            data,
            wgs84_bounds: sidecar.extent,
            projection_info: sidecar.projection,
            metadata: sidecar.source_metadata,
            timestamp: sidecar.timestamp,
        };
        Ok(ProcessedEntry { frame, cached_at: sidecar.cached_at })
    }
}
