// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::sync::Arc;

use radar_common::cache::{validate_source_name, CacheKey, Codec, LayeredCache};
use radar_common::geo::{MercatorBounds, WgsBounds};
use radar_common::store::ObjectStore;

use crate::errors::{codec_error, Result};
use crate::grid::TransformGrid;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GridKey {
    pub source: String,
    pub height: usize,
    pub width: usize,
    pub bounds_hash: Option<u64>,
    pub version: u32,
}

impl GridKey {
    pub fn new(source: &str, height: usize, width: usize, bounds_hash: Option<u64>, version: u32) -> Result<Self> {
        validate_source_name(source)?;
        Ok(GridKey { source: source.to_string(), height, width, bounds_hash, version })
    }

    fn base_name(&self) -> String {
        match self.bounds_hash {
            Some(h) => format!("{}_{}x{}_{:08x}_{}", self.source, self.height, self.width, h, self.version),
            None => format!("{}_{}x{}_{}", self.source, self.height, self.width, self.version),
        }
    }
}

impl CacheKey for GridKey {
    fn local_filename(&self) -> String { format!("{}.bin", self.base_name()) }
    fn object_key(&self) -> String { format!("iradar-data/grid/{}.npz", self.base_name()) }
}

/// Binary format: `row_idx`/`col_idx` raw little-endian `i16` blocks preceded by a
/// small JSON metadata header giving shapes and bounds - no embedded interpreter of
/// any kind, so a corrupt or hostile payload can never do more than fail to parse.
pub struct GridCodec;

#[derive(serde::Serialize, serde::Deserialize)]
struct GridHeader {
    source_name: String,
    src_h: usize,
    src_w: usize,
    dst_h: usize,
    dst_w: usize,
    dst_wgs84_bounds: WgsBounds,
    mercator_bounds: MercatorBounds,
    version: u32,
}

impl Codec<TransformGrid> for GridCodec {
    fn encode(&self, grid: &TransformGrid) -> Result<Vec<u8>> {
        let header = GridHeader {
            source_name: grid.source_name.clone(),
            src_h: grid.src_shape.0,
            src_w: grid.src_shape.1,
            dst_h: grid.dst_shape.0,
            dst_w: grid.dst_shape.1,
            dst_wgs84_bounds: grid.dst_wgs84_bounds,
            mercator_bounds: grid.mercator_bounds,
            version: grid.version,
        };
        let header_bytes = serde_json::to_vec(&header).map_err(|e| codec_error(e.to_string()))?;

        let mut out = Vec::with_capacity(8 + header_bytes.len() + grid.row_idx.len() * 4);
        out.extend_from_slice(b"RGRD");
        out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        for v in grid.row_idx.iter() { out.extend_from_slice(&v.to_le_bytes()); }
        for v in grid.col_idx.iter() { out.extend_from_slice(&v.to_le_bytes()); }
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<TransformGrid> {
        if bytes.len() < 8 || &bytes[0..4] != b"RGRD" {
            return Err(codec_error("bad magic"));
        }
        let header_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let header_start = 8;
        let header_end = header_start.checked_add(header_len).ok_or_else(|| codec_error("header length overflow"))?;
        if bytes.len() < header_end {
            return Err(codec_error("truncated header"));
        }
        let header: GridHeader = serde_json::from_slice(&bytes[header_start..header_end]).map_err(|e| codec_error(e.to_string()))?;

        let n = header.dst_h * header.dst_w;
        let payload = &bytes[header_end..];
        if payload.len() != n * 4 {
            return Err(codec_error("payload size does not match declared dimensions"));
        }
        let mut row_idx = ndarray::Array2::<i16>::zeros((header.dst_h, header.dst_w));
        let mut col_idx = ndarray::Array2::<i16>::zeros((header.dst_h, header.dst_w));
        for (i, v) in row_idx.iter_mut().enumerate() {
            *v = i16::from_le_bytes(payload[i * 2..i * 2 + 2].try_into().unwrap());
        }
        let col_offset = n * 2;
        for (i, v) in col_idx.iter_mut().enumerate() {
            *v = i16::from_le_bytes(payload[col_offset + i * 2..col_offset + i * 2 + 2].try_into().unwrap());
        }

        Ok(TransformGrid {
            source_name: header.source_name,
            row_idx,
            col_idx,
            src_shape: (header.src_h, header.src_w),
            dst_shape: (header.dst_h, header.dst_w),
            dst_wgs84_bounds: header.dst_wgs84_bounds,
            mercator_bounds: header.mercator_bounds,
            version: header.version,
        })
    }
}

pub type TransformGridCache = LayeredCache<GridKey, TransformGrid, GridCodec>;

pub fn new_transform_grid_cache(local_root: impl Into<std::path::PathBuf>, store: Arc<dyn ObjectStore>) -> Result<TransformGridCache> {
    Ok(LayeredCache::new(local_root, store, GridCodec)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_common::geo::Affine;

    #[test]
    fn roundtrips_grid_through_codec() {
        let wgs_bounds = WgsBounds { west: 0.0, east: 1.0, south: 0.0, north: 1.0 };
        let src_affine = Affine { x0: 0.0, dx: 0.01, rx: 0.0, y0: 1.0, ry: 0.0, dy: -0.01 };
        let grid = crate::grid::compute_transform_grid("tst", (100, 100), None, &src_affine, &wgs_bounds, 5000.0).unwrap();
        let codec = GridCodec;
        let bytes = codec.encode(&grid).unwrap();
        let back = codec.decode(&bytes).unwrap();
        assert_eq!(back.dst_shape, grid.dst_shape);
        assert_eq!(back.row_idx, grid.row_idx);
        assert_eq!(back.col_idx, grid.col_idx);
    }

    #[tokio::test]
    async fn bumping_the_grid_version_never_reads_back_the_old_entry() {
        use radar_common::store::NullObjectStore;
        use std::sync::Arc;

        let dir = std::env::temp_dir().join(format!("radar_grid_cache_version_test_{}", std::process::id()));
        let cache = new_transform_grid_cache(&dir, Arc::new(NullObjectStore)).unwrap();

        let wgs_bounds = WgsBounds { west: 0.0, east: 1.0, south: 0.0, north: 1.0 };
        let src_affine = Affine { x0: 0.0, dx: 0.01, rx: 0.0, y0: 1.0, ry: 0.0, dy: -0.01 };
        let grid_v0 = crate::grid::compute_transform_grid("tst", (10, 10), None, &src_affine, &wgs_bounds, 5000.0).unwrap();

        let key_v0 = GridKey::new("tst", 10, 10, None, 0).unwrap();
        cache.put(key_v0.clone(), grid_v0).await.unwrap();
        assert!(cache.get(&key_v0).await.unwrap().is_some());

        // A fresh cache instance (so the lookup can't be served from memory)
        // querying under version 1 must see nothing, not the v0 grid.
        let cache_v1_view = new_transform_grid_cache(&dir, Arc::new(NullObjectStore)).unwrap();
        let key_v1 = GridKey::new("tst", 10, 10, None, 1).unwrap();
        assert!(cache_v1_view.get(&key_v1).await.unwrap().is_none());

        let grid_v1 = crate::grid::compute_transform_grid("tst", (10, 10), None, &src_affine, &wgs_bounds, 5000.0).unwrap();
        cache_v1_view.put(key_v1.clone(), grid_v1).await.unwrap();

        // The original v0 entry is still there, untouched by the v1 write.
        let cache_v0_view = new_transform_grid_cache(&dir, Arc::new(NullObjectStore)).unwrap();
        assert!(cache_v0_view.get(&key_v0).await.unwrap().is_some());
        assert!(cache_v1_view.get(&key_v1).await.unwrap().is_some());
        assert_ne!(key_v0.local_filename(), key_v1.local_filename());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
