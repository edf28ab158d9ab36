// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use gdal::spatial_ref::CoordTransform;
use ndarray::Array2;
use radar_common::geo::{Affine, MercatorBounds, WgsBounds};
use radar_gdal::{default_mercator_transform, mercator_to_source_transform, web_mercator_spatial_ref, wgs84_spatial_ref};

use crate::errors::Result;

pub const CURRENT_VERSION: u32 = 1;

#[derive(Clone, Debug)]
pub struct TransformGrid {
    pub source_name: String,
    /// `row_idx[dst]`/`col_idx[dst]` index into the source array; `-1` means
    /// out-of-bounds (no source pixel maps there).
    pub row_idx: Array2<i16>,
    pub col_idx: Array2<i16>,
    pub src_shape: (usize, usize),
    pub dst_shape: (usize, usize),
    pub dst_wgs84_bounds: WgsBounds,
    pub mercator_bounds: MercatorBounds,
    pub version: u32,
}

/// Compute a transform grid mapping every Web-Mercator destination pixel, within
/// `wgs_bounds` at `resolution_m`, to the nearest source pixel of a grid whose
/// native pixel->CRS mapping is `src_affine` (in `src_proj4`'s CRS, or WGS84 if
/// `src_proj4` is `None`).
///
/// Only one coordinate transform call is issued for the whole destination grid -
/// never a per-pixel GDAL round trip - which is what keeps this cheap enough to
/// run once per source and cache forever.
pub fn compute_transform_grid(
    source_name: &str,
    src_shape: (usize, usize),
    src_proj4: Option<&str>,
    src_affine: &Affine,
    wgs_bounds: &WgsBounds,
    resolution_m: f64,
) -> Result<TransformGrid> {
    let (dst_affine, dst_h, dst_w) = default_mercator_transform(wgs_bounds, resolution_m)?;
    let transform = mercator_to_source_transform(src_proj4)?;

    let n = dst_h * dst_w;
    let mut xs = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    for row in 0..dst_h {
        for col in 0..dst_w {
            let (x, y) = dst_affine.apply(col as f64 + 0.5, row as f64 + 0.5);
            xs.push(x);
            ys.push(y);
        }
    }
    radar_gdal::transform_points_batch(&transform, &mut xs, &mut ys)?;

    let (src_h, src_w) = src_shape;
    let mut row_idx = Array2::<i16>::from_elem((dst_h, dst_w), -1);
    let mut col_idx = Array2::<i16>::from_elem((dst_h, dst_w), -1);

    for row in 0..dst_h {
        for col in 0..dst_w {
            let i = row * dst_w + col;
            if let Some((src_col, src_row)) = src_affine.invert(xs[i], ys[i]) {
                if src_col >= -0.5 && src_col < src_w as f64 - 0.5 && src_row >= -0.5 && src_row < src_h as f64 - 0.5 {
                    let sc = src_col.round().clamp(0.0, (src_w - 1) as f64) as i16;
                    let sr = src_row.round().clamp(0.0, (src_h - 1) as f64) as i16;
                    row_idx[[row, col]] = sr;
                    col_idx[[row, col]] = sc;
                }
            }
        }
    }

    let dst_wgs84_bounds = mercator_bounds_to_wgs84(&dst_affine.corner_bounds(dst_w, dst_h))?;

    Ok(TransformGrid {
        source_name: source_name.to_string(),
        row_idx,
        col_idx,
        src_shape,
        dst_shape: (dst_h, dst_w),
        dst_wgs84_bounds,
        mercator_bounds: dst_affine.corner_bounds(dst_w, dst_h),
        version: CURRENT_VERSION,
    })
}

fn mercator_bounds_to_wgs84(bounds: &MercatorBounds) -> Result<WgsBounds> {
    let web_mercator = web_mercator_spatial_ref()?;
    let wgs84 = wgs84_spatial_ref()?;
    let transform = CoordTransform::new(&web_mercator, &wgs84)?;
    let mut xs = [bounds.min_x, bounds.max_x];
    let mut ys = [bounds.min_y, bounds.max_y];
    radar_gdal::transform_points_batch(&transform, &mut xs, &mut ys)?;
    Ok(WgsBounds {
        west: xs[0].min(xs[1]),
        east: xs[0].max(xs[1]),
        south: ys[0].min(ys[1]),
        north: ys[0].max(ys[1]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Every index `compute_transform_grid` produces is either the -1
        /// sentinel or strictly inside `src_shape` - whatever resolution or
        /// destination bounds it's asked for, it must never hand back an
        /// index `fast_reproject` would read out of bounds with.
        #[test]
        fn grid_indices_are_always_in_bounds_or_sentinel(
            resolution_m in 2_000.0f64..50_000.0,
            src_h in 10usize..60,
            src_w in 10usize..60,
        ) {
            let wgs_bounds = WgsBounds { west: 2.50, east: 26.40, south: 44.00, north: 56.20 };
            let src_affine = Affine {
                x0: wgs_bounds.west,
                dx: wgs_bounds.width() / src_w as f64,
                rx: 0.0,
                y0: wgs_bounds.north,
                ry: 0.0,
                dy: -wgs_bounds.height() / src_h as f64,
            };
            let grid = compute_transform_grid("test", (src_h, src_w), None, &src_affine, &wgs_bounds, resolution_m).unwrap();
            for &r in grid.row_idx.iter() {
                prop_assert!(r == -1 || (r >= 0 && (r as usize) < src_h));
            }
            for &c in grid.col_idx.iter() {
                prop_assert!(c == -1 || (c >= 0 && (c as usize) < src_w));
            }
        }
    }

    #[test]
    fn computes_identity_ish_grid_for_wgs84_source() {
        // a source already covering the whole reference area at coarse resolution
        let wgs_bounds = WgsBounds { west: 2.50, east: 26.40, south: 44.00, north: 56.20 };
        let src_h = 100usize;
        let src_w = 200usize;
        let src_affine = Affine {
            x0: wgs_bounds.west,
            dx: wgs_bounds.width() / src_w as f64,
            rx: 0.0,
            y0: wgs_bounds.north,
            ry: 0.0,
            dy: -wgs_bounds.height() / src_h as f64,
        };
        let grid = compute_transform_grid("test", (src_h, src_w), None, &src_affine, &wgs_bounds, 5000.0).unwrap();
        assert_eq!(grid.src_shape, (src_h, src_w));
        assert!(grid.dst_shape.0 > 0 && grid.dst_shape.1 > 0);
        // center pixel should map inside source bounds, not -1
        let (ch, cw) = (grid.dst_shape.0 / 2, grid.dst_shape.1 / 2);
        assert!(grid.row_idx[[ch, cw]] >= 0);
        assert!(grid.col_idx[[ch, cw]] >= 0);
    }
}
