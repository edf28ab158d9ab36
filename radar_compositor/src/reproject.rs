// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use ndarray::{Array2, Zip};
use radar_common::geo::Affine;
use radar_gdal::Result;
use radar_grid::TransformGrid;

/// Apply a precomputed `TransformGrid` to `data`: gather `data[row_idx, col_idx]`
/// into a destination-shaped array, `NaN` wherever the grid has no source pixel.
/// Expressed as a flat `Zip` over the three arrays rather than nested index loops,
/// so it vectorises instead of re-deriving index arithmetic on every element.
pub fn fast_reproject(data: &Array2<f32>, grid: &TransformGrid) -> Array2<f32> {
    let mut out = Array2::<f32>::from_elem(grid.dst_shape, f32::NAN);
    let (src_h, src_w) = grid.src_shape;

    Zip::from(&mut out)
        .and(&grid.row_idx)
        .and(&grid.col_idx)
        .for_each(|dst, &r, &c| {
            if r >= 0 && c >= 0 {
                let (r, c) = (r as usize, c as usize);
                if r < src_h && c < src_w {
                    *dst = data[[r, c]];
                }
            }
        });

    out
}

/// Reprojects `data` into `dst_shape`/`dst_affine` (Web Mercator) from
/// `src_proj4`/`src_affine` without a precomputed grid: every destination pixel
/// centre is transformed back to the source CRS and sampled by nearest neighbour
/// on the spot. This is the independent, on-the-fly reference path `fast_reproject`
/// is checked against - it never shares code with `compute_transform_grid`, so it
/// cannot reproduce a bug in that grid's own index math.
pub fn direct_reproject(data: &Array2<f32>, src_proj4: Option<&str>, src_affine: &Affine, dst_shape: (usize, usize), dst_affine: &Affine) -> Result<Array2<f32>> {
    let (dst_h, dst_w) = dst_shape;
    let (src_h, src_w) = (data.shape()[0], data.shape()[1]);

    let transform = radar_gdal::mercator_to_source_transform(src_proj4)?;
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

    let mut out = Array2::<f32>::from_elem(dst_shape, f32::NAN);
    for row in 0..dst_h {
        for col in 0..dst_w {
            let i = row * dst_w + col;
            if let Some((src_col, src_row)) = src_affine.invert(xs[i], ys[i]) {
                if src_col >= -0.5 && src_col < src_w as f64 - 0.5 && src_row >= -0.5 && src_row < src_h as f64 - 0.5 {
                    let sc = src_col.round().clamp(0.0, (src_w - 1) as f64) as usize;
                    let sr = src_row.round().clamp(0.0, (src_h - 1) as f64) as usize;
                    out[[row, col]] = data[[sr, sc]];
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn identity_grid(h: usize, w: usize) -> TransformGrid {
        let mut row_idx = ndarray::Array2::<i16>::zeros((h, w));
        let mut col_idx = ndarray::Array2::<i16>::zeros((h, w));
        for r in 0..h {
            for c in 0..w {
                row_idx[[r, c]] = r as i16;
                col_idx[[r, c]] = c as i16;
            }
        }
        TransformGrid {
            source_name: "test".into(),
            row_idx,
            col_idx,
            src_shape: (h, w),
            dst_shape: (h, w),
            dst_wgs84_bounds: radar_common::geo::WgsBounds { west: 0.0, east: 1.0, south: 0.0, north: 1.0 },
            mercator_bounds: radar_common::geo::MercatorBounds { min_x: 0.0, min_y: 0.0, max_x: 1.0, max_y: 1.0 },
            version: 1,
        }
    }

    #[test]
    fn identity_grid_reproduces_input() {
        let data = arr2(&[[1.0f32, 2.0], [3.0, 4.0]]);
        let grid = identity_grid(2, 2);
        let out = fast_reproject(&data, &grid);
        assert_eq!(out, data);
    }

    #[test]
    fn out_of_bounds_entries_become_nan() {
        let data = arr2(&[[1.0f32, 2.0], [3.0, 4.0]]);
        let mut grid = identity_grid(2, 2);
        grid.row_idx[[0, 0]] = -1;
        let out = fast_reproject(&data, &grid);
        assert!(out[[0, 0]].is_nan());
        assert_eq!(out[[0, 1]], 2.0);
    }

    #[test]
    fn direct_reproject_agrees_with_the_precomputed_grid() {
        // A WGS84 source already covering the destination area at coarse
        // resolution, same fixture compute_transform_grid's own test uses.
        let wgs_bounds = radar_common::geo::WgsBounds { west: 2.50, east: 26.40, south: 44.00, north: 56.20 };
        let (src_h, src_w) = (20usize, 40usize);
        let src_affine = Affine {
            x0: wgs_bounds.west,
            dx: wgs_bounds.width() / src_w as f64,
            rx: 0.0,
            y0: wgs_bounds.north,
            ry: 0.0,
            dy: -wgs_bounds.height() / src_h as f64,
        };
        let mut data = Array2::<f32>::zeros((src_h, src_w));
        for r in 0..src_h {
            for c in 0..src_w {
                data[[r, c]] = (r * src_w + c) as f32;
            }
        }

        let grid = radar_grid::compute_transform_grid("test", (src_h, src_w), None, &src_affine, &wgs_bounds, 20_000.0).unwrap();
        let (dst_affine, dst_h, dst_w) = radar_gdal::default_mercator_transform(&wgs_bounds, 20_000.0).unwrap();
        assert_eq!((dst_h, dst_w), grid.dst_shape);

        let via_grid = fast_reproject(&data, &grid);
        let via_direct = direct_reproject(&data, None, &src_affine, (dst_h, dst_w), &dst_affine).unwrap();

        for r in 0..dst_h {
            for c in 0..dst_w {
                let (a, b) = (via_grid[[r, c]], via_direct[[r, c]]);
                assert!(a.is_nan() == b.is_nan(), "nan mismatch at ({r},{c}): grid={a} direct={b}");
                if !a.is_nan() {
                    assert_eq!(a, b, "value mismatch at ({r},{c})");
                }
            }
        }
    }
}
