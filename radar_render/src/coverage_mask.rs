// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::path::Path;

use image::{ImageBuffer, Rgba};
use ndarray::Array2;

use crate::errors::{dimension_error, Result};

/// Uncovered pixels render as this color: opaque gray, distinct from both
/// "no data yet" (fully transparent) and any reflectivity color in the scale.
pub const UNCOVERED_COLOR: [u8; 4] = [128, 128, 128, 255];

/// Derives a coverage mask from a source's raw (pre-decode) grid: `true` where
/// the raw value is anything other than that source's nodata sentinel, i.e.
/// inside the radar's physical range regardless of whether precipitation was
/// observed there.
pub fn coverage_from_raw<T: PartialEq + Copy>(raw: &Array2<T>, nodata: T) -> Array2<bool> {
    raw.map(|&v| v != nodata)
}

/// Nearest-neighbor resize of a boolean coverage mask to a target shape, used
/// when a source's native grid doesn't match the composite's rendered PNGs.
pub fn resize_nearest(coverage: &Array2<bool>, target_shape: (usize, usize)) -> Array2<bool> {
    let (src_h, src_w) = coverage.dim();
    let (dst_h, dst_w) = target_shape;
    if (src_h, src_w) == (dst_h, dst_w) {
        return coverage.clone();
    }

    Array2::from_shape_fn((dst_h, dst_w), |(y, x)| {
        let sy = ((y as f64 + 0.5) * src_h as f64 / dst_h as f64) as usize;
        let sx = ((x as f64 + 0.5) * src_w as f64 / dst_w as f64) as usize;
        coverage[(sy.min(src_h - 1), sx.min(src_w - 1))]
    })
}

/// Writes a boolean coverage mask as an RGBA PNG: covered pixels are fully
/// transparent, uncovered pixels are opaque gray.
pub fn write_coverage_mask(coverage: &Array2<bool>, out_path: &Path) -> Result<()> {
    let (height, width) = coverage.dim();
    if height == 0 || width == 0 {
        return Err(dimension_error("cannot render an empty coverage mask"));
    }

    let mut buf: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(width as u32, height as u32);
    for (y, row) in coverage.outer_iter().enumerate() {
        for (x, &covered) in row.iter().enumerate() {
            let pixel = if covered { [0, 0, 0, 0] } else { UNCOVERED_COLOR };
            buf.put_pixel(x as u32, y as u32, Rgba(pixel));
        }
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    buf.save(out_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn coverage_from_raw_excludes_nodata() {
        let raw: Array2<u8> = array![[255, 10], [20, 255]];
        let coverage = coverage_from_raw(&raw, 255u8);
        assert_eq!(coverage, array![[false, true], [true, false]]);
    }

    #[test]
    fn arso_sentinel_marks_entire_grid_covered() {
        // ARSO's offset byte (64) means "no precipitation detected", not "outside
        // coverage" - callers pass a nodata value (-1 as i16) that never matches,
        // so every pixel reports covered.
        let raw: Array2<i16> = array![[64, 64], [0, 64]];
        let coverage = coverage_from_raw(&raw, -1i16);
        assert!(coverage.iter().all(|&c| c));
    }

    #[test]
    fn resize_preserves_shape_when_already_matching() {
        let coverage: Array2<bool> = array![[true, false], [false, true]];
        let resized = resize_nearest(&coverage, (2, 2));
        assert_eq!(resized, coverage);
    }

    #[test]
    fn resize_upsamples_without_introducing_new_true_regions() {
        let coverage: Array2<bool> = array![[true, false]];
        let resized = resize_nearest(&coverage, (2, 4));
        assert_eq!(resized.dim(), (2, 4));
        assert!(resized.row(0).iter().take(2).all(|&c| c));
        assert!(resized.row(0).iter().skip(2).all(|&c| !c));
    }

    #[test]
    fn write_coverage_mask_round_trips_through_png() {
        let coverage: Array2<bool> = array![[true, false]];
        let dir = std::env::temp_dir().join(format!("radar_render_cov_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mask.png");

        write_coverage_mask(&coverage, &path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(loaded.get_pixel(1, 0).0, UNCOVERED_COLOR);

        std::fs::remove_dir_all(&dir).ok();
    }
}
