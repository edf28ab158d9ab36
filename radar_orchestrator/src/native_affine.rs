// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Derives a source's native pixel->CRS affine from its decoded WGS84 corner
//! bounds. Generalizes `radar_grid`'s own test fixtures (which hand-build an
//! `Affine` from a source's corner bounds + dimensions) into a real function, since
//! no source adapter hands back a native affine directly - only a WGS84 bounding
//! box and a tagged `ProjectionInfo`.

use gdal::spatial_ref::CoordTransform;

use radar_common::frame::RadarFrame;
use radar_common::geo::{Affine, MercatorBounds, WgsBounds};
use radar_gdal::{spatial_ref_from_proj4, wgs84_spatial_ref, RadarGdalError};

use crate::errors::Result;

/// Builds the affine mapping a source's own pixel grid onto its native CRS,
/// approximating the grid as regular in that CRS - the same assumption
/// `compute_transform_grid`'s own corner-bounds tests already make.
pub fn native_affine(frame: &RadarFrame) -> Result<Affine> {
    let (height, width) = frame.dimensions();
    match frame.projection_info.proj4_string() {
        None => Ok(bounds_to_affine(&frame.wgs84_bounds, width, height)),
        Some(proj4) => {
            let wgs84 = wgs84_spatial_ref()?;
            let src = spatial_ref_from_proj4(proj4)?;
            let transform = CoordTransform::new(&wgs84, &src).map_err(RadarGdalError::from)?;

            let b = &frame.wgs84_bounds;
            let mut xs = [b.west, b.east, b.west, b.east];
            let mut ys = [b.south, b.south, b.north, b.north];
            radar_gdal::transform_points_batch(&transform, &mut xs, &mut ys)?;

            let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
            let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
            let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let bounds = MercatorBounds { min_x, min_y, max_x, max_y };
            Ok(Affine::from_bounds(&bounds, width, height))
        }
    }
}

fn bounds_to_affine(b: &WgsBounds, width: usize, height: usize) -> Affine {
    let bounds = MercatorBounds { min_x: b.west, min_y: b.south, max_x: b.east, max_y: b.north };
    Affine::from_bounds(&bounds, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_common::frame::FrameMetadata;
    use radar_common::geo::{ProjectionInfo, WgsBounds};

    fn frame(projection_info: ProjectionInfo) -> RadarFrame {
        RadarFrame::new(
            ndarray::Array2::from_elem((4, 4), 0.0f32),
            WgsBounds { west: 10.0, east: 20.0, south: 40.0, north: 50.0 },
            projection_info,
            FrameMetadata {
                product: "test".into(),
                quantity: "DBZH".into(),
                source: "dwd".into(),
                units: "dBZ".into(),
                nodata_sentinel: None,
                gain: 1.0,
                offset: 0.0,
            },
            "20260101120000",
        )
        .unwrap()
    }

    #[test]
    fn wgs84_source_affine_matches_bounds() {
        let f = frame(ProjectionInfo::Wgs84);
        let affine = native_affine(&f).unwrap();
        let (x, y) = affine.apply(0.0, 0.0);
        assert!((x - 10.0).abs() < 1e-9);
        assert!((y - 50.0).abs() < 1e-9);
    }
}
