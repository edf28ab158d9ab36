// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Thin safe wrapper around `gdal::spatial_ref` for the two things the
//! Transform-Grid Cache needs: building a destination affine + grid size for a
//! source's native footprint in Web Mercator, and batch-transforming whole
//! destination-pixel coordinate arrays back to a source CRS in one call. This is
//! the generalization of the teacher's single-point `transform_point_2d` into a
//! vectorised grid transform, since a forward-warp per output pixel is the hot loop
//! of grid computation and must not round-trip through GDAL's FFI one point at a
//! time.

pub mod errors;

use gdal::spatial_ref::{CoordTransform, SpatialRef};
use radar_common::geo::{Affine, MercatorBounds, WgsBounds};

pub use errors::{RadarGdalError, Result};

pub fn wgs84_spatial_ref() -> Result<SpatialRef> {
    Ok(SpatialRef::from_epsg(4326)?)
}

pub fn web_mercator_spatial_ref() -> Result<SpatialRef> {
    Ok(SpatialRef::from_epsg(3857)?)
}

pub fn spatial_ref_from_proj4(proj4: &str) -> Result<SpatialRef> {
    SpatialRef::from_proj4(proj4).map_err(|e| errors::crs_error(format!("{proj4}: {e}")))
}

/// Transform one `(x, y)` coordinate through `transform`. Grounded on the
/// single-point path; prefer `transform_points_batch` for anything larger than a
/// handful of points.
pub fn transform_point_2d(transform: &CoordTransform, x: f64, y: f64) -> Result<(f64, f64)> {
    let mut xs = [x];
    let mut ys = [y];
    let mut zs = [0.0];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
    Ok((xs[0], ys[0]))
}

/// Transform an entire destination-pixel coordinate array in one GDAL call. `xs`
/// and `ys` are mutated in place.
pub fn transform_points_batch(transform: &CoordTransform, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
    let mut zs = vec![0.0; xs.len()];
    transform.transform_coords(xs, ys, &mut zs)?;
    Ok(())
}

/// Compute the destination affine + `(height, width)` for a source's WGS84
/// footprint reprojected into Web Mercator at `resolution_m` metres/pixel. This is
/// the standard "default transform" computation (as in rasterio's
/// `calculate_default_transform`): reproject the four corners, take their bounding
/// box, and derive pixel counts from the requested resolution.
pub fn default_mercator_transform(wgs_bounds: &WgsBounds, resolution_m: f64) -> Result<(Affine, usize, usize)> {
    let wgs84 = wgs84_spatial_ref()?;
    let web_mercator = web_mercator_spatial_ref()?;
    let transform = CoordTransform::new(&wgs84, &web_mercator)?;

    let mut xs = [wgs_bounds.west, wgs_bounds.east, wgs_bounds.west, wgs_bounds.east];
    let mut ys = [wgs_bounds.south, wgs_bounds.south, wgs_bounds.north, wgs_bounds.north];
    transform_points_batch(&transform, &mut xs, &mut ys)?;

    let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if !(max_x > min_x) || !(max_y > min_y) {
        return Err(errors::crs_error("degenerate bounds after reprojection to Web Mercator"));
    }

    let mercator_bounds = MercatorBounds { min_x, min_y, max_x, max_y };
    let width = ((max_x - min_x) / resolution_m).ceil().max(1.0) as usize;
    let height = ((max_y - min_y) / resolution_m).ceil().max(1.0) as usize;
    let affine = Affine::from_bounds(&mercator_bounds, width, height);

    Ok((affine, height, width))
}

/// Build the `CoordTransform` used to map destination (Web Mercator) pixel centres
/// back onto a source's native CRS, given either its PROJ4 definition or (for
/// plain lat/lon sources) `None` to mean "source CRS is WGS84".
pub fn mercator_to_source_transform(src_proj4: Option<&str>) -> Result<CoordTransform> {
    let web_mercator = web_mercator_spatial_ref()?;
    let src = match src_proj4 {
        Some(proj4) => spatial_ref_from_proj4(proj4)?,
        None => wgs84_spatial_ref()?,
    };
    Ok(CoordTransform::new(&web_mercator, &src)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mercator_transform_matches_resolution() {
        let bounds = WgsBounds { west: 2.50, east: 26.40, south: 44.00, north: 56.20 };
        let (affine, height, width) = default_mercator_transform(&bounds, 500.0).unwrap();
        assert!(width > 1000 && width < 10000);
        assert!(height > 1000 && height < 10000);
        assert!(affine.dx > 0.0);
        assert!(affine.dy < 0.0);
    }
}
