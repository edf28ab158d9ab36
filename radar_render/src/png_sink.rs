// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use std::path::Path;

use image::{ImageBuffer, Rgba};
use ndarray::Array2;

use crate::colormap::ColorMap;
use crate::errors::{dimension_error, Result};

/// Writes a reflectivity grid to an image sink. Implementations differ in where
/// the bytes end up (local file today; nothing stops a future sink from pushing
/// straight to object storage), not in how pixels are produced.
pub trait PngSink {
    fn write_frame(&self, data: &Array2<f32>, colormap: &dyn ColorMap, out_path: &Path) -> Result<()>;
}

/// Renders a reflectivity grid to an RGBA PNG on the local filesystem. NaN
/// (no-data) pixels are written fully transparent rather than colored, so
/// composites layer correctly over a basemap.
#[derive(Default)]
pub struct FilePngSink;

impl PngSink for FilePngSink {
    fn write_frame(&self, data: &Array2<f32>, colormap: &dyn ColorMap, out_path: &Path) -> Result<()> {
        let (height, width) = data.dim();
        if height == 0 || width == 0 {
            return Err(dimension_error("cannot render an empty grid"));
        }

        let mut buf: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::new(width as u32, height as u32);
        for (y, row) in data.outer_iter().enumerate() {
            for (x, &value) in row.iter().enumerate() {
                let pixel = if value.is_nan() { [0, 0, 0, 0] } else { colormap.color_for_dbz(value) };
                buf.put_pixel(x as u32, y as u32, Rgba(pixel));
            }
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        buf.save(out_path)?;
        Ok(())
    }
}
