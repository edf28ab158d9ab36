// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

pub mod colormap;
pub mod coverage_mask;
pub mod errors;
pub mod extent_index;
pub mod png_sink;

pub use colormap::{ColorMap, ReflectivityColorMap, DBZ_MAX, DBZ_MIN};
pub use coverage_mask::{coverage_from_raw, resize_nearest, write_coverage_mask, UNCOVERED_COLOR};
pub use errors::{RadarRenderError, Result};
pub use extent_index::{write_extent_index, ExtentDescriptor};
pub use png_sink::{FilePngSink, PngSink};
