// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

pub mod errors;
pub mod grid;
pub mod cache;

pub use errors::{RadarGridError, Result};
pub use grid::{compute_transform_grid, TransformGrid, CURRENT_VERSION};
pub use cache::{new_transform_grid_cache, GridCodec, GridKey, TransformGridCache};
