// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

pub mod reproject;
pub mod compositor;

pub use reproject::{direct_reproject, fast_reproject};
pub use compositor::{fmax_nan_aware, CompositeResult, Compositor};
