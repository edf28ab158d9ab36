// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use ndarray::{Array2, Zip};
use radar_common::geo::{MercatorBounds, WgsBounds};

#[cfg(any(test, feature = "test-hooks"))]
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct CompositeResult {
    pub data: Array2<f32>,
    pub extent: WgsBounds,
    pub mercator_bounds: MercatorBounds,
    pub resolution_m: f64,
    pub grid_size: (usize, usize),
    pub sources: Vec<String>,
    pub coverage_percent: f64,
    pub valid_pixels: usize,
    pub total_pixels: usize,
}

/// Accumulates reprojected sources onto the fixed Reference Grid via per-pixel
/// `NaN`-aware maximum. Commutative and associative by construction, so the order
/// sources are added in never changes the output (§8 property 4).
pub struct Compositor {
    data: Array2<f32>,
    extent: WgsBounds,
    mercator_bounds: MercatorBounds,
    resolution_m: f64,
    sources: Vec<String>,

    #[cfg(any(test, feature = "test-hooks"))]
    peak_resident_frames: AtomicUsize,
    #[cfg(any(test, feature = "test-hooks"))]
    currently_resident: AtomicUsize,
}

/// `fmax(NaN, x) = x`, `fmax(x, NaN) = x`, `fmax(NaN, NaN) = NaN`, else `max(a, b)`.
#[inline]
pub fn fmax_nan_aware(a: f32, b: f32) -> f32 {
    if a.is_nan() { b } else if b.is_nan() { a } else { a.max(b) }
}

impl Compositor {
    pub fn new(dst_shape: (usize, usize), extent: WgsBounds, mercator_bounds: MercatorBounds, resolution_m: f64) -> Self {
        Compositor {
            data: Array2::from_elem(dst_shape, f32::NAN),
            extent,
            mercator_bounds,
            resolution_m,
            sources: Vec::new(),
            #[cfg(any(test, feature = "test-hooks"))]
            peak_resident_frames: AtomicUsize::new(0),
            #[cfg(any(test, feature = "test-hooks"))]
            currently_resident: AtomicUsize::new(0),
        }
    }

    /// Merge an already reference-grid-shaped, already reprojected array for
    /// `source_name` into the running composite.
    pub fn add_source(&mut self, source_name: &str, reprojected: &Array2<f32>) {
        #[cfg(any(test, feature = "test-hooks"))]
        {
            let n = self.currently_resident.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_resident_frames.fetch_max(n, Ordering::SeqCst);
        }

        Zip::from(&mut self.data).and(reprojected).for_each(|dst, &src| {
            *dst = fmax_nan_aware(*dst, src);
        });
        self.sources.push(source_name.to_string());

        #[cfg(any(test, feature = "test-hooks"))]
        self.currently_resident.fetch_sub(1, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "test-hooks"))]
    pub fn peak_resident_frames(&self) -> usize {
        self.peak_resident_frames.load(Ordering::SeqCst)
    }

    pub fn get_composite(&self) -> CompositeResult {
        let total_pixels = self.data.len();
        let valid_pixels = self.data.iter().filter(|v| v.is_finite()).count();
        let coverage_percent = if total_pixels > 0 { 100.0 * valid_pixels as f64 / total_pixels as f64 } else { 0.0 };

        CompositeResult {
            data: self.data.clone(),
            extent: self.extent,
            mercator_bounds: self.mercator_bounds,
            resolution_m: self.resolution_m,
            grid_size: (self.data.shape()[0], self.data.shape()[1]),
            sources: self.sources.clone(),
            coverage_percent,
            valid_pixels,
            total_pixels,
        }
    }

    pub fn clear_cache(&mut self) {
        // interpolation scratch space lives entirely in `radar_compositor::reproject`'s
        // stack-local temporaries today; this is the hook for future scratch buffers
    }
}
