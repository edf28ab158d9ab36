// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::datetime::{parse_ts14, Dated};
use crate::geo::{ProjectionInfo, WgsBounds};
use crate::timestamps::normalize_to_14;

pub const VALUE_MIN_DBZ: f32 = -35.0;
pub const VALUE_MAX_DBZ: f32 = 85.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub product: String,
    pub quantity: String,
    pub source: String,
    pub units: String,
    pub nodata_sentinel: Option<f64>,
    pub gain: f64,
    pub offset: f64,
}

/// The canonical in-memory unit every source adapter decodes into. Units are
/// always dBZ, nodata is always `NaN`, values are always clipped to
/// `[VALUE_MIN_DBZ, VALUE_MAX_DBZ]`, and `timestamp` is always the normalized
/// 14-digit form - decoders are responsible for enforcing all three before
/// handing a frame to the rest of the pipeline.
#[derive(Clone, Debug)]
pub struct RadarFrame {
    pub data: Array2<f32>,
    pub wgs84_bounds: WgsBounds,
    pub projection_info: ProjectionInfo,
    pub metadata: FrameMetadata,
    pub timestamp: String,
}

impl RadarFrame {
    pub fn new(
        data: Array2<f32>,
        wgs84_bounds: WgsBounds,
        projection_info: ProjectionInfo,
        metadata: FrameMetadata,
        timestamp: impl AsRef<str>,
    ) -> crate::errors::Result<Self> {
        let timestamp = normalize_to_14(timestamp.as_ref())?;
        let mut data = data;
        clip_and_mask_in_place(&mut data, metadata.nodata_sentinel);
        Ok(RadarFrame { data, wgs84_bounds, projection_info, metadata, timestamp })
    }

    pub fn dimensions(&self) -> (usize, usize) {
        let shape = self.data.shape();
        (shape[0], shape[1])
    }

    pub fn valid_pixel_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }
}

impl Dated for RadarFrame {
    fn date(&self) -> DateTime<Utc> {
        parse_ts14(&self.timestamp).unwrap_or_else(|_| Utc::now())
    }
}

/// Replace the provider nodata sentinel (if any) with `NaN` and clip every finite
/// value into `[VALUE_MIN_DBZ, VALUE_MAX_DBZ]`. Values already `NaN` stay `NaN`.
pub fn clip_and_mask_in_place(data: &mut Array2<f32>, nodata_sentinel: Option<f64>) {
    let sentinel = nodata_sentinel.map(|s| s as f32);
    for v in data.iter_mut() {
        if let Some(s) = sentinel {
            if (*v - s).abs() < f32::EPSILON {
                *v = f32::NAN;
                continue;
            }
        }
        if v.is_finite() {
            *v = v.clamp(VALUE_MIN_DBZ, VALUE_MAX_DBZ);
        }
    }
}
