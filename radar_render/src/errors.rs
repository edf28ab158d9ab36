// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadarRenderError {
    #[error("common error: {0}")]
    CommonError(#[from] radar_common::RadarCommonError),

    #[error("image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("dimension mismatch: {0}")]
    DimensionError(String),
}

pub type Result<T> = std::result::Result<T, RadarRenderError>;

pub fn dimension_error(msg: impl Into<String>) -> RadarRenderError {
    RadarRenderError::DimensionError(msg.into())
}
