// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadarGridError>;

#[derive(Error, Debug)]
pub enum RadarGridError {
    #[error("common error {0}")]
    CommonError(#[from] radar_common::RadarCommonError),

    #[error("gdal error {0}")]
    GdalError(#[from] radar_gdal::RadarGdalError),

    #[error("grid codec error: {0}")]
    CodecError(String),

    #[error("grid dimensions out of range: {0}x{1}")]
    DimensionError(usize, usize),
}

pub fn codec_error(msg: impl ToString) -> RadarGridError {
    RadarGridError::CodecError(msg.to_string())
}
