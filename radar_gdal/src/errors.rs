// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadarGdalError>;

#[derive(Error, Debug)]
pub enum RadarGdalError {
    #[error("GDAL error {0}")]
    GdalError(#[from] gdal::errors::GdalError),

    #[error("invalid CRS definition: {0}")]
    CrsError(String),

    #[error("degenerate transform: {0}")]
    DegenerateTransformError(String),
}

pub fn crs_error(msg: impl ToString) -> RadarGdalError {
    RadarGdalError::CrsError(msg.to_string())
}
