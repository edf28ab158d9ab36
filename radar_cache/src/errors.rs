// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadarCacheError>;

#[derive(Error, Debug)]
pub enum RadarCacheError {
    #[error("common error {0}")]
    CommonError(#[from] radar_common::RadarCommonError),

    #[error("codec error: {0}")]
    CodecError(String),
}

pub fn codec_error(msg: impl ToString) -> RadarCacheError {
    RadarCacheError::CodecError(msg.to_string())
}
