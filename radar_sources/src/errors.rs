// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadarSourcesError {
    #[error("common error: {0}")]
    CommonError(#[from] radar_common::RadarCommonError),

    #[error("gdal error: {0}")]
    GdalError(#[from] radar_gdal::RadarGdalError),

    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("netcdf error: {0}")]
    NetCdfError(String),

    #[error("unknown product {product:?} for source {source:?}")]
    UnknownProductError { source: String, product: String },

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("not found: {0}")]
    NotFoundError(String),

    #[error("expected a binary response from {url} but got content-type {content_type:?}")]
    UnexpectedContentType { url: String, content_type: String },
}

pub type Result<T> = std::result::Result<T, RadarSourcesError>;

pub fn decode_error(msg: impl Into<String>) -> RadarSourcesError {
    RadarSourcesError::DecodeError(msg.into())
}

pub fn netcdf_error(msg: impl std::fmt::Display) -> RadarSourcesError {
    RadarSourcesError::NetCdfError(msg.to_string())
}

pub fn unknown_source_error(name: impl Into<String>) -> RadarSourcesError {
    RadarSourcesError::NotFoundError(format!("unknown source: {}", name.into()))
}

pub fn unexpected_content_type_error(url: impl Into<String>, content_type: impl Into<String>) -> RadarSourcesError {
    RadarSourcesError::UnexpectedContentType { url: url.into(), content_type: content_type.into() }
}
