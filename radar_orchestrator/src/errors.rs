// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RadarOrchestratorError {
    #[error("common error: {0}")]
    CommonError(#[from] radar_common::RadarCommonError),

    #[error("build error: {0}")]
    BuildError(#[from] radar_build::RadarBuildError),

    #[error("sources error: {0}")]
    SourcesError(#[from] radar_sources::RadarSourcesError),

    #[error("grid error: {0}")]
    GridError(#[from] radar_grid::RadarGridError),

    #[error("cache error: {0}")]
    CacheError(#[from] radar_cache::RadarCacheError),

    #[error("render error: {0}")]
    RenderError(#[from] radar_render::RadarRenderError),

    #[error("gdal error: {0}")]
    GdalError(#[from] radar_gdal::RadarGdalError),

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("core quorum not met: {0:?}")]
    QuorumError(Vec<String>),
}

pub type Result<T> = std::result::Result<T, RadarOrchestratorError>;

pub fn config_error(msg: impl Into<String>) -> RadarOrchestratorError {
    RadarOrchestratorError::ConfigError(msg.into())
}
