// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadarBuildError>;

#[derive(Error, Debug)]
pub enum RadarBuildError {
    #[error("IO error {0}")]
    IOError(#[from] std::io::Error),

    #[error("config RON error {0}")]
    RonError(#[from] ron::Error),

    #[error("config deserialize RON error {0}")]
    RonSerdeError(#[from] ron::error::SpannedError),

    #[error("env var error: {0}")]
    VarError(#[from] std::env::VarError),

    #[error("config not found: {0}")]
    ConfigNotFoundError(String),

    #[error("invalid config value: {0}")]
    ConfigValueError(String),
}

pub fn config_value_error(msg: impl ToString) -> RadarBuildError {
    RadarBuildError::ConfigValueError(msg.to_string())
}
