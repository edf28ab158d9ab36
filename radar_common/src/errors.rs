// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadarCommonError>;

#[derive(Error, Debug)]
pub enum RadarCommonError {
    #[error("build error {0}")]
    BuildError(#[from] radar_build::RadarBuildError),

    #[error("IO error {0}")]
    IOError(#[from] std::io::Error),

    #[error("serde error {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("time parse error: {0}")]
    TimestampError(String),

    #[error("cache codec error: {0}")]
    CodecError(String),

    #[error("cache key rejected: {0}")]
    InvalidKeyError(String),

    #[error("no object error: {0}")]
    NoObjectError(String),

    #[cfg(feature = "s3")]
    #[error("S3 get object error {0}")]
    S3GetError(#[from] aws_smithy_runtime_api::client::result::SdkError<aws_sdk_s3::operation::get_object::GetObjectError, aws_smithy_runtime_api::http::Response>),

    #[cfg(feature = "s3")]
    #[error("S3 put object error {0}")]
    S3PutError(#[from] aws_smithy_runtime_api::client::result::SdkError<aws_sdk_s3::operation::put_object::PutObjectError, aws_smithy_runtime_api::http::Response>),

    #[cfg(feature = "s3")]
    #[error("S3 head object error {0}")]
    S3HeadError(#[from] aws_smithy_runtime_api::client::result::SdkError<aws_sdk_s3::operation::head_object::HeadObjectError, aws_smithy_runtime_api::http::Response>),

    #[cfg(feature = "s3")]
    #[error("S3 list objects error {0}")]
    S3ListError(#[from] aws_smithy_runtime_api::client::result::SdkError<aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Error, aws_smithy_runtime_api::http::Response>),

    #[cfg(feature = "s3")]
    #[error("S3 byte stream error {0}")]
    S3ByteStreamError(#[from] aws_smithy_types::byte_stream::error::Error),

    #[error("misc error: {0}")]
    MiscError(String),
}

pub fn misc_error(msg: impl ToString) -> RadarCommonError {
    RadarCommonError::MiscError(msg.to_string())
}

pub fn timestamp_error(msg: impl ToString) -> RadarCommonError {
    RadarCommonError::TimestampError(msg.to_string())
}

pub fn codec_error(msg: impl ToString) -> RadarCommonError {
    RadarCommonError::CodecError(msg.to_string())
}

pub fn invalid_key_error(msg: impl ToString) -> RadarCommonError {
    RadarCommonError::InvalidKeyError(msg.to_string())
}

pub fn no_object_error(msg: impl ToString) -> RadarCommonError {
    RadarCommonError::NoObjectError(msg.to_string())
}
