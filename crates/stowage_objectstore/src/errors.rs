//! ObjectStore errors

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror;

use stowage_core::Error as CoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// S3 error codes that mean the part list of a completion request was not acceptable.
const ASSEMBLY_ERROR_CODES: &[&str] = &["InvalidPart", "InvalidPartOrder", "EntityTooSmall"];

/// General purpose backend error handling.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http error")]
    HTTPError(#[from] http::Error),

    #[error("aws sdk put object error")]
    AWSSDKPutObjectError(
        #[from] SdkError<aws_sdk_s3::operation::put_object::PutObjectError>,
    ),
    #[error("aws sdk get object error")]
    AWSSDKGetObjectError(
        #[from] SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
    ),
    #[error("aws sdk list objects error")]
    AWSSDKListObjectsV2Error(
        #[from] SdkError<aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Error>,
    ),
    #[error("aws sdk create multipart upload error")]
    AWSSDKCreateMultiPartUploadError(
        #[from]
        SdkError<aws_sdk_s3::operation::create_multipart_upload::CreateMultipartUploadError>,
    ),
    #[error("aws sdk upload part error")]
    AWSSDKUploadPartError(
        #[from] SdkError<aws_sdk_s3::operation::upload_part::UploadPartError>,
    ),
    #[error("aws sdk complete multipart upload error")]
    AWSSDKCompleteMultipartUploadError(
        #[from]
        SdkError<aws_sdk_s3::operation::complete_multipart_upload::CompleteMultipartUploadError>,
    ),
    #[error("aws sdk abort multipart upload error")]
    AWSSDKAbortMultipartUploadError(
        #[from]
        SdkError<aws_sdk_s3::operation::abort_multipart_upload::AbortMultipartUploadError>,
    ),
    #[error("aws sdk presigning config error")]
    AWSSDKPresigningConfigError(#[from] aws_sdk_s3::presigning::PresigningConfigError),

    #[error("failed to initiate multipart upload: {0}")]
    FailedToInitiateMultipartUpload(&'static str),

    #[error("no such upload: {0}")]
    NoSuchUpload(String),

    #[error("invalid part: {0}")]
    InvalidPart(String),
}

impl Error {
    fn detail(&self) -> String {
        match self {
            Error::AWSSDKPutObjectError(e) => format!("{}", DisplayErrorContext(e)),
            Error::AWSSDKGetObjectError(e) => format!("{}", DisplayErrorContext(e)),
            Error::AWSSDKListObjectsV2Error(e) => format!("{}", DisplayErrorContext(e)),
            Error::AWSSDKCreateMultiPartUploadError(e) => format!("{}", DisplayErrorContext(e)),
            Error::AWSSDKUploadPartError(e) => format!("{}", DisplayErrorContext(e)),
            Error::AWSSDKCompleteMultipartUploadError(e) => format!("{}", DisplayErrorContext(e)),
            Error::AWSSDKAbortMultipartUploadError(e) => format!("{}", DisplayErrorContext(e)),
            e => format!("{e}"),
        }
    }
}

impl From<Error> for CoreError {
    fn from(e: Error) -> CoreError {
        match &e {
            Error::AWSSDKCompleteMultipartUploadError(SdkError::ServiceError(se))
                if se
                    .err()
                    .code()
                    .map(|code| ASSEMBLY_ERROR_CODES.contains(&code))
                    .unwrap_or(false) =>
            {
                CoreError::Assembly(e.detail())
            }
            Error::InvalidPart(s) => CoreError::Assembly(s.clone()),
            _ => CoreError::Backend(e.detail()),
        }
    }
}
