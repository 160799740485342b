use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use thiserror;

use stowage_core::Error as CoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http invalid header name")]
    HTTPInvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("http invalid header value")]
    HTTPInvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    #[error("endpoint not found")]
    NotFound,

    #[error("{0}")]
    StowageCoreError(#[from] CoreError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[inline]
fn into_error_response(status_code: StatusCode, error: String) -> Response {
    (status_code, Json(ErrorBody { error })).into_response()
}

#[inline]
fn core_error_to_response(e: CoreError) -> Response {
    match e {
        CoreError::Validation(s) => into_error_response(StatusCode::BAD_REQUEST, s),
        CoreError::Assembly(s) => into_error_response(StatusCode::BAD_REQUEST, s),
        CoreError::Backend(s) => {
            tracing::warn!("{:?}", s);
            into_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("internal server error"),
            )
        }
        e @ (CoreError::Transport(_) | CoreError::Integrity(_) | CoreError::Cancelled) => {
            // client-side failures; reaching here means a handler misused the taxonomy
            tracing::warn!("unexpected error in request handler: {e:?}");
            into_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("internal server error"),
            )
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::StowageCoreError(e) => core_error_to_response(e),
            Error::InvalidBody(e) => {
                into_error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {e}"))
            }
            Error::NotFound => into_error_response(StatusCode::NOT_FOUND, format!("{}", self)),
            Error::HTTPInvalidHeaderName(_) | Error::HTTPInvalidHeaderValue(_) => {
                tracing::warn!("{:?}", self);
                into_error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("internal server error"),
                )
            }
        }
    }
}
