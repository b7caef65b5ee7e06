//! Envelope responses and the API error type.
//!
//! Every API answer is an [`Envelope`]. Failures use `code = 1` with HTTP 200,
//! except authentication failures (not logged in, gateway stopped) which use
//! `code = 2` with HTTP 401.

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;
use wxgate_protocol::Envelope;

use crate::buffer::BufferError;
use crate::context::StopCause;
use crate::fanout::FanOutError;
use crate::remote::RemoteError;
use crate::upload::MergeError;

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::ok(data)))
}

pub fn empty() -> ApiResult<()> {
    Ok(Json(Envelope::empty()))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),

    /// The serve context stopped; reported like an authentication failure.
    #[error(transparent)]
    Stopped(#[from] StopCause),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Upload(#[from] MergeError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_login() -> Self {
        ApiError::Unauthorized("not login".to_string())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(_) | ApiError::Stopped(_) => (
                StatusCode::UNAUTHORIZED,
                Json(Envelope::unauthorized(self.to_string())),
            )
                .into_response(),
            _ => {
                warn!(error = %self, "Request failed");
                (StatusCode::OK, Json(Envelope::error(self.to_string()))).into_response()
            }
        }
    }
}

impl From<BufferError> for ApiError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::Stopped(cause) => ApiError::Stopped(cause),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<FanOutError<RemoteError>> for ApiError {
    fn from(err: FanOutError<RemoteError>) -> Self {
        match err {
            FanOutError::Job(e) => ApiError::Remote(e),
            FanOutError::Cancelled(cause) => ApiError::Stopped(cause),
            FanOutError::Panicked => ApiError::Internal("lookup task panicked".to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}
