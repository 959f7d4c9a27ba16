//! HLS error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::error::PlaylistError;

/// Errors returned by the HLS endpoints
///
/// Every variant maps to a status code with a plain-text body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HlsError {
    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("segment not found: {0}")]
    SegmentNotFound(String),

    #[error("segment {0} is no longer available")]
    SegmentGone(u64),

    #[error("stream not ready: {0}")]
    NotReady(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method not allowed")]
    MethodNotAllowed,
}

impl HlsError {
    pub fn status(&self) -> StatusCode {
        match self {
            HlsError::PathNotFound(_) | HlsError::SegmentNotFound(_) => StatusCode::NOT_FOUND,
            HlsError::SegmentGone(_) => StatusCode::GONE,
            HlsError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            HlsError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HlsError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Map a playlist failure observed while serving `name`
    pub(crate) fn from_playlist(name: &str, err: PlaylistError) -> Self {
        match err {
            PlaylistError::Closed | PlaylistError::NonContiguous { .. } => {
                HlsError::PathNotFound(name.to_string())
            }
            PlaylistError::NoStreamInfo => HlsError::NotReady(name.to_string()),
        }
    }
}

impl IntoResponse for HlsError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, "HLS error: {}", self);
        } else {
            tracing::debug!(status = %status, "HLS error: {}", self);
        }

        (status, self.to_string()).into_response()
    }
}
