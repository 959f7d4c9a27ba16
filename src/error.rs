//! Error types
//!
//! Each concern has its own error enum; [`Error`] wraps them for the
//! connection and server layers.

use std::io;

use thiserror::Error;

use crate::path::PathError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Socket or listener failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// RTSP protocol violation
    #[error("RTSP error: {0}")]
    Rtsp(#[from] RtspError),

    /// Segment buffer failure
    #[error("playlist error: {0}")]
    Playlist(#[from] PlaylistError),

    /// Path registry failure
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// Connection idle for too long
    #[error("connection timed out")]
    Timeout,

    /// `Server::start` was called more than once
    #[error("server already started")]
    AlreadyStarted,
}

/// Errors returned by the segment buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaylistError {
    /// The playlist was torn down (path removed or server shutting down)
    #[error("playlist closed")]
    Closed,

    /// The writer appended a segment out of sequence
    #[error("non-contiguous segment id: expected {expected}, got {got}")]
    NonContiguous { expected: u64, got: u64 },

    /// No publisher has ever attached to the path
    #[error("no stream info available")]
    NoStreamInfo,
}

/// RTSP wire and session errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtspError {
    /// Request or response could not be parsed
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Header block exceeds the configured limit
    #[error("header block too large")]
    HeaderTooLarge,

    /// Body exceeds the configured limit
    #[error("body too large: {0} bytes")]
    BodyTooLarge(usize),

    /// Anything other than RTSP/1.x
    #[error("unsupported RTSP version: {0}")]
    UnsupportedVersion(String),

    /// Session description could not be parsed
    #[error("invalid SDP: {0}")]
    InvalidSdp(String),

    /// Method not allowed in the current session phase
    #[error("{method} not valid in phase {phase}")]
    InvalidState { method: String, phase: String },

    /// SETUP referenced a track that is unknown or already set up
    #[error("invalid track setup: {0}")]
    InvalidTrack(String),
}
