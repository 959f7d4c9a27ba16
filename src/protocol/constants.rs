//! RTSP protocol constants

/// Protocol version spoken by the server
pub const RTSP_VERSION: &str = "RTSP/1.0";

/// Value of the `Server` response header
pub const SERVER_NAME: &str = concat!("nvr-video/", env!("CARGO_PKG_VERSION"));

/// Maximum size of a request/response header block
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Maximum size of a message body (SDP)
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Marker byte of an interleaved binary frame
pub const INTERLEAVED_MAGIC: u8 = b'$';

/// Interleaved frame header: magic, channel, u16 length
pub const INTERLEAVED_HEADER_LEN: usize = 4;

/// Session timeout advertised in the `Session` header (seconds)
pub const SESSION_TIMEOUT_SECS: u64 = 60;

/// Content type of session descriptions
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Methods listed in the OPTIONS `Public` header
pub const PUBLIC_METHODS: &str = "OPTIONS, DESCRIBE, ANNOUNCE, SETUP, PLAY, PAUSE, RECORD, TEARDOWN, GET_PARAMETER, SET_PARAMETER";

/// Status codes used by the server
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const UNSUPPORTED_MEDIA_TYPE: u16 = 415;
    pub const SESSION_NOT_FOUND: u16 = 454;
    pub const METHOD_NOT_VALID_IN_THIS_STATE: u16 = 455;
    pub const UNSUPPORTED_TRANSPORT: u16 = 461;
    pub const NOT_IMPLEMENTED: u16 = 501;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// Reason phrase of a status code
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        415 => "Unsupported Media Type",
        454 => "Session Not Found",
        455 => "Method Not Valid in This State",
        461 => "Unsupported Transport",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
