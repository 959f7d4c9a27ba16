//! RTSP wire protocol
//!
//! - `constants`: limits, status codes and header values
//! - `message`: requests, responses, interleaved frames and header helpers
//! - `codec`: `tokio_util` codec turning a TCP stream into frames

pub mod codec;
pub mod constants;
pub mod message;

pub use codec::RtspCodec;
pub use message::{Frame, Headers, Method, Request, Response, TcpTransport};
