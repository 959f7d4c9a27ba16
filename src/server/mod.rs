//! RTSP server
//!
//! - `config`: listener and server options
//! - `listener`: accept loop and connection limit
//! - `connection`: per-connection session driver
//! - `service`: the [`Server`] facade tying RTSP, HLS and paths together

pub mod config;
pub mod connection;
pub mod listener;
pub mod service;

pub use config::{HlsConfig, RtspConfig, ServerConfig};
pub use listener::RtspServer;
pub use service::{PathCanceller, Server, ServerPath};
