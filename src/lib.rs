//! nvr-video: live video core of a network video recorder
//!
//! Cameras (or an ingest pipeline) publish RTSP streams into named paths.
//! Each path cuts its stream into segments held in a sliding window, and
//! readers consume them:
//! - RTSP readers get the raw RTP packets over TCP interleaved channels
//! - HLS clients fetch a regenerated playlist and the segments over HTTP
//! - the embedding application reads segments through an [`HlsMuxer`]
//!
//! # Example: Embedded Server
//!
//! ```no_run
//! use nvr_video::{PathConf, Server, ServerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let shutdown = CancellationToken::new();
//!     let server = Server::new(ServerConfig::local(8554, 8888), shutdown.clone());
//!     server.start().await?;
//!
//!     let (path, _canceller) = server.new_path("cam1", PathConf::default()).await?;
//!     println!("publish to {}, watch {}", path.rtsp_address, path.hls_address);
//!
//!     tokio::signal::ctrl_c().await?;
//!     shutdown.cancel();
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod hls;
pub mod media;
pub mod path;
pub mod protocol;
pub mod server;
pub mod session;

// Re-export main types for convenience
pub use error::{Error, PlaylistError, Result, RtspError};
pub use media::{Playlist, Segment, StreamInfo};
pub use path::{HlsMuxer, ManagerConfig, PathConf, PathError, PathManager, PathStats};
pub use server::{HlsConfig, PathCanceller, RtspConfig, Server, ServerConfig, ServerPath};
