//! HLS delivery
//!
//! Serves the segments of every path over HTTP. Manifests are regenerated
//! from the playlist window on each request; nothing is written to disk.
//!
//! Segment bodies are the stored framed RTP packets (`track | len | rtp`),
//! not MPEG-TS, so stock HLS players cannot decode them without a remuxing
//! proxy in front.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nvr_video::hls::{hls_router, HlsState};
//!
//! let app = hls_router(HlsState {
//!     manager: Arc::clone(&manager),
//!     manifest_wait_timeout: Duration::from_secs(10),
//! });
//! ```

pub mod error;
pub mod manifest;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::path::PathManager;
use crate::server::config::HlsConfig;

pub use error::HlsError;
pub use manifest::live_playlist;
pub use routes::{hls_router, HlsState};

/// HTTP server for the HLS endpoints
#[derive(Debug)]
pub struct HlsServer {
    config: HlsConfig,
    manager: Arc<PathManager>,
}

impl HlsServer {
    /// Create a server for `manager`'s paths; nothing is bound yet
    pub fn new(config: HlsConfig, manager: Arc<PathManager>) -> Self {
        Self { config, manager }
    }

    /// Router serving this server's paths
    pub fn router(&self) -> axum::Router {
        hls_router(HlsState {
            manager: Arc::clone(&self.manager),
            manifest_wait_timeout: self.config.manifest_wait_timeout,
        })
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        Ok(listener)
    }

    /// Serve on `listener` until `shutdown` is cancelled
    pub async fn run_until(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(addr = %addr, "HLS server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("HLS server shut down");
        Ok(())
    }
}
