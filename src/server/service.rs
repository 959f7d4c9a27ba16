//! Video server facade
//!
//! Owns the path manager and both listeners. The embedding application
//! registers paths and gets back the addresses clients use plus a segment
//! handle for its own consumers (recording, analysis).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::hls::HlsServer;
use crate::path::{HlsMuxer, PathConf, PathError, PathManager};
use crate::server::config::ServerConfig;
use crate::server::listener::RtspServer;

/// Addresses and segment handle of a registered path
#[derive(Debug, Clone)]
pub struct ServerPath {
    /// Playlist URL for HLS clients
    pub hls_address: String,
    /// URL publishers and RTSP readers connect to
    pub rtsp_address: String,
    /// Lower transport RTSP clients must use
    pub rtsp_protocol: &'static str,
    /// Segment handle
    pub muxer: HlsMuxer,
}

/// Removes its path when cancelled
#[derive(Debug)]
pub struct PathCanceller {
    manager: Weak<PathManager>,
    name: String,
}

impl PathCanceller {
    /// Name of the path this canceller removes
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the path, failing its blocked readers
    pub async fn cancel(self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.remove_path(&self.name).await;
        }
    }
}

/// RTSP ingest and RTSP/HLS delivery on loopback
pub struct Server {
    manager: Arc<PathManager>,
    rtsp: Arc<RtspServer>,
    hls: Arc<HlsServer>,
    shutdown: CancellationToken,
    config: ServerConfig,
    rtsp_addr: OnceLock<SocketAddr>,
    hls_addr: OnceLock<SocketAddr>,
    started: AtomicBool,
    tasks: TaskTracker,
}

impl Server {
    /// Create a server; nothing is bound until [`Server::start`]
    ///
    /// Cancelling `shutdown` stops both listeners, closes every session
    /// and fails every blocked reader.
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Self {
        let manager = Arc::new(PathManager::with_config(config.paths.clone()));
        let rtsp = Arc::new(RtspServer::new(config.rtsp.clone(), Arc::clone(&manager)));
        let hls = Arc::new(HlsServer::new(config.hls.clone(), Arc::clone(&manager)));

        Self {
            manager,
            rtsp,
            hls,
            shutdown,
            config,
            rtsp_addr: OnceLock::new(),
            hls_addr: OnceLock::new(),
            started: AtomicBool::new(false),
            tasks: TaskTracker::new(),
        }
    }

    /// Bind both listeners and start serving in the background
    ///
    /// Fails with [`Error::AlreadyStarted`] on a second call.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let rtsp_listener = self.rtsp.bind().await?;
        let hls_listener = self.hls.bind().await?;
        let _ = self.rtsp_addr.set(rtsp_listener.local_addr()?);
        let _ = self.hls_addr.set(hls_listener.local_addr()?);

        let rtsp = Arc::clone(&self.rtsp);
        let token = self.shutdown.clone();
        self.tasks.spawn(async move {
            if let Err(e) = rtsp.run_until(rtsp_listener, token).await {
                tracing::error!(error = %e, "RTSP server error");
            }
            rtsp.wait().await;
        });

        let hls = Arc::clone(&self.hls);
        let token = self.shutdown.clone();
        self.tasks.spawn(async move {
            if let Err(e) = hls.run_until(hls_listener, token).await {
                tracing::error!(error = %e, "HLS server error");
            }
        });

        let cleanup = self.manager.spawn_shutdown_task(self.shutdown.clone());
        self.tasks.spawn(async move {
            if let Err(e) = cleanup.await {
                tracing::error!(error = %e, "Path manager shutdown task failed");
            }
        });

        tracing::info!(
            rtsp = %self.rtsp_addr(),
            hls = %self.hls_addr(),
            "Server started"
        );
        Ok(())
    }

    /// Register a path and return its addresses
    pub async fn new_path(
        &self,
        name: &str,
        conf: PathConf,
    ) -> std::result::Result<(ServerPath, PathCanceller), PathError> {
        let muxer = self.manager.add_path(name, conf).await?;

        let path = ServerPath {
            hls_address: format!("http://{}/hls/{}/index.m3u8", self.hls_addr(), name),
            rtsp_address: format!("rtsp://{}/{}", self.rtsp_addr(), name),
            rtsp_protocol: "tcp",
            muxer,
        };
        let canceller = PathCanceller {
            manager: Arc::downgrade(&self.manager),
            name: name.to_string(),
        };

        Ok((path, canceller))
    }

    /// Remove a path; unknown names are ignored
    pub async fn remove_path(&self, name: &str) {
        self.manager.remove_path(name).await;
    }

    /// Check if a path is registered
    pub async fn path_exist(&self, name: &str) -> bool {
        self.manager.path_exists(name).await
    }

    /// HLS endpoints, for mounting in a host application's router
    pub fn hls_router(&self) -> axum::Router {
        self.hls.router()
    }

    /// Get a reference to the path manager
    pub fn manager(&self) -> &Arc<PathManager> {
        &self.manager
    }

    /// RTSP address, the bound one once started
    pub fn rtsp_addr(&self) -> SocketAddr {
        self.rtsp_addr
            .get()
            .copied()
            .unwrap_or(self.config.rtsp.bind_addr)
    }

    /// HLS address, the bound one once started
    pub fn hls_addr(&self) -> SocketAddr {
        self.hls_addr
            .get()
            .copied()
            .unwrap_or(self.config.hls.bind_addr)
    }

    /// Wait for the listeners and every connection to finish
    ///
    /// Returns once the shutdown token was cancelled and everything closed.
    pub async fn wait(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}
