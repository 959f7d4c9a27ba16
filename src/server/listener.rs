//! RTSP server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::Result;
use crate::path::PathManager;
use crate::server::config::RtspConfig;
use crate::server::connection::Connection;

/// RTSP server
pub struct RtspServer {
    config: RtspConfig,
    manager: Arc<PathManager>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    tasks: TaskTracker,
}

impl RtspServer {
    /// Create a new server routing sessions through `manager`
    pub fn new(config: RtspConfig, manager: Arc<PathManager>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            manager,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
            tasks: TaskTracker::new(),
        }
    }

    /// Get a reference to the path manager
    pub fn manager(&self) -> &Arc<PathManager> {
        &self.manager
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        Ok(listener)
    }

    /// Accept connections on `listener` until `shutdown` is cancelled
    ///
    /// Open connections observe the same token and close on their own;
    /// [`RtspServer::wait`] waits for them.
    pub async fn run_until(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(addr = %listener.local_addr()?, "RTSP server listening");

        let result = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener, &shutdown) => result,
        };

        self.tasks.close();
        result
    }

    /// Wait for every connection task to finish
    pub async fn wait(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.tasks.len()
    }

    async fn accept_loop(&self, listener: &TcpListener, shutdown: &CancellationToken) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr, shutdown);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr, shutdown: &CancellationToken) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        // Generate session ID
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        // Spawn connection handler
        let config = self.config.clone();
        let manager = Arc::clone(&self.manager);
        let shutdown = shutdown.clone();

        self.tasks.spawn(async move {
            // Held for the lifetime of the connection
            let _permit = permit;

            let mut connection =
                Connection::new(session_id, socket, peer_addr, config, manager, shutdown);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}
