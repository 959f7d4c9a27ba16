//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::path::ManagerConfig;

/// Default RTSP port
pub const DEFAULT_RTSP_PORT: u16 = 8554;

/// Default HLS port
pub const DEFAULT_HLS_PORT: u16 = 8888;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// RTSP listener options
#[derive(Debug, Clone)]
pub struct RtspConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Maximum packets buffered in one unfinalized segment
    pub read_buffer_count: usize,

    /// Idle timeout (disconnect a non-playing session if no data received)
    pub idle_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            bind_addr: loopback(DEFAULT_RTSP_PORT),
            max_connections: 0, // Unlimited
            read_buffer_count: 2048,
            idle_timeout: Duration::from_secs(60),
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl RtspConfig {
    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-segment packet cap
    pub fn read_buffer_count(mut self, count: usize) -> Self {
        self.read_buffer_count = count.max(1);
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY on accepted sockets
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

/// HLS listener options
#[derive(Debug, Clone)]
pub struct HlsConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Longest time a manifest request waits for a segment
    pub manifest_wait_timeout: Duration,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            bind_addr: loopback(DEFAULT_HLS_PORT),
            manifest_wait_timeout: Duration::from_secs(10),
        }
    }
}

impl HlsConfig {
    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the manifest wait timeout
    pub fn manifest_wait_timeout(mut self, timeout: Duration) -> Self {
        self.manifest_wait_timeout = timeout;
        self
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub rtsp: RtspConfig,
    pub hls: HlsConfig,
    pub paths: ManagerConfig,
}

impl ServerConfig {
    /// Listen on loopback only, on the given ports
    ///
    /// Port 0 picks a free port; see [`crate::Server::rtsp_addr`].
    pub fn local(rtsp_port: u16, hls_port: u16) -> Self {
        Self {
            rtsp: RtspConfig::default().bind(loopback(rtsp_port)),
            hls: HlsConfig::default().bind(loopback(hls_port)),
            paths: ManagerConfig::default(),
        }
    }

    /// Set the path manager options
    pub fn paths(mut self, paths: ManagerConfig) -> Self {
        self.paths = paths;
        self
    }

    /// Set the RTSP options
    pub fn rtsp(mut self, rtsp: RtspConfig) -> Self {
        self.rtsp = rtsp;
        self
    }

    /// Set the HLS options
    pub fn hls(mut self, hls: HlsConfig) -> Self {
        self.hls = hls;
        self
    }
}
