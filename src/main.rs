//! nvr-video server
//!
//! Run with: nvr-video --path cam1 --path cam2
//!
//! ## Publishing
//!
//! With ffmpeg:
//!   ffmpeg -re -i input.mp4 -c copy -f rtsp -rtsp_transport tcp rtsp://127.0.0.1:8554/cam1
//!
//! ## Playing
//!
//! RTSP:  ffplay -rtsp_transport tcp rtsp://127.0.0.1:8554/cam1
//! HLS:   http://127.0.0.1:8888/hls/cam1/index.m3u8

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use nvr_video::{ManagerConfig, PathConf, Server, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "nvr-video")]
#[command(about = "RTSP ingest with RTSP and HLS redistribution")]
struct Cli {
    /// RTSP port (loopback only)
    #[arg(long, env = "NVR_RTSP_PORT", default_value_t = 8554)]
    rtsp_port: u16,

    /// HLS port (loopback only)
    #[arg(long, env = "NVR_HLS_PORT", default_value_t = 8888)]
    hls_port: u16,

    /// Path to register at startup (repeatable)
    #[arg(long = "path", env = "NVR_PATHS", value_delimiter = ',')]
    paths: Vec<String>,

    /// Let publishers create paths on first ANNOUNCE
    #[arg(long, env = "NVR_DYNAMIC_PATHS")]
    dynamic_paths: bool,

    /// Segments retained per path
    #[arg(long, env = "NVR_SEGMENT_COUNT", default_value_t = 7)]
    segment_count: usize,

    /// Target segment duration in milliseconds
    #[arg(long, env = "NVR_SEGMENT_DURATION_MS", default_value_t = 1000)]
    segment_duration_ms: u64,

    /// Longest time a segment stays open, in milliseconds
    #[arg(long, env = "NVR_SEGMENT_MAX_HOLD_MS", default_value_t = 4000)]
    segment_max_hold_ms: u64,

    /// Maximum packets buffered in one unfinalized segment
    #[arg(long, env = "NVR_READ_BUFFER_COUNT", default_value_t = 2048)]
    read_buffer_count: usize,

    /// Maximum concurrent RTSP connections (0 = unlimited)
    #[arg(long, env = "NVR_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,
}

impl Cli {
    fn path_conf(&self) -> PathConf {
        PathConf::default()
            .segment_count(self.segment_count)
            .segment_duration(Duration::from_millis(self.segment_duration_ms))
            .segment_max_hold(Duration::from_millis(self.segment_max_hold_ms))
    }

    fn server_config(&self) -> ServerConfig {
        let base = ServerConfig::local(self.rtsp_port, self.hls_port);
        let rtsp = base
            .rtsp
            .clone()
            .read_buffer_count(self.read_buffer_count)
            .max_connections(self.max_connections);

        base.rtsp(rtsp)
            .paths(
                ManagerConfig::default()
                    .allow_dynamic_paths(self.dynamic_paths)
                    .default_path(self.path_conf()),
            )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nvr_video=debug")),
        )
        .init();

    let shutdown = CancellationToken::new();
    let server = Server::new(cli.server_config(), shutdown.clone());
    server.start().await.context("failed to start server")?;

    let mut cancellers = Vec::new();
    for name in &cli.paths {
        let (path, canceller) = server
            .new_path(name, cli.path_conf())
            .await
            .with_context(|| format!("failed to register path {}", name))?;

        tracing::info!(
            path = %name,
            rtsp = %path.rtsp_address,
            hls = %path.hls_address,
            "Path ready"
        );
        cancellers.push(canceller);
    }

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    tracing::info!("Shutting down");

    for canceller in cancellers {
        canceller.cancel().await;
    }
    shutdown.cancel();
    server.wait().await;

    Ok(())
}
