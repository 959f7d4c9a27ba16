//! Path registry
//!
//! A path is a named live stream: one publisher feeding a [`Playlist`] and
//! any number of RTSP and HLS readers consuming it.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<PathManager>
//!                     ┌─────────────────────────┐
//!                     │ paths: HashMap<Name,    │
//!                     │   Arc<Path> {           │
//!                     │     playlist,           │
//!                     │     publisher_id,       │
//!                     │     readers,            │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [RTSP reader]             [HLS GET]
//!    segmenter.push()       next_segment()            segments()
//!         │                       │                       │
//!         └──► playlist.append() ─┴──► per-ID wake ───────┘
//! ```
//!
//! Sessions and [`HlsMuxer`] handles keep a `Weak<Path>`; removing a path
//! from the manager closes its playlist and fails every suspended reader.
//!
//! [`Playlist`]: crate::media::Playlist

pub mod config;
pub mod entry;
pub mod error;
pub mod manager;
pub mod muxer;

pub use config::{ManagerConfig, PathConf};
pub use entry::{Path, PathStats};
pub use error::PathError;
pub use manager::PathManager;
pub use muxer::HlsMuxer;
