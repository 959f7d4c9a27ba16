//! Media handling
//!
//! This module provides:
//! - SDP parsing into per-track stream info
//! - Segment framing of raw RTP packets
//! - Cutting publisher packets into segments
//! - The per-path playlist readers block on

pub mod playlist;
pub mod sdp;
pub mod segment;
pub mod segmenter;

pub use playlist::{Playlist, SegmentLookup};
pub use sdp::{MediaKind, StreamInfo, Track};
pub use segment::{Packets, Segment, SegmentPacket};
pub use segmenter::Segmenter;
