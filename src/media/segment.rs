//! Finalized media segments
//!
//! A segment is an immutable, ID-ordered chunk of media. Its payload is a
//! sequence of RTP packets, each framed as:
//!
//! ```text
//! +-------+-----------------+-----------------+
//! | track | length (u16 BE) | packet bytes... |
//! +-------+-----------------+-----------------+
//! ```
//!
//! which mirrors RTSP interleaved framing with the channel replaced by the
//! track index, so readers can remap packets onto their own channels.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeDelta, Utc};

/// Size of the per-packet framing header
const PACKET_HEADER_LEN: usize = 3;

/// A finalized media segment
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Strictly increasing per-path identifier
    pub id: u64,
    /// Media duration
    pub duration: Duration,
    /// Framed packet payload
    pub data: Bytes,
    /// Wall-clock time the segment was finalized
    pub finalized_at: DateTime<Utc>,
}

impl Segment {
    /// Create a segment finalized now
    pub fn new(id: u64, duration: Duration, data: Bytes) -> Self {
        Self {
            id,
            duration,
            data,
            finalized_at: Utc::now(),
        }
    }

    /// Wall-clock time of the first sample in the segment
    pub fn started_at(&self) -> DateTime<Utc> {
        let duration = TimeDelta::from_std(self.duration).unwrap_or(TimeDelta::zero());
        self.finalized_at - duration
    }

    /// Iterate over the packets contained in the payload
    pub fn packets(&self) -> Packets {
        Packets {
            data: self.data.clone(),
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// One RTP packet inside a segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPacket {
    /// Track index in the stream description
    pub track: usize,
    /// Raw RTP packet
    pub payload: Bytes,
}

impl SegmentPacket {
    /// Append a framed packet to a segment payload under construction
    ///
    /// Returns false if the packet cannot be framed (track index above 255
    /// or packet larger than 64KiB).
    pub fn encode(track: usize, payload: &[u8], dst: &mut BytesMut) -> bool {
        let (Ok(track), Ok(len)) = (u8::try_from(track), u16::try_from(payload.len())) else {
            return false;
        };
        dst.reserve(PACKET_HEADER_LEN + payload.len());
        dst.put_u8(track);
        dst.put_u16(len);
        dst.put_slice(payload);
        true
    }
}

/// Iterator over the packets of a segment
#[derive(Debug, Clone)]
pub struct Packets {
    data: Bytes,
}

impl Iterator for Packets {
    type Item = SegmentPacket;

    fn next(&mut self) -> Option<SegmentPacket> {
        if self.data.len() < PACKET_HEADER_LEN {
            return None;
        }

        let track = self.data[0] as usize;
        let len = u16::from_be_bytes([self.data[1], self.data[2]]) as usize;
        if self.data.len() < PACKET_HEADER_LEN + len {
            // Truncated payload
            self.data.clear();
            return None;
        }

        let payload = self.data.slice(PACKET_HEADER_LEN..PACKET_HEADER_LEN + len);
        self.data.advance(PACKET_HEADER_LEN + len);

        Some(SegmentPacket { track, payload })
    }
}
