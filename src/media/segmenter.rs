//! Cuts incoming RTP packets into segments
//!
//! Payloads are not decoded. Segment boundaries come from the RTP
//! timestamps of the timing track (the first announced track):
//!
//! - media time since the segment start reaches `segment_duration`
//! - or the segment was held open longer than `segment_max_hold`
//!   (e.g. the timing track went silent)
//! - or the segment holds `max_packets` packets
//!
//! The packet that crosses a boundary opens the next segment, so packets
//! sharing a timestamp (one frame) never straddle two segments.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::path::PathConf;

use super::segment::{Segment, SegmentPacket};

/// Minimum RTP header size
const RTP_HEADER_LEN: usize = 12;

/// Segment under construction
#[derive(Debug)]
struct Pending {
    data: BytesMut,
    packets: usize,
    first_timestamp: Option<u32>,
    opened_at: Instant,
}

impl Pending {
    fn new(opened_at: Instant) -> Self {
        Self {
            data: BytesMut::new(),
            packets: 0,
            first_timestamp: None,
            opened_at,
        }
    }
}

/// Groups RTP packets of one publisher into finalized segments
#[derive(Debug)]
pub struct Segmenter {
    next_id: u64,
    target_duration: Duration,
    max_hold: Duration,
    max_packets: usize,
    clock_rate: u32,
    timing_track: usize,
    pending: Option<Pending>,
}

impl Segmenter {
    /// Create a segmenter whose first segment will carry `first_id`
    pub fn new(first_id: u64, conf: &PathConf, clock_rate: u32, max_packets: usize) -> Self {
        Self {
            next_id: first_id,
            target_duration: conf.segment_duration,
            max_hold: conf.segment_max_hold,
            max_packets: max_packets.max(1),
            clock_rate: clock_rate.max(1),
            timing_track: 0,
            pending: None,
        }
    }

    /// ID the next finalized segment will carry
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Add an RTP packet received on `track`
    ///
    /// Returns the previous segment if this packet closed it.
    pub fn push(&mut self, track: usize, packet: &Bytes, now: Instant) -> Option<Segment> {
        let timestamp = if track == self.timing_track {
            rtp_timestamp(packet)
        } else {
            None
        };

        let cut = self.pending.as_ref().and_then(|pending| {
            let media_elapsed = self.media_elapsed(pending, timestamp);
            let held = now.saturating_duration_since(pending.opened_at);

            if media_elapsed >= self.target_duration {
                Some(media_elapsed)
            } else if held >= self.max_hold || pending.packets >= self.max_packets {
                Some(if media_elapsed.is_zero() { held } else { media_elapsed })
            } else {
                None
            }
        });
        let finalized = cut.and_then(|duration| self.finalize(duration));

        let pending = self.pending.get_or_insert_with(|| Pending::new(now));
        if pending.first_timestamp.is_none() {
            pending.first_timestamp = timestamp;
        }
        if SegmentPacket::encode(track, packet, &mut pending.data) {
            pending.packets += 1;
        } else {
            tracing::trace!(track = track, size = packet.len(), "Dropping unframeable packet");
        }

        finalized
    }

    /// Discard the segment under construction
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Number of packets in the segment under construction
    pub fn pending_packets(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.packets)
    }

    fn media_elapsed(&self, pending: &Pending, timestamp: Option<u32>) -> Duration {
        let (Some(first), Some(current)) = (pending.first_timestamp, timestamp) else {
            return Duration::ZERO;
        };

        let ticks = current.wrapping_sub(first);
        // Reordered packet from before the segment start
        if ticks > i32::MAX as u32 {
            return Duration::ZERO;
        }

        Duration::from_secs_f64(ticks as f64 / self.clock_rate as f64)
    }

    fn finalize(&mut self, duration: Duration) -> Option<Segment> {
        let pending = self.pending.take()?;
        let segment = Segment::new(self.next_id, duration, pending.data.freeze());
        self.next_id += 1;
        Some(segment)
    }
}

/// Timestamp field of an RTP version 2 header
fn rtp_timestamp(packet: &[u8]) -> Option<u32> {
    if packet.len() < RTP_HEADER_LEN || packet[0] >> 6 != 2 {
        return None;
    }
    Some(u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]))
}
