//! Per-track transport state
//!
//! Each SETUP binds one track of the stream description to a pair of
//! interleaved channels on the session's TCP connection: RTP on the even
//! channel, RTCP on the odd one.

use std::time::Instant;

/// Interleaved channel binding of one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSetup {
    /// Track index in the stream description
    pub track: usize,

    /// Channel carrying RTP
    pub rtp_channel: u8,

    /// Channel carrying RTCP
    pub rtcp_channel: u8,

    /// Time of the SETUP
    pub set_up_at: Instant,
}

impl TrackSetup {
    pub fn new(track: usize, rtp_channel: u8, rtcp_channel: u8) -> Self {
        Self {
            track,
            rtp_channel,
            rtcp_channel,
            set_up_at: Instant::now(),
        }
    }

    /// Check if the binding uses `channel`
    pub fn uses_channel(&self, channel: u8) -> bool {
        channel == self.rtp_channel || channel == self.rtcp_channel
    }

    /// `Transport` header confirming the binding
    pub fn transport_header(&self) -> String {
        format!(
            "RTP/AVP/TCP;unicast;interleaved={}-{}",
            self.rtp_channel, self.rtcp_channel
        )
    }
}
