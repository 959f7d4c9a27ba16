//! Session state machine
//!
//! Tracks an RTSP session from connection to teardown:
//!
//! ```text
//! publish:  Unconnected -> Announced -> SessionSetup -> Recording -> TornDown
//! play:     Unconnected -> Described -> SessionSetup -> Playing   -> TornDown
//!                                           ^             |
//!                                           +--- PAUSE ---+
//! ```
//!
//! OPTIONS, GET_PARAMETER and SET_PARAMETER are keepalives accepted in any
//! live phase. A transport disconnect forces `TornDown` from anywhere.

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use nanoid::nanoid;

use super::stream::TrackSetup;
use crate::error::RtspError;
use crate::protocol::message::Method;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// TCP connected, no ANNOUNCE or DESCRIBE yet
    Unconnected,
    /// Publisher described its stream
    Announced,
    /// Reader fetched the stream description
    Described,
    /// At least one track set up
    SessionSetup,
    /// Publisher is sending media
    Recording,
    /// Reader is receiving media
    Playing,
    /// Session ended
    TornDown,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Unconnected => "unconnected",
            SessionPhase::Announced => "announced",
            SessionPhase::Described => "described",
            SessionPhase::SessionSetup => "setup",
            SessionPhase::Recording => "recording",
            SessionPhase::Playing => "playing",
            SessionPhase::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

/// Direction of the session, fixed by its first ANNOUNCE or DESCRIBE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Publish,
    Play,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique connection ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Publish or play, once known
    pub mode: Option<SessionMode>,

    /// Path the session publishes to or reads from
    pub path_name: Option<String>,

    /// Connection start time
    pub connected_at: Instant,

    /// Value of the `Session` header, issued at the first SETUP
    session_token: Option<String>,

    /// Tracks set up so far
    tracks: Vec<TrackSetup>,

    /// Interleaved packets received
    pub packets_received: u64,

    /// Interleaved packets sent
    pub packets_sent: u64,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Unconnected,
            mode: None,
            path_name: None,
            connected_at: Instant::now(),
            session_token: None,
            tracks: Vec::new(),
            packets_received: 0,
            packets_sent: 0,
        }
    }

    /// Phase the session would enter by accepting `method`
    ///
    /// Does not change the state; call [`SessionState::commit`] once the
    /// request succeeded.
    pub fn next_phase(&self, method: &Method) -> Result<SessionPhase, RtspError> {
        use SessionPhase::*;

        let next = match (method, self.phase, self.mode) {
            (_, TornDown, _) => None,
            (Method::Options | Method::GetParameter | Method::SetParameter, phase, _) => {
                Some(phase)
            }
            (Method::Teardown, _, _) => Some(TornDown),
            (Method::Announce, Unconnected, _) => Some(Announced),
            (Method::Describe, Unconnected | Described, _) => Some(Described),
            (Method::Setup, Announced | Described | SessionSetup, _) => Some(SessionSetup),
            (Method::Record, SessionSetup, Some(SessionMode::Publish)) => Some(Recording),
            (Method::Play, SessionSetup | Playing, Some(SessionMode::Play)) => Some(Playing),
            (Method::Pause, SessionSetup | Playing, Some(SessionMode::Play)) => Some(SessionSetup),
            _ => None,
        };

        next.ok_or_else(|| RtspError::InvalidState {
            method: method.to_string(),
            phase: self.phase.to_string(),
        })
    }

    /// Enter the phase computed by [`SessionState::next_phase`]
    pub fn commit(&mut self, method: &Method, phase: SessionPhase) {
        match method {
            Method::Announce => self.mode = Some(SessionMode::Publish),
            Method::Describe if self.mode.is_none() => self.mode = Some(SessionMode::Play),
            _ => {}
        }

        if self.phase != phase {
            tracing::trace!(
                session_id = self.id,
                from = %self.phase,
                to = %phase,
                "Session phase change"
            );
        }
        self.phase = phase;
    }

    /// Transport went away
    pub fn on_disconnect(&mut self) {
        self.phase = SessionPhase::TornDown;
    }

    /// Session token, issuing one on first use
    pub fn session_token(&mut self) -> &str {
        self.session_token.get_or_insert_with(|| nanoid!(16))
    }

    /// Session token if one was issued
    pub fn issued_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Bind `track` to interleaved channels
    ///
    /// Without requested channels the next free even/odd pair is used.
    pub fn add_track(
        &mut self,
        track: usize,
        requested: Option<(u8, u8)>,
    ) -> Result<&TrackSetup, RtspError> {
        if self.tracks.iter().any(|t| t.track == track) {
            return Err(RtspError::InvalidTrack(format!("track {} already set up", track)));
        }

        let (rtp, rtcp) = match requested {
            Some(channels) => channels,
            None => self.free_channels()?,
        };
        if rtp == rtcp || self.tracks.iter().any(|t| t.uses_channel(rtp) || t.uses_channel(rtcp)) {
            return Err(RtspError::InvalidTrack(format!(
                "channels {}-{} already in use",
                rtp, rtcp
            )));
        }

        self.tracks.push(TrackSetup::new(track, rtp, rtcp));
        self.tracks
            .last()
            .ok_or_else(|| RtspError::InvalidTrack("track not stored".into()))
    }

    fn free_channels(&self) -> Result<(u8, u8), RtspError> {
        (0..=127u8)
            .map(|pair| (pair * 2, pair * 2 + 1))
            .find(|(rtp, rtcp)| {
                !self
                    .tracks
                    .iter()
                    .any(|t| t.uses_channel(*rtp) || t.uses_channel(*rtcp))
            })
            .ok_or_else(|| RtspError::InvalidTrack("no free interleaved channels".into()))
    }

    /// Tracks set up so far
    pub fn tracks(&self) -> &[TrackSetup] {
        &self.tracks
    }

    /// Track carried on an RTP channel
    ///
    /// Returns None for RTCP and unbound channels.
    pub fn track_for_rtp_channel(&self, channel: u8) -> Option<usize> {
        self.tracks
            .iter()
            .find(|t| t.rtp_channel == channel)
            .map(|t| t.track)
    }

    /// RTP channel a track is sent on
    pub fn rtp_channel_for_track(&self, track: usize) -> Option<u8> {
        self.tracks
            .iter()
            .find(|t| t.track == track)
            .map(|t| t.rtp_channel)
    }

    /// Check if media is flowing from the peer
    pub fn is_recording(&self) -> bool {
        self.phase == SessionPhase::Recording
    }

    /// Check if media is flowing to the peer
    pub fn is_playing(&self) -> bool {
        self.phase == SessionPhase::Playing
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn state() -> SessionState {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8554);
        SessionState::new(1, addr)
    }

    fn step(state: &mut SessionState, method: Method) -> Result<SessionPhase, RtspError> {
        let phase = state.next_phase(&method)?;
        state.commit(&method, phase);
        Ok(phase)
    }

    #[test]
    fn test_publish_lifecycle() {
        let mut state = state();

        assert_eq!(step(&mut state, Method::Options), Ok(SessionPhase::Unconnected));
        assert_eq!(step(&mut state, Method::Announce), Ok(SessionPhase::Announced));
        assert_eq!(state.mode, Some(SessionMode::Publish));
        assert_eq!(step(&mut state, Method::Setup), Ok(SessionPhase::SessionSetup));
        assert_eq!(step(&mut state, Method::Setup), Ok(SessionPhase::SessionSetup));
        assert_eq!(step(&mut state, Method::Record), Ok(SessionPhase::Recording));
        assert!(state.is_recording());
        assert_eq!(step(&mut state, Method::GetParameter), Ok(SessionPhase::Recording));
        assert_eq!(step(&mut state, Method::Teardown), Ok(SessionPhase::TornDown));
    }

    #[test]
    fn test_play_lifecycle_with_pause() {
        let mut state = state();

        step(&mut state, Method::Describe).unwrap();
        assert_eq!(state.mode, Some(SessionMode::Play));
        step(&mut state, Method::Setup).unwrap();
        assert_eq!(step(&mut state, Method::Play), Ok(SessionPhase::Playing));
        assert_eq!(step(&mut state, Method::Pause), Ok(SessionPhase::SessionSetup));
        assert_eq!(step(&mut state, Method::Play), Ok(SessionPhase::Playing));
    }

    #[test]
    fn test_invalid_transitions() {
        let mut state = state();

        assert!(matches!(
            state.next_phase(&Method::Record),
            Err(RtspError::InvalidState { .. })
        ));
        assert!(state.next_phase(&Method::Setup).is_err());

        // A publisher can't PLAY
        step(&mut state, Method::Announce).unwrap();
        step(&mut state, Method::Setup).unwrap();
        assert!(state.next_phase(&Method::Play).is_err());
        assert!(state.next_phase(&Method::Describe).is_err());
        assert!(state.next_phase(&Method::Other("FOO".into())).is_err());
    }

    #[test]
    fn test_disconnect_ends_everything() {
        let mut state = state();
        step(&mut state, Method::Describe).unwrap();

        state.on_disconnect();

        assert_eq!(state.phase, SessionPhase::TornDown);
        assert!(state.next_phase(&Method::Options).is_err());
    }

    #[test]
    fn test_track_channels() {
        let mut state = state();

        state.add_track(0, Some((0, 1))).unwrap();
        assert_eq!(state.add_track(1, None).unwrap().rtp_channel, 2);
        assert!(state.add_track(0, Some((4, 5))).is_err());
        assert!(state.add_track(2, Some((3, 6))).is_err());

        assert_eq!(state.track_for_rtp_channel(2), Some(1));
        assert_eq!(state.track_for_rtp_channel(1), None);
        assert_eq!(state.rtp_channel_for_track(0), Some(0));
    }

    #[test]
    fn test_session_token_is_stable() {
        let mut state = state();
        assert_eq!(state.issued_token(), None);

        let token = state.session_token().to_string();
        assert_eq!(token.len(), 16);
        assert_eq!(state.session_token(), token);
        assert_eq!(state.issued_token(), Some(token.as_str()));
    }

    #[test]
    fn test_session_tokens_differ_between_sessions() {
        let mut first = state();
        let mut second = state();
        assert_ne!(first.session_token(), second.session_token());
    }
}
