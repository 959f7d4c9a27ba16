//! Stream description (SDP) handling
//!
//! Publishers describe their tracks with an SDP body in ANNOUNCE. Only the
//! parts needed to route packets are interpreted: media kind, payload type,
//! codec name and clock rate from `a=rtpmap`, and the track control URL.
//! Everything else is kept verbatim and replayed to readers in DESCRIBE.

use crate::error::RtspError;

/// Media type of a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
    Other(String),
}

impl MediaKind {
    fn parse(s: &str) -> Self {
        match s {
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            other => MediaKind::Other(other.to_string()),
        }
    }
}

/// One media section of the stream description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Media type from the `m=` line
    pub kind: MediaKind,
    /// First payload type of the `m=` line
    pub payload_type: Option<u8>,
    /// Encoding name from `a=rtpmap` (e.g. "H264")
    pub codec: Option<String>,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    /// Control attribute as announced by the publisher
    pub control: Option<String>,
    /// `m=` line
    media_line: String,
    /// Media-level lines other than `a=control`
    attributes: Vec<String>,
}

/// Codec and parameter metadata of a published stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Session-level lines other than `a=control`
    session_lines: Vec<String>,
    /// Media sections in announce order
    pub tracks: Vec<Track>,
}

impl StreamInfo {
    /// Parse a session description
    pub fn from_sdp(sdp: &str) -> Result<Self, RtspError> {
        let mut session_lines = Vec::new();
        let mut tracks: Vec<Track> = Vec::new();

        for line in sdp.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.len() < 2 || line.as_bytes()[1] != b'=' {
                return Err(RtspError::InvalidSdp(format!("bad line: {}", line)));
            }

            if let Some(media) = line.strip_prefix("m=") {
                tracks.push(parse_media_line(line, media)?);
                continue;
            }

            match tracks.last_mut() {
                Some(track) => {
                    if let Some(control) = line.strip_prefix("a=control:") {
                        track.control = Some(control.trim().to_string());
                    } else {
                        if let Some(rtpmap) = line.strip_prefix("a=rtpmap:") {
                            apply_rtpmap(track, rtpmap);
                        }
                        track.attributes.push(line.to_string());
                    }
                }
                None if line.starts_with("a=control:") => {}
                None => session_lines.push(line.to_string()),
            }
        }

        if tracks.is_empty() {
            return Err(RtspError::InvalidSdp("no media sections".into()));
        }

        Ok(Self {
            session_lines,
            tracks,
        })
    }

    /// Render the description served to readers
    ///
    /// Tracks are renamed to `trackID=<index>` so SETUP requests can be
    /// matched without knowing the publisher's control URLs.
    pub fn to_sdp(&self) -> String {
        let mut sdp = String::new();

        if self.session_lines.iter().any(|l| l.starts_with("v=")) {
            for line in &self.session_lines {
                sdp.push_str(line);
                sdp.push_str("\r\n");
            }
        } else {
            sdp.push_str("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=Stream\r\nc=IN IP4 0.0.0.0\r\nt=0 0\r\n");
        }
        sdp.push_str("a=control:*\r\n");

        for (index, track) in self.tracks.iter().enumerate() {
            sdp.push_str(&track.media_line);
            sdp.push_str("\r\n");
            for line in &track.attributes {
                sdp.push_str(line);
                sdp.push_str("\r\n");
            }
            sdp.push_str(&format!("a=control:trackID={}\r\n", index));
        }

        sdp
    }

    /// Find the publisher track a SETUP URL refers to
    pub fn announced_track(&self, uri: &str) -> Option<usize> {
        self.tracks.iter().position(|track| {
            track
                .control
                .as_deref()
                .is_some_and(|control| control_matches(control, uri))
        })
    }

    /// Find the track a reader's SETUP URL refers to (`.../trackID=<n>`)
    pub fn described_track(&self, uri: &str) -> Option<usize> {
        let last = uri.trim_end_matches('/').rsplit('/').next()?;
        let index: usize = last.strip_prefix("trackID=")?.parse().ok()?;
        (index < self.tracks.len()).then_some(index)
    }

    /// Clock rate of the track used for segment timing
    pub fn timing_clock_rate(&self) -> u32 {
        self.tracks.first().map_or(90_000, |t| t.clock_rate)
    }

    /// Check if the stream has a video track
    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == MediaKind::Video)
    }

    /// Check if the stream has an audio track
    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == MediaKind::Audio)
    }

    /// Codec names of all tracks, in track order
    pub fn codecs(&self) -> Vec<&str> {
        self.tracks
            .iter()
            .filter_map(|t| t.codec.as_deref())
            .collect()
    }
}

fn parse_media_line(line: &str, media: &str) -> Result<Track, RtspError> {
    let mut fields = media.split_whitespace();
    let kind = fields
        .next()
        .map(MediaKind::parse)
        .ok_or_else(|| RtspError::InvalidSdp(format!("bad media line: {}", line)))?;
    // port, proto
    let payload_type = fields.nth(2).and_then(|pt| pt.parse::<u8>().ok());

    let clock_rate = payload_type
        .and_then(static_clock_rate)
        .unwrap_or(match kind {
            MediaKind::Audio => 8_000,
            _ => 90_000,
        });

    Ok(Track {
        kind,
        payload_type,
        codec: None,
        clock_rate,
        control: None,
        media_line: line.to_string(),
        attributes: Vec::new(),
    })
}

/// `a=rtpmap:<pt> <encoding>/<clock>[/<channels>]`
fn apply_rtpmap(track: &mut Track, rtpmap: &str) {
    let Some((pt, encoding)) = rtpmap.split_once(' ') else {
        return;
    };
    if pt.trim().parse::<u8>().ok() != track.payload_type {
        return;
    }

    let mut parts = encoding.trim().split('/');
    if let Some(codec) = parts.next() {
        track.codec = Some(codec.to_string());
    }
    if let Some(rate) = parts.next().and_then(|r| r.parse().ok()) {
        track.clock_rate = rate;
    }
}

/// Clock rates of the static payload types (RFC 3551)
fn static_clock_rate(payload_type: u8) -> Option<u32> {
    match payload_type {
        0 | 3 | 4 | 5 | 8 | 9 | 15 | 18 => Some(8_000),
        10 | 11 => Some(44_100),
        14 | 25 | 26 | 28 | 31 | 32 | 33 | 34 => Some(90_000),
        _ => None,
    }
}

fn control_matches(control: &str, uri: &str) -> bool {
    let uri = uri.trim_end_matches('/');
    if control.contains("://") {
        return uri == control.trim_end_matches('/');
    }
    let control = control.trim_matches('/');
    !control.is_empty() && uri.ends_with(&format!("/{}", control))
}
