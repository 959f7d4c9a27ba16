//! RTSP message types
//!
//! Requests and responses share the HTTP/1.x shape: a start line, a header
//! block and an optional body sized by `Content-Length`. Interleaved RTP and
//! RTCP packets travel on the same TCP connection as `$`-prefixed frames.

use std::fmt;

use bytes::Bytes;

use super::constants::{reason_phrase, RTSP_VERSION};

/// RTSP request method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Describe,
    Announce,
    Setup,
    Play,
    Pause,
    Record,
    Teardown,
    GetParameter,
    SetParameter,
    Other(String),
}

impl Method {
    pub fn parse(s: &str) -> Self {
        match s {
            "OPTIONS" => Method::Options,
            "DESCRIBE" => Method::Describe,
            "ANNOUNCE" => Method::Announce,
            "SETUP" => Method::Setup,
            "PLAY" => Method::Play,
            "PAUSE" => Method::Pause,
            "RECORD" => Method::Record,
            "TEARDOWN" => Method::Teardown,
            "GET_PARAMETER" => Method::GetParameter,
            "SET_PARAMETER" => Method::SetParameter,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Announce => "ANNOUNCE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Record => "RECORD",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
            Method::SetParameter => "SET_PARAMETER",
            Method::Other(other) => other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header list with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set a header, replacing any previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.0.retain(|(key, _)| !key.eq_ignore_ascii_case(&name));
        self.0.push((name, value.into()));
    }

    /// Add a header without replacing existing ones
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parsed `Content-Length`, None when absent
    pub fn content_length(&self) -> Option<Result<usize, std::num::ParseIntError>> {
        self.get("Content-Length").map(|v| v.trim().parse())
    }
}

/// RTSP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub version: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    /// Create a request with the given method and URI
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            version: RTSP_VERSION.to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body
    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.headers.insert("Content-Type", content_type);
        self.body = body.into();
        self
    }

    /// Sequence number to echo in the response
    pub fn cseq(&self) -> Option<&str> {
        self.headers.get("CSeq").map(str::trim)
    }

    /// Session ID without the `;timeout=` suffix
    pub fn session(&self) -> Option<&str> {
        self.headers
            .get("Session")
            .and_then(|v| v.split(';').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get("Content-Type")
            .and_then(|v| v.split(';').next())
            .map(str::trim)
    }

    /// Name of the path the request URI points at
    pub fn path_name(&self) -> Option<&str> {
        path_name(&self.uri)
    }
}

/// RTSP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    /// Create a response with the standard reason phrase
    pub fn new(status: u16) -> Self {
        Self {
            version: RTSP_VERSION.to_string(),
            status,
            reason: reason_phrase(status).to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body
    pub fn body(mut self, content_type: &str, body: impl Into<Bytes>) -> Self {
        self.headers.insert("Content-Type", content_type);
        self.body = body.into();
        self
    }

    pub fn cseq(&self) -> Option<&str> {
        self.headers.get("CSeq").map(str::trim)
    }

    pub fn session(&self) -> Option<&str> {
        self.headers
            .get("Session")
            .and_then(|v| v.split(';').next())
            .map(str::trim)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Unit of the RTSP connection codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request(Request),
    Response(Response),
    /// `$`-prefixed binary packet
    Interleaved { channel: u8, payload: Bytes },
}

/// Path component of an RTSP URL (scheme, authority and query removed)
pub fn uri_path(uri: &str) -> &str {
    let rest = match uri.find("://") {
        Some(index) => {
            let after = &uri[index + 3..];
            after.find('/').map_or("", |slash| &after[slash..])
        }
        None => uri,
    };
    let rest = rest.split(['?', '#']).next().unwrap_or("");
    rest.trim_matches('/')
}

/// First path segment of an RTSP URL, which names the stream
pub fn path_name(uri: &str) -> Option<&str> {
    uri_path(uri).split('/').next().filter(|name| !name.is_empty())
}

/// TCP interleaved transport requested in SETUP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpTransport {
    /// RTP and RTCP channels, None if the client left the choice to us
    pub interleaved: Option<(u8, u8)>,
}

/// Pick the first `RTP/AVP/TCP` alternative of a `Transport` header
///
/// Returns None if the client offers no TCP transport.
pub fn parse_tcp_transport(header: &str) -> Option<TcpTransport> {
    header.split(',').find_map(|transport| {
        let mut params = transport.split(';').map(str::trim);
        let profile = params.next()?;
        if !profile.eq_ignore_ascii_case("RTP/AVP/TCP") {
            return None;
        }

        let interleaved = params
            .filter_map(|param| param.strip_prefix("interleaved="))
            .find_map(parse_channels);

        Some(TcpTransport { interleaved })
    })
}

fn parse_channels(value: &str) -> Option<(u8, u8)> {
    match value.split_once('-') {
        Some((rtp, rtcp)) => Some((rtp.trim().parse().ok()?, rtcp.trim().parse().ok()?)),
        None => {
            let rtp: u8 = value.trim().parse().ok()?;
            Some((rtp, rtp.checked_add(1)?))
        }
    }
}
