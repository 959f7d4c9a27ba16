//! RTSP connection codec
//!
//! Splits the TCP byte stream into [`Frame`]s:
//!
//! ```text
//! '$' | channel (u8) | length (u16 BE) | payload          interleaved
//! <start line>\r\n<headers>\r\n\r\n<Content-Length body>  message
//! ```
//!
//! Used by the server for both publishers and readers, and by tests as a
//! client.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, RtspError};

use super::constants::{INTERLEAVED_HEADER_LEN, INTERLEAVED_MAGIC, MAX_BODY_SIZE, MAX_HEADER_SIZE};
use super::message::{Frame, Headers, Method, Request, Response};

/// Codec for RTSP over TCP with interleaved binary data
#[derive(Debug, Clone)]
pub struct RtspCodec {
    max_header_size: usize,
    max_body_size: usize,
}

impl Default for RtspCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RtspCodec {
    pub fn new() -> Self {
        Self {
            max_header_size: MAX_HEADER_SIZE,
            max_body_size: MAX_BODY_SIZE,
        }
    }

    /// Override the header and body size limits
    pub fn with_limits(max_header_size: usize, max_body_size: usize) -> Self {
        Self {
            max_header_size,
            max_body_size,
        }
    }

    fn decode_interleaved(&self, src: &mut BytesMut) -> Option<Frame> {
        if src.len() < INTERLEAVED_HEADER_LEN {
            return None;
        }

        let channel = src[1];
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if src.len() < INTERLEAVED_HEADER_LEN + length {
            src.reserve(INTERLEAVED_HEADER_LEN + length - src.len());
            return None;
        }

        src.advance(INTERLEAVED_HEADER_LEN);
        let payload = src.split_to(length).freeze();
        Some(Frame::Interleaved { channel, payload })
    }

    fn decode_message(&self, src: &mut BytesMut) -> Result<Option<Frame>, RtspError> {
        let Some(header_end) = find_header_end(src) else {
            if src.len() > self.max_header_size {
                return Err(RtspError::HeaderTooLarge);
            }
            return Ok(None);
        };
        if header_end > self.max_header_size {
            return Err(RtspError::HeaderTooLarge);
        }

        let head = std::str::from_utf8(&src[..header_end])
            .map_err(|_| RtspError::Malformed("header is not UTF-8".into()))?;
        let mut lines = head.split("\r\n");
        let start_line = lines.next().unwrap_or_default();

        let mut headers = Headers::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| RtspError::Malformed(format!("bad header line: {}", line)))?;
            headers.append(name.trim(), value.trim());
        }

        let body_len = match headers.content_length() {
            Some(Ok(len)) => len,
            Some(Err(_)) => return Err(RtspError::Malformed("bad Content-Length".into())),
            None => 0,
        };
        if body_len > self.max_body_size {
            return Err(RtspError::BodyTooLarge(body_len));
        }

        let total = header_end + 4 + body_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = parse_start_line(start_line, headers)?;

        src.advance(header_end + 4);
        let body = src.split_to(body_len).freeze();

        Ok(Some(match frame {
            Frame::Request(mut request) => {
                request.body = body;
                Frame::Request(request)
            }
            Frame::Response(mut response) => {
                response.body = body;
                Frame::Response(response)
            }
            interleaved => interleaved,
        }))
    }
}

impl Decoder for RtspCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Error> {
        // Some clients send stray line breaks between messages
        while src.first().is_some_and(|b| *b == b'\r' || *b == b'\n') {
            src.advance(1);
        }

        match src.first() {
            None => Ok(None),
            Some(&INTERLEAVED_MAGIC) => Ok(self.decode_interleaved(src)),
            Some(_) => Ok(self.decode_message(src)?),
        }
    }
}

impl Encoder<Frame> for RtspCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Error> {
        match frame {
            Frame::Interleaved { channel, payload } => {
                let length = u16::try_from(payload.len()).map_err(|_| {
                    RtspError::Malformed(format!("interleaved payload too large: {}", payload.len()))
                })?;
                dst.reserve(INTERLEAVED_HEADER_LEN + payload.len());
                dst.put_u8(INTERLEAVED_MAGIC);
                dst.put_u8(channel);
                dst.put_u16(length);
                dst.put_slice(&payload);
            }
            Frame::Request(request) => {
                let start = format!("{} {} {}", request.method, request.uri, request.version);
                write_message(&start, &request.headers, &request.body, dst);
            }
            Frame::Response(response) => {
                let start = format!("{} {} {}", response.version, response.status, response.reason);
                write_message(&start, &response.headers, &response.body, dst);
            }
        }
        Ok(())
    }
}

fn find_header_end(src: &[u8]) -> Option<usize> {
    src.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_start_line(line: &str, headers: Headers) -> Result<Frame, RtspError> {
    let mut parts = line.splitn(3, ' ');
    let (Some(first), Some(second), Some(third)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(RtspError::Malformed(format!("bad start line: {}", line)));
    };

    if first.starts_with("RTSP/") {
        let status = second
            .parse()
            .map_err(|_| RtspError::Malformed(format!("bad status code: {}", second)))?;
        return Ok(Frame::Response(Response {
            version: first.to_string(),
            status,
            reason: third.to_string(),
            headers,
            body: Default::default(),
        }));
    }

    if !third.starts_with("RTSP/1.") {
        return Err(RtspError::UnsupportedVersion(third.to_string()));
    }
    if first.is_empty() || second.is_empty() {
        return Err(RtspError::Malformed(format!("bad request line: {}", line)));
    }

    Ok(Frame::Request(Request {
        method: Method::parse(first),
        uri: second.to_string(),
        version: third.to_string(),
        headers,
        body: Default::default(),
    }))
}

fn write_message(start: &str, headers: &Headers, body: &[u8], dst: &mut BytesMut) {
    dst.put_slice(start.as_bytes());
    dst.put_slice(b"\r\n");
    for (name, value) in headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("Content-Length"))
    {
        dst.put_slice(name.as_bytes());
        dst.put_slice(b": ");
        dst.put_slice(value.as_bytes());
        dst.put_slice(b"\r\n");
    }
    if !body.is_empty() {
        dst.put_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    dst.put_slice(b"\r\n");
    dst.put_slice(body);
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Frame> {
        let mut codec = RtspCodec::new();
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        assert!(buf.is_empty(), "leftover bytes: {:?}", buf);
        frames
    }

    #[test]
    fn test_decode_request_with_body() {
        let sdp = "v=0\r\nm=video 0 RTP/AVP 96\r\n";
        let raw = format!(
            "ANNOUNCE rtsp://127.0.0.1/cam1 RTSP/1.0\r\nCSeq: 2\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\n\r\n{}",
            sdp.len(),
            sdp
        );

        let frames = decode_all(raw.as_bytes());
        let Frame::Request(request) = &frames[0] else {
            panic!("expected request, got {:?}", frames[0]);
        };
        assert_eq!(request.method, Method::Announce);
        assert_eq!(request.cseq(), Some("2"));
        assert_eq!(request.content_type(), Some("application/sdp"));
        assert_eq!(request.body, Bytes::from(sdp));
    }

    #[test]
    fn test_decode_waits_for_complete_message() {
        let mut codec = RtspCodec::new();
        let mut buf = BytesMut::from(&b"OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\r\n$\x01\x00\x04ab");
        assert!(matches!(codec.decode(&mut buf).unwrap(), Some(Frame::Request(_))));
        // Interleaved frame still incomplete
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"cd");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Interleaved {
                channel: 1,
                payload: Bytes::from_static(b"abcd")
            })
        );
    }

    #[test]
    fn test_decode_mixed_stream() {
        let raw = b"$\x00\x00\x02hi\r\nRTSP/1.0 200 OK\r\nCSeq: 3\r\nSession: 42;timeout=60\r\n\r\n";
        let frames = decode_all(raw);

        assert_eq!(frames.len(), 2);
        let Frame::Response(response) = &frames[1] else {
            panic!("expected response");
        };
        assert_eq!(response.status, 200);
        assert_eq!(response.session(), Some("42"));
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let mut codec = RtspCodec::new();

        let mut buf = BytesMut::from(&b"PLAY rtsp://h/cam1 HTTP/1.1\r\n\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Rtsp(RtspError::UnsupportedVersion(_)))
        ));

        let mut buf = BytesMut::from(&b"PLAY rtsp://h/cam1 RTSP/1.0\r\nno colon\r\n\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Rtsp(RtspError::Malformed(_)))
        ));

        let mut small = RtspCodec::with_limits(16, 4);
        let mut buf = BytesMut::from(&b"OPTIONS rtsp://a-very-long-host/ RTSP/1.0\r\n"[..]);
        assert!(matches!(
            small.decode(&mut buf),
            Err(Error::Rtsp(RtspError::HeaderTooLarge))
        ));
    }

    #[test]
    fn test_encode_response() {
        let mut codec = RtspCodec::new();
        let mut dst = BytesMut::new();
        let response = Response::new(200)
            .header("CSeq", "5")
            .body("application/sdp", "v=0\r\n");

        codec.encode(Frame::Response(response), &mut dst).unwrap();

        assert_eq!(
            &dst[..],
            b"RTSP/1.0 200 OK\r\nCSeq: 5\r\nContent-Type: application/sdp\r\nContent-Length: 5\r\n\r\nv=0\r\n"
        );
    }

    #[test]
    fn test_encode_decode_request() {
        let mut codec = RtspCodec::new();
        let mut buf = BytesMut::new();
        let request = Request::new(Method::Setup, "rtsp://h/cam1/trackID=0")
            .header("CSeq", "4")
            .header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1");

        codec.encode(Frame::Request(request.clone()), &mut buf).unwrap();
        codec
            .encode(
                Frame::Interleaved {
                    channel: 0,
                    payload: Bytes::from_static(b"rtp"),
                },
                &mut buf,
            )
            .unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Request(request)));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Interleaved { channel: 0, .. })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_interleaved() {
        let mut codec = RtspCodec::new();
        let frame = Frame::Interleaved {
            channel: 0,
            payload: Bytes::from(vec![0u8; 70_000]),
        };
        assert!(codec.encode(frame, &mut BytesMut::new()).is_err());
    }
}
