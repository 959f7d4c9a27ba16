//! Per-connection RTSP session driver
//!
//! One task per TCP connection. The loop multiplexes four event sources:
//!
//! - server shutdown
//! - the idle timer (not armed while playing)
//! - frames from the peer (requests and interleaved packets)
//! - the next segment for a playing reader
//!
//! A publisher's packets are cut into segments and appended to its path's
//! playlist. A reader's pending `next_segment` is simply dropped when the
//! connection ends, which cancels the wait.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Instant;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, PlaylistError, Result};
use crate::media::sdp::StreamInfo;
use crate::media::segment::Segment;
use crate::media::segmenter::Segmenter;
use crate::path::{Path, PathError, PathManager};
use crate::protocol::codec::RtspCodec;
use crate::protocol::constants::{status, PUBLIC_METHODS, SDP_CONTENT_TYPE, SERVER_NAME, SESSION_TIMEOUT_SECS};
use crate::protocol::message::{parse_tcp_transport, Frame, Method, Request, Response};
use crate::server::config::RtspConfig;
use crate::session::{SessionMode, SessionState};

/// Per-connection handler
pub struct Connection {
    state: SessionState,
    framed: Framed<TcpStream, RtspCodec>,
    config: RtspConfig,
    manager: Arc<PathManager>,
    shutdown: CancellationToken,

    /// Announced (publish) or described (play) stream
    stream_info: Option<StreamInfo>,

    /// Path attached to by RECORD or PLAY
    path: Option<Weak<Path>>,

    /// Publisher only
    segmenter: Option<Segmenter>,

    /// Reader only: last segment sent, None to start at the live edge
    last_sent: Option<u64>,

    /// Registered with the manager as publisher or reader
    attached: bool,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: RtspConfig,
        manager: Arc<PathManager>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state: SessionState::new(session_id, peer_addr),
            framed: Framed::new(socket, RtspCodec::new()),
            config,
            manager,
            shutdown,
            stream_info: None,
            path: None,
            segmenter: None,
            last_sent: None,
            attached: false,
        }
    }

    /// Run the connection until the peer leaves, the session is torn down
    /// or the server shuts down
    pub async fn run(&mut self) -> Result<()> {
        let result = self.serve().await;
        self.teardown().await;
        result
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            let idle_timeout = self.config.idle_timeout;
            let idle_armed = !self.state.is_playing();
            let reader = next_for_reader(self.reader_path(), self.last_sent);

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::debug!(session_id = self.state.id, "Closing connection for shutdown");
                    return Ok(());
                }
                _ = tokio::time::sleep(idle_timeout), if idle_armed => {
                    tracing::debug!(session_id = self.state.id, "Idle timeout");
                    return Err(Error::Timeout);
                }
                frame = self.framed.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(Error::Rtsp(e))) => {
                            tracing::warn!(session_id = self.state.id, error = %e, "Malformed RTSP message");
                            let _ = self.framed.send(Frame::Response(
                                Response::new(status::BAD_REQUEST).header("Server", SERVER_NAME),
                            )).await;
                            return Err(e.into());
                        }
                        Some(Err(e)) => return Err(e),
                        None => return Ok(()),
                    };

                    if !self.handle_frame(frame).await? {
                        return Ok(());
                    }
                }
                segment = reader => {
                    match segment {
                        Ok(segment) => self.send_segment(segment).await?,
                        Err(e) => {
                            tracing::debug!(session_id = self.state.id, error = %e, "Reader detached from path");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Path to read from while playing
    fn reader_path(&self) -> Option<Weak<Path>> {
        if self.state.is_playing() {
            self.path.clone()
        } else {
            None
        }
    }

    /// Returns false when the connection should close
    async fn handle_frame(&mut self, frame: Frame) -> Result<bool> {
        match frame {
            Frame::Interleaved { channel, payload } => self.on_interleaved(channel, payload).await,
            Frame::Response(response) => {
                tracing::trace!(session_id = self.state.id, status = response.status, "Ignoring response from peer");
                Ok(true)
            }
            Frame::Request(request) => self.handle_request(request).await,
        }
    }

    async fn handle_request(&mut self, request: Request) -> Result<bool> {
        tracing::debug!(
            session_id = self.state.id,
            method = %request.method,
            uri = %request.uri,
            "RTSP request"
        );

        let Some(cseq) = request.cseq().map(str::to_string) else {
            tracing::warn!(session_id = self.state.id, method = %request.method, "Request without CSeq");
            self.framed
                .send(Frame::Response(Response::new(status::BAD_REQUEST).header("Server", SERVER_NAME)))
                .await?;
            return Ok(false);
        };

        let response = self.dispatch(&request).await;
        let close = request.method == Method::Teardown && response.is_success();

        self.send_response(response, &cseq).await?;
        Ok(!close)
    }

    async fn dispatch(&mut self, request: &Request) -> Response {
        if let Method::Other(method) = &request.method {
            return self.reject(status::NOT_IMPLEMENTED, format!("unsupported method {}", method));
        }

        if let Some(token) = self.state.issued_token() {
            let matches = request.session() == Some(token);
            let exempt = request.method == Method::Options && request.session().is_none();
            if !matches && !exempt {
                return self.reject(status::SESSION_NOT_FOUND, "missing or unknown Session");
            }
        }

        let next = match self.state.next_phase(&request.method) {
            Ok(next) => next,
            Err(e) => return self.reject(status::METHOD_NOT_VALID_IN_THIS_STATE, e.to_string()),
        };

        let response = match request.method {
            Method::Options => Response::new(status::OK).header("Public", PUBLIC_METHODS),
            Method::Announce => self.on_announce(request).await,
            Method::Describe => self.on_describe(request).await,
            Method::Setup => self.on_setup(request),
            Method::Record => self.on_record().await,
            Method::Play => self.on_play().await,
            Method::Pause | Method::Teardown | Method::GetParameter | Method::SetParameter => {
                Response::new(status::OK)
            }
            Method::Other(_) => Response::new(status::NOT_IMPLEMENTED),
        };

        if response.is_success() {
            self.state.commit(&request.method, next);
        }
        response
    }

    async fn on_announce(&mut self, request: &Request) -> Response {
        if request.content_type() != Some(SDP_CONTENT_TYPE) {
            return self.reject(status::UNSUPPORTED_MEDIA_TYPE, "ANNOUNCE body must be application/sdp");
        }

        let Some(name) = request.path_name().map(str::to_string) else {
            return self.reject(status::BAD_REQUEST, "missing path in URL");
        };

        let info = match std::str::from_utf8(&request.body)
            .map_err(|_| "SDP is not UTF-8".to_string())
            .and_then(|sdp| StreamInfo::from_sdp(sdp).map_err(|e| e.to_string()))
        {
            Ok(info) => info,
            Err(e) => return self.reject(status::BAD_REQUEST, e),
        };

        if let Err(e) = self.manager.check_publish(&name).await {
            return self.reject_path(e);
        }

        tracing::info!(
            session_id = self.state.id,
            path = %name,
            tracks = info.tracks.len(),
            codecs = ?info.codecs(),
            "Stream announced"
        );

        self.state.path_name = Some(name);
        self.stream_info = Some(info);
        Response::new(status::OK)
    }

    async fn on_describe(&mut self, request: &Request) -> Response {
        let Some(name) = request.path_name().map(str::to_string) else {
            return self.reject(status::BAD_REQUEST, "missing path in URL");
        };

        let Some(path) = self.manager.get_path(&name).await else {
            return self.reject_path(PathError::NotFound(name));
        };
        let info = match path.playlist().stream_info() {
            Ok(info) => info,
            Err(e) => return self.reject(status::NOT_FOUND, format!("{}: {}", name, e)),
        };

        let sdp = info.to_sdp();
        self.state.path_name = Some(name);
        self.stream_info = Some(info);

        Response::new(status::OK)
            .header("Content-Base", format!("{}/", request.uri.trim_end_matches('/')))
            .body(SDP_CONTENT_TYPE, sdp)
    }

    fn on_setup(&mut self, request: &Request) -> Response {
        let Some(transport) = request.headers.get("Transport").and_then(parse_tcp_transport) else {
            return self.reject(status::UNSUPPORTED_TRANSPORT, "only RTP/AVP/TCP interleaved is supported");
        };

        if request.path_name() != self.state.path_name.as_deref() {
            return self.reject(status::BAD_REQUEST, "SETUP for a different path");
        }

        let Some(info) = &self.stream_info else {
            return self.reject(status::METHOD_NOT_VALID_IN_THIS_STATE, "no stream description");
        };

        let track = match self.state.mode {
            Some(SessionMode::Publish) => info
                .announced_track(&request.uri)
                .or_else(|| info.described_track(&request.uri))
                .or_else(|| {
                    // Controls we couldn't match are set up in announce order
                    let next = self.state.tracks().len();
                    (next < info.tracks.len()).then_some(next)
                }),
            Some(SessionMode::Play) => info
                .described_track(&request.uri)
                .or_else(|| (info.tracks.len() == 1).then_some(0)),
            None => None,
        };
        let Some(track) = track else {
            return self.reject(status::NOT_FOUND, format!("unknown track {}", request.uri));
        };

        let transport_header = match self.state.add_track(track, transport.interleaved) {
            Ok(setup) => setup.transport_header(),
            Err(e) => return self.reject(status::BAD_REQUEST, e.to_string()),
        };
        self.state.session_token();

        tracing::debug!(session_id = self.state.id, track = track, transport = %transport_header, "Track set up");
        Response::new(status::OK).header("Transport", transport_header)
    }

    async fn on_record(&mut self) -> Response {
        let (Some(name), Some(info)) = (self.state.path_name.clone(), self.stream_info.clone()) else {
            return self.reject(status::METHOD_NOT_VALID_IN_THIS_STATE, "no announced stream");
        };

        let path = match self.manager.register_publisher(&name, self.state.id).await {
            Ok(path) => path,
            Err(e) => return self.reject_path(e),
        };

        path.playlist().set_stream_info(info.clone());
        self.segmenter = Some(Segmenter::new(
            path.playlist().next_id(),
            path.conf(),
            info.timing_clock_rate(),
            self.config.read_buffer_count,
        ));
        self.path = Some(Arc::downgrade(&path));
        self.attached = true;

        Response::new(status::OK)
    }

    async fn on_play(&mut self) -> Response {
        let Some(name) = self.state.path_name.clone() else {
            return self.reject(status::METHOD_NOT_VALID_IN_THIS_STATE, "no described stream");
        };

        if !self.attached {
            let path = match self.manager.register_reader(&name, self.state.id).await {
                Ok(path) => path,
                Err(e) => return self.reject_path(e),
            };
            self.path = Some(Arc::downgrade(&path));
            self.attached = true;
        }
        self.last_sent = None;

        Response::new(status::OK).header("Range", "npt=0.000-")
    }

    /// Returns false when the connection should close
    async fn on_interleaved(&mut self, channel: u8, payload: Bytes) -> Result<bool> {
        self.state.packets_received += 1;

        if !self.state.is_recording() {
            // Receiver reports from readers
            tracing::trace!(session_id = self.state.id, channel = channel, "Ignoring interleaved data");
            return Ok(true);
        }

        let Some(track) = self.state.track_for_rtp_channel(channel) else {
            // RTCP from the publisher
            return Ok(true);
        };
        let Some(segment) = self
            .segmenter
            .as_mut()
            .and_then(|segmenter| segmenter.push(track, &payload, Instant::now()))
        else {
            return Ok(true);
        };

        let Some(path) = self.path.as_ref().and_then(Weak::upgrade) else {
            tracing::debug!(session_id = self.state.id, "Path removed while publishing");
            return Ok(false);
        };

        let segment_id = segment.id;
        match path.playlist().append(segment) {
            Ok(()) => {
                tracing::trace!(path = %path.name(), segment_id = segment_id, "Segment appended");
                Ok(true)
            }
            Err(PlaylistError::Closed) => {
                tracing::debug!(session_id = self.state.id, path = %path.name(), "Path closed while publishing");
                Ok(false)
            }
            Err(e) => {
                self.manager.abort_path(path.name(), &e.to_string()).await;
                Err(e.into())
            }
        }
    }

    async fn send_segment(&mut self, segment: Segment) -> Result<()> {
        for packet in segment.packets() {
            let Some(channel) = self.state.rtp_channel_for_track(packet.track) else {
                continue;
            };
            self.framed
                .feed(Frame::Interleaved {
                    channel,
                    payload: packet.payload,
                })
                .await?;
            self.state.packets_sent += 1;
        }
        self.framed.flush().await?;

        tracing::trace!(session_id = self.state.id, segment_id = segment.id, "Segment sent");
        self.last_sent = Some(segment.id);
        Ok(())
    }

    async fn send_response(&mut self, response: Response, cseq: &str) -> Result<()> {
        let mut response = response.header("CSeq", cseq).header("Server", SERVER_NAME);
        if let Some(token) = self.state.issued_token() {
            response = response.header("Session", format!("{};timeout={}", token, SESSION_TIMEOUT_SECS));
        }

        self.framed.send(Frame::Response(response)).await
    }

    fn reject(&self, code: u16, reason: impl Into<String>) -> Response {
        let reason = reason.into();
        tracing::warn!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            status = code,
            reason = %reason,
            "Request rejected"
        );
        Response::new(code)
    }

    fn reject_path(&self, err: PathError) -> Response {
        let code = match err {
            PathError::NotFound(_) => status::NOT_FOUND,
            PathError::AlreadyExists(_) | PathError::AlreadyPublishing(_) | PathError::InvalidName(_) => {
                status::BAD_REQUEST
            }
            PathError::ShuttingDown => status::SERVICE_UNAVAILABLE,
        };
        self.reject(code, err.to_string())
    }

    async fn teardown(&mut self) {
        let mode = self.state.mode;
        self.state.on_disconnect();

        if !self.attached {
            return;
        }
        self.attached = false;
        let Some(name) = self.state.path_name.clone() else {
            return;
        };

        match mode {
            Some(SessionMode::Publish) => {
                if let Some(segmenter) = self.segmenter.as_mut() {
                    if segmenter.pending_packets() > 0 {
                        tracing::debug!(
                            path = %name,
                            packets = segmenter.pending_packets(),
                            "Discarding partial segment"
                        );
                    }
                    segmenter.reset();
                }
                self.manager.unregister_publisher(&name, self.state.id).await;
            }
            Some(SessionMode::Play) => {
                self.manager.unregister_reader(&name, self.state.id).await;
            }
            None => {}
        }

        tracing::debug!(
            session_id = self.state.id,
            path = %name,
            duration_secs = self.state.duration().as_secs(),
            packets_received = self.state.packets_received,
            packets_sent = self.state.packets_sent,
            "Session torn down"
        );
    }
}

/// Next segment for a playing reader; pends forever for other sessions
async fn next_for_reader(
    path: Option<Weak<Path>>,
    last_sent: Option<u64>,
) -> std::result::Result<Segment, PlaylistError> {
    let Some(path) = path else {
        return std::future::pending().await;
    };
    let path = path.upgrade().ok_or(PlaylistError::Closed)?;

    match last_sent {
        None => path.playlist().live_segment().await,
        Some(id) => path.playlist().next_segment(id).await,
    }
}
