//! RTSP publish to RTSP/HLS read over loopback sockets

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use nvr_video::protocol::{Frame, Method, Request, Response, RtspCodec};
use nvr_video::{Error, PathConf, PathStats, PlaylistError, RtspConfig, Segment, Server, ServerConfig};

const SDP: &str = "v=0\r\n\
    o=- 0 0 IN IP4 127.0.0.1\r\n\
    s=Camera\r\n\
    t=0 0\r\n\
    m=video 0 RTP/AVP 96\r\n\
    a=rtpmap:96 H264/90000\r\n\
    a=control:streamid=0\r\n";

const WAIT: Duration = Duration::from_secs(5);

type Client = Framed<TcpStream, RtspCodec>;

struct Harness {
    server: Server,
    shutdown: CancellationToken,
}

impl Harness {
    async fn start() -> Self {
        Self::with_rtsp(RtspConfig::default()).await
    }

    async fn with_rtsp(rtsp: RtspConfig) -> Self {
        let shutdown = CancellationToken::new();
        let config = ServerConfig::local(0, 0);
        let rtsp = rtsp.bind(config.rtsp.bind_addr);
        let server = Server::new(config.rtsp(rtsp), shutdown.clone());
        server.start().await.unwrap();
        Self { server, shutdown }
    }

    async fn connect(&self) -> Client {
        let socket = TcpStream::connect(self.server.rtsp_addr()).await.unwrap();
        Framed::new(socket, RtspCodec::new())
    }

    fn url(&self, path: &str) -> String {
        format!("rtsp://{}/{}", self.server.rtsp_addr(), path)
    }

    async fn stop(self) {
        self.shutdown.cancel();
        timeout(WAIT, self.server.wait()).await.unwrap();
    }
}

/// Send a request and wait for its response, skipping interleaved data
async fn request(client: &mut Client, request: Request) -> Response {
    client.send(Frame::Request(request)).await.unwrap();
    loop {
        match timeout(WAIT, client.next()).await.unwrap() {
            Some(Ok(Frame::Response(response))) => return response,
            Some(Ok(_)) => continue,
            other => panic!("connection ended: {:?}", other),
        }
    }
}

fn rtp_packet(seq: u16, timestamp: u32) -> Bytes {
    let mut packet = BytesMut::new();
    packet.put_u8(0x80);
    packet.put_u8(96);
    packet.put_u16(seq);
    packet.put_u32(timestamp);
    packet.put_u32(0x1234_5678);
    packet.put_slice(b"nal-unit");
    packet.freeze()
}

/// Publish `SDP` to `path` and start recording
async fn publish(harness: &Harness, path: &str) -> (Client, String) {
    let mut client = harness.connect().await;
    let url = harness.url(path);

    let response = request(&mut client, Request::new(Method::Options, &url).header("CSeq", "1")).await;
    assert_eq!(response.status, 200);
    assert!(response.headers.get("Public").unwrap().contains("ANNOUNCE"));

    let response = request(
        &mut client,
        Request::new(Method::Announce, &url)
            .header("CSeq", "2")
            .body("application/sdp", SDP),
    )
    .await;
    assert_eq!(response.status, 200);

    let response = request(
        &mut client,
        Request::new(Method::Setup, format!("{}/streamid=0", url))
            .header("CSeq", "3")
            .header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1;mode=record"),
    )
    .await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.headers.get("Transport"),
        Some("RTP/AVP/TCP;unicast;interleaved=0-1")
    );
    let session = response.session().unwrap().to_string();

    let response = request(
        &mut client,
        Request::new(Method::Record, &url)
            .header("CSeq", "4")
            .header("Session", session.as_str()),
    )
    .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.cseq(), Some("4"));

    (client, session)
}

/// Send `count` packets 50ms of media apart
async fn send_packets(client: &mut Client, first: u16, count: u16) {
    for seq in first..first + count {
        let packet = rtp_packet(seq, seq as u32 * 4500);
        client
            .feed(Frame::Interleaved {
                channel: 0,
                payload: packet,
            })
            .await
            .unwrap();
        // RTCP from the publisher is ignored
        client
            .feed(Frame::Interleaved {
                channel: 1,
                payload: Bytes::from_static(b"\x80\xc8\x00\x06"),
            })
            .await
            .unwrap();
    }
    client.flush().await.unwrap();
}

/// DESCRIBE, SETUP and PLAY `path`; media arrives on channel 0
async fn play(harness: &Harness, path: &str) -> (Client, String) {
    let mut client = harness.connect().await;
    let url = harness.url(path);

    let response = request(&mut client, Request::new(Method::Describe, &url).header("CSeq", "1")).await;
    assert_eq!(response.status, 200);

    let response = request(
        &mut client,
        Request::new(Method::Setup, format!("{}/trackID=0", url))
            .header("CSeq", "2")
            .header("Transport", "RTP/AVP/TCP;unicast;interleaved=0-1"),
    )
    .await;
    assert_eq!(response.status, 200);
    let session = response.session().unwrap().to_string();

    let response = request(
        &mut client,
        Request::new(Method::Play, &url)
            .header("CSeq", "3")
            .header("Session", session.as_str()),
    )
    .await;
    assert_eq!(response.status, 200);

    (client, session)
}

/// Poll the stats of `path` until `done` holds
async fn wait_for_stats(harness: &Harness, path: &str, done: impl Fn(&PathStats) -> bool) -> PathStats {
    timeout(WAIT, async {
        loop {
            if let Some(stats) = harness.server.manager().path_stats(path).await {
                if done(&stats) {
                    return stats;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

async fn http_get(harness: &Harness, uri: &str) -> String {
    let mut socket = TcpStream::connect(harness.server.hls_addr()).await.unwrap();
    let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", uri);
    socket.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    timeout(WAIT, socket.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_publish_then_read_over_hls_and_rtsp() {
    let harness = Harness::start().await;
    let conf = PathConf::default().segment_duration(Duration::from_millis(100));
    let (path, canceller) = harness.server.new_path("cam1", conf).await.unwrap();
    assert!(path.rtsp_address.ends_with("/cam1"));
    assert!(path.hls_address.ends_with("/hls/cam1/index.m3u8"));
    assert_eq!(path.rtsp_protocol, "tcp");

    let (mut publisher, _) = publish(&harness, "cam1").await;
    send_packets(&mut publisher, 0, 10).await;

    timeout(WAIT, path.muxer.wait_for_segment_finalized())
        .await
        .unwrap()
        .unwrap();
    let info = path.muxer.stream_info().unwrap();
    assert_eq!(info.codecs(), vec!["H264"]);

    let first = path.muxer.next_segment(u64::MAX).await.unwrap();
    assert_eq!(first.id, 0);
    assert_eq!(first.packets().count(), 2);
    assert_eq!(first.duration, Duration::from_millis(100));

    // HLS
    let manifest = http_get(&harness, "/hls/cam1/index.m3u8").await;
    assert!(manifest.starts_with("HTTP/1.1 200"), "{}", manifest);
    assert!(manifest.contains("#EXT-X-MEDIA-SEQUENCE:0"));
    assert!(manifest.contains("\n0.ts\n"));

    let segment = http_get(&harness, "/hls/cam1/0.ts").await;
    assert!(segment.starts_with("HTTP/1.1 200"), "{}", segment);
    assert!(segment.contains("application/octet-stream"));

    // RTSP reader
    let mut reader = harness.connect().await;
    let url = harness.url("cam1");

    let response = request(&mut reader, Request::new(Method::Describe, &url).header("CSeq", "1")).await;
    assert_eq!(response.status, 200);
    let sdp = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(sdp.contains("a=control:trackID=0"));

    let response = request(
        &mut reader,
        Request::new(Method::Setup, format!("{}/trackID=0", url))
            .header("CSeq", "2")
            .header("Transport", "RTP/AVP/TCP;unicast;interleaved=4-5"),
    )
    .await;
    assert_eq!(response.status, 200);
    let session = response.session().unwrap().to_string();

    // Session is mandatory after SETUP
    let response = request(&mut reader, Request::new(Method::Play, &url).header("CSeq", "3")).await;
    assert_eq!(response.status, 454);

    let response = request(
        &mut reader,
        Request::new(Method::Play, &url)
            .header("CSeq", "4")
            .header("Session", session.as_str()),
    )
    .await;
    assert_eq!(response.status, 200);

    let frame = timeout(WAIT, reader.next()).await.unwrap().unwrap().unwrap();
    let Frame::Interleaved { channel, payload } = frame else {
        panic!("expected media, got {:?}", frame);
    };
    assert_eq!(channel, 4);
    assert_eq!(payload[0] >> 6, 2);
    assert!(payload.ends_with(b"nal-unit"));

    // Live packets keep flowing to the reader
    send_packets(&mut publisher, 10, 10).await;
    let frame = timeout(WAIT, reader.next()).await.unwrap().unwrap().unwrap();
    assert!(matches!(frame, Frame::Interleaved { channel: 4, .. }));

    // Second publisher is refused
    let mut intruder = harness.connect().await;
    let response = request(
        &mut intruder,
        Request::new(Method::Announce, &url)
            .header("CSeq", "1")
            .body("application/sdp", SDP),
    )
    .await;
    assert_eq!(response.status, 400);

    // Publisher leaves; the registered path keeps its segments
    drop(publisher);
    let stats = wait_for_stats(&harness, "cam1", |stats| stats.publisher_id.is_none()).await;
    assert!(stats.segment_count > 0);

    // Removing the path fails blocked consumers
    let latest = stats.latest_segment_id.unwrap();
    let blocked = {
        let muxer = path.muxer.clone();
        tokio::spawn(async move { muxer.next_segment(latest).await })
    };
    tokio::task::yield_now().await;
    canceller.cancel().await;

    assert!(!harness.server.path_exist("cam1").await);
    assert_eq!(timeout(WAIT, blocked).await.unwrap().unwrap(), Err(PlaylistError::Closed));

    harness.stop().await;
}

#[tokio::test]
async fn test_protocol_violations() {
    let harness = Harness::start().await;
    harness.server.new_path("cam1", PathConf::default()).await.unwrap();
    let url = harness.url("cam1");

    // Unknown path
    let mut client = harness.connect().await;
    let response = request(
        &mut client,
        Request::new(Method::Announce, harness.url("nope"))
            .header("CSeq", "1")
            .body("application/sdp", SDP),
    )
    .await;
    assert_eq!(response.status, 404);

    // Wrong content type
    let response = request(
        &mut client,
        Request::new(Method::Announce, &url)
            .header("CSeq", "2")
            .body("text/plain", SDP),
    )
    .await;
    assert_eq!(response.status, 415);

    // Method not valid before ANNOUNCE
    let response = request(&mut client, Request::new(Method::Record, &url).header("CSeq", "3")).await;
    assert_eq!(response.status, 455);

    // UDP transport
    let response = request(
        &mut client,
        Request::new(Method::Announce, &url)
            .header("CSeq", "4")
            .body("application/sdp", SDP),
    )
    .await;
    assert_eq!(response.status, 200);
    let response = request(
        &mut client,
        Request::new(Method::Setup, format!("{}/streamid=0", url))
            .header("CSeq", "5")
            .header("Transport", "RTP/AVP;unicast;client_port=5000-5001"),
    )
    .await;
    assert_eq!(response.status, 461);

    // DESCRIBE of a path nobody published to
    let mut reader = harness.connect().await;
    let response = request(&mut reader, Request::new(Method::Describe, &url).header("CSeq", "1")).await;
    assert_eq!(response.status, 404);

    // Missing CSeq closes the connection
    reader
        .send(Frame::Request(Request::new(Method::Options, &url)))
        .await
        .unwrap();
    let response = timeout(WAIT, reader.next()).await.unwrap();
    assert!(matches!(response, Some(Ok(Frame::Response(ref r))) if r.status == 400));
    assert!(timeout(WAIT, reader.next()).await.unwrap().is_none());

    harness.stop().await;
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let harness = Harness::start().await;
    let addr = harness.server.rtsp_addr();

    assert!(matches!(harness.server.start().await, Err(Error::AlreadyStarted)));
    assert_eq!(harness.server.rtsp_addr(), addr);

    harness.stop().await;
}

#[tokio::test]
async fn test_out_of_order_segment_aborts_path() {
    let harness = Harness::start().await;
    let conf = PathConf::default().segment_duration(Duration::from_millis(100));
    let (path, _canceller) = harness.server.new_path("cam1", conf).await.unwrap();

    let (mut publisher, _) = publish(&harness, "cam1").await;
    send_packets(&mut publisher, 0, 3).await;
    wait_for_stats(&harness, "cam1", |stats| stats.latest_segment_id == Some(0)).await;

    // Take the id the publisher's next segment will use
    let entry = harness.server.manager().get_path("cam1").await.unwrap();
    entry
        .playlist()
        .append(Segment::new(1, Duration::from_millis(100), Bytes::from_static(b"foreign")))
        .unwrap();
    drop(entry);

    // The next cut produces segment 1 again
    send_packets(&mut publisher, 3, 2).await;

    let closed = timeout(WAIT, publisher.next()).await.unwrap();
    assert!(!matches!(closed, Some(Ok(_))), "{:?}", closed);
    assert!(!harness.server.path_exist("cam1").await);
    assert_eq!(path.muxer.next_segment(0).await, Err(PlaylistError::Closed));

    harness.stop().await;
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let harness = Harness::with_rtsp(RtspConfig::default().idle_timeout(Duration::from_millis(200))).await;
    let mut client = harness.connect().await;

    let response = request(&mut client, Request::new(Method::Options, harness.url("cam1")).header("CSeq", "1")).await;
    assert_eq!(response.status, 200);

    assert!(timeout(WAIT, client.next()).await.unwrap().is_none());

    harness.stop().await;
}

#[tokio::test]
async fn test_connection_limit() {
    let harness = Harness::with_rtsp(RtspConfig::default().max_connections(1)).await;
    let url = harness.url("cam1");

    let mut first = harness.connect().await;
    let response = request(&mut first, Request::new(Method::Options, &url).header("CSeq", "1")).await;
    assert_eq!(response.status, 200);

    // Over the limit: accepted by the kernel, then dropped
    let mut second = harness.connect().await;
    let _ = second
        .send(Frame::Request(Request::new(Method::Options, &url).header("CSeq", "1")))
        .await;
    let rejected = timeout(WAIT, second.next()).await.unwrap();
    assert!(!matches!(rejected, Some(Ok(_))), "{:?}", rejected);

    // The slot frees up once the first connection is gone
    drop(first);
    timeout(WAIT, async {
        loop {
            let mut client = harness.connect().await;
            let sent = client
                .send(Frame::Request(Request::new(Method::Options, &url).header("CSeq", "1")))
                .await;
            if sent.is_ok() {
                if let Some(Ok(Frame::Response(response))) = client.next().await {
                    assert_eq!(response.status, 200);
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    harness.stop().await;
}

#[tokio::test]
async fn test_reader_disconnect_and_pause() {
    let harness = Harness::start().await;
    let conf = PathConf::default().segment_duration(Duration::from_millis(100));
    harness.server.new_path("cam1", conf).await.unwrap();
    let url = harness.url("cam1");

    let (mut publisher, _) = publish(&harness, "cam1").await;
    send_packets(&mut publisher, 0, 10).await;
    wait_for_stats(&harness, "cam1", |stats| stats.latest_segment_id.is_some()).await;

    let (mut reader, session) = play(&harness, "cam1").await;
    let (mut leaving, _) = play(&harness, "cam1").await;
    wait_for_stats(&harness, "cam1", |stats| stats.reader_count == 2).await;

    let frame = timeout(WAIT, leaving.next()).await.unwrap().unwrap().unwrap();
    assert!(matches!(frame, Frame::Interleaved { channel: 0, .. }));

    // Dropping mid-PLAY detaches the reader
    drop(leaving);
    wait_for_stats(&harness, "cam1", |stats| stats.reader_count == 1).await;

    // PAUSE stops delivery
    let response = request(
        &mut reader,
        Request::new(Method::Pause, &url)
            .header("CSeq", "4")
            .header("Session", session.as_str()),
    )
    .await;
    assert_eq!(response.status, 200);

    send_packets(&mut publisher, 10, 10).await;
    assert!(timeout(Duration::from_millis(300), reader.next()).await.is_err());

    // PLAY resumes from the live segment
    let response = request(
        &mut reader,
        Request::new(Method::Play, &url)
            .header("CSeq", "5")
            .header("Session", session.as_str()),
    )
    .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.cseq(), Some("5"));

    let frame = timeout(WAIT, reader.next()).await.unwrap().unwrap().unwrap();
    assert!(matches!(frame, Frame::Interleaved { channel: 0, .. }));
    assert_eq!(harness.server.manager().path_stats("cam1").await.unwrap().reader_count, 1);

    harness.stop().await;
}
