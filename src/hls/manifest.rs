//! Live playlist (m3u8) generation

use std::fmt::Write;

use chrono::SecondsFormat;

use crate::media::segment::Segment;

/// Content type of HLS playlists
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Content type of segments
///
/// Segments carry framed RTP packets, not MPEG-TS.
pub const SEGMENT_CONTENT_TYPE: &str = "application/octet-stream";

/// Generate a live HLS playlist from the retained window
///
/// Live playlists have no `#EXT-X-ENDLIST`; clients poll for updates.
/// Segment URIs are relative (`<id>.ts`).
pub fn live_playlist(segments: &[Segment]) -> String {
    let target_duration = segments
        .iter()
        .map(|s| s.duration.as_secs_f64().ceil() as u64)
        .max()
        .unwrap_or(1)
        .max(1);
    let media_sequence = segments.first().map_or(0, |s| s.id);

    let mut playlist = format!(
        "#EXTM3U\n\
         #EXT-X-VERSION:3\n\
         #EXT-X-TARGETDURATION:{}\n\
         #EXT-X-MEDIA-SEQUENCE:{}\n",
        target_duration, media_sequence
    );

    for seg in segments {
        let _ = write!(
            playlist,
            "#EXT-X-PROGRAM-DATE-TIME:{}\n#EXTINF:{:.3},\n{}.ts\n",
            seg.started_at().to_rfc3339_opts(SecondsFormat::Millis, true),
            seg.duration.as_secs_f64(),
            seg.id
        );
    }

    playlist
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    fn seg(id: u64, millis: u64) -> Segment {
        Segment::new(id, Duration::from_millis(millis), Bytes::new())
    }

    #[test]
    fn test_live_playlist_generation() {
        let segments = vec![seg(4, 1000), seg(5, 2500), seg(6, 1000)];

        let playlist = live_playlist(&segments);

        assert!(playlist.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(playlist.contains("#EXT-X-TARGETDURATION:3\n"));
        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:4\n"));
        assert!(playlist.contains("#EXTINF:2.500,\n5.ts\n"));
        assert_eq!(playlist.matches("#EXT-X-PROGRAM-DATE-TIME:").count(), 3);
        assert!(playlist.trim_end().ends_with("6.ts"));
        // Live playlists should NOT have ENDLIST
        assert!(!playlist.contains("#EXT-X-ENDLIST"));
    }

    #[test]
    fn test_empty_playlist() {
        let playlist = live_playlist(&[]);

        assert!(playlist.contains("#EXT-X-TARGETDURATION:1\n"));
        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:0\n"));
        assert!(!playlist.contains("#EXTINF"));
    }
}
