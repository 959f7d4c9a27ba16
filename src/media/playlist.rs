//! Per-path segment buffer and distribution protocol
//!
//! One writer (the path's publisher) appends finalized segments; any number
//! of readers ask for "the segment after the one I last received".
//!
//! # Read positions
//!
//! With `first` and `latest` the oldest and newest retained IDs, a call to
//! [`Playlist::next_segment`] with `prev_id`:
//!
//! ```text
//!   prev_id <  first            -> oldest retained segment   (resync)
//!   first <= prev_id < latest   -> segment prev_id + 1       (catch-up)
//!   prev_id == latest           -> suspend until latest + 1  (live edge)
//!   prev_id >  latest           -> oldest retained segment   (resync)
//! ```
//!
//! Resync always targets the oldest segment, also for readers that are
//! ahead of the writer.
//!
//! # Waking
//!
//! Suspended readers register a oneshot sender keyed by the ID they wait
//! for. Registration and `append` happen under the same lock, so a reader
//! can't miss a segment appended between its check and its suspension, and
//! an append only wakes the readers waiting for that ID. Dropping the
//! reader's future cancels the wait.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::PlaylistError;

use super::sdp::StreamInfo;
use super::segment::Segment;

/// Result of looking up a segment by ID
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentLookup {
    /// Segment is retained
    Found(Segment),
    /// Segment was produced but has been evicted
    Evicted,
    /// Segment has not been produced yet
    Pending,
}

/// Where a reader lands for a given previous ID
enum Position {
    Ready(Segment),
    WaitFor(u64),
    WaitFirst,
}

#[derive(Debug)]
struct Inner {
    /// Retained segments, oldest first
    segments: VecDeque<Segment>,
    /// Retention window
    max_segments: usize,
    /// ID the next append must carry (None until the first append)
    next_id: Option<u64>,
    /// Codec parameters announced by the publisher
    stream_info: Option<StreamInfo>,
    /// Readers suspended at the live edge, keyed by the ID they wait for
    waiters: BTreeMap<u64, Vec<oneshot::Sender<Segment>>>,
    /// Readers waiting for the first segment of an empty playlist
    first_waiters: Vec<oneshot::Sender<Segment>>,
    closed: bool,
}

impl Inner {
    fn window(&self) -> Option<(u64, u64)> {
        Some((self.segments.front()?.id, self.segments.back()?.id))
    }

    fn position(&self, prev_id: u64) -> Position {
        let Some((first, latest)) = self.window() else {
            return Position::WaitFirst;
        };

        if prev_id == latest {
            return Position::WaitFor(latest + 1);
        }

        if prev_id < first || prev_id > latest {
            return self
                .segments
                .front()
                .cloned()
                .map_or(Position::WaitFirst, Position::Ready);
        }

        let index = (prev_id + 1 - first) as usize;
        self.segments
            .get(index)
            .cloned()
            .map_or(Position::WaitFirst, Position::Ready)
    }

    fn register(&mut self, position: Option<u64>) -> oneshot::Receiver<Segment> {
        let (tx, rx) = oneshot::channel();
        let queue = match position {
            Some(id) => self.waiters.entry(id).or_default(),
            None => &mut self.first_waiters,
        };
        // Drop waiters whose readers went away
        queue.retain(|waiter| !waiter.is_closed());
        queue.push(tx);
        rx
    }

    fn close(&mut self) {
        self.closed = true;
        self.segments.clear();
        // Dropping the senders fails every suspended reader with Closed
        self.waiters.clear();
        self.first_waiters.clear();
    }
}

/// Sliding-window segment buffer with blocking reads at the live edge
#[derive(Debug)]
pub struct Playlist {
    inner: Mutex<Inner>,
}

impl Playlist {
    /// Create a playlist retaining at most `max_segments` segments
    pub fn new(max_segments: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                segments: VecDeque::with_capacity(max_segments.max(1)),
                max_segments: max_segments.max(1),
                next_id: None,
                stream_info: None,
                waiters: BTreeMap::new(),
                first_waiters: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Append a finalized segment
    ///
    /// Must only be called by the path's single writer. The first segment
    /// sets the ID base; every later one must carry the previous ID + 1.
    /// A gap is an internal consistency violation: the playlist closes
    /// itself and returns [`PlaylistError::NonContiguous`].
    pub fn append(&self, segment: Segment) -> Result<(), PlaylistError> {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(PlaylistError::Closed);
        }

        if let Some(expected) = inner.next_id {
            if segment.id != expected {
                inner.close();
                return Err(PlaylistError::NonContiguous {
                    expected,
                    got: segment.id,
                });
            }
        }

        inner.next_id = Some(segment.id + 1);
        inner.segments.push_back(segment.clone());
        while inner.segments.len() > inner.max_segments {
            inner.segments.pop_front();
        }

        if let Some(waiters) = inner.waiters.remove(&segment.id) {
            for waiter in waiters {
                let _ = waiter.send(segment.clone());
            }
        }
        for waiter in inner.first_waiters.drain(..) {
            let _ = waiter.send(segment.clone());
        }

        Ok(())
    }

    /// Get the segment following `prev_id`
    ///
    /// Suspends only when `prev_id` is the live edge (or nothing has been
    /// appended yet). See the module docs for the resync rules.
    pub async fn next_segment(&self, prev_id: u64) -> Result<Segment, PlaylistError> {
        let rx = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(PlaylistError::Closed);
            }

            match inner.position(prev_id) {
                Position::Ready(segment) => return Ok(segment),
                Position::WaitFor(id) => inner.register(Some(id)),
                Position::WaitFirst => inner.register(None),
            }
        };

        rx.await.map_err(|_| PlaylistError::Closed)
    }

    /// Get the newest retained segment, waiting for the first one if empty
    pub async fn live_segment(&self) -> Result<Segment, PlaylistError> {
        let rx = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(PlaylistError::Closed);
            }

            if let Some(segment) = inner.segments.back() {
                return Ok(segment.clone());
            }
            inner.register(None)
        };

        rx.await.map_err(|_| PlaylistError::Closed)
    }

    /// Wait until at least one segment is retained
    pub async fn wait_for_segment_finalized(&self) -> Result<(), PlaylistError> {
        self.live_segment().await.map(|_| ())
    }

    /// Look up a retained segment by ID
    pub fn segment(&self, id: u64) -> Result<SegmentLookup, PlaylistError> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(PlaylistError::Closed);
        }

        let Some((first, latest)) = inner.window() else {
            return Ok(SegmentLookup::Pending);
        };

        let lookup = if id < first {
            SegmentLookup::Evicted
        } else if id > latest {
            SegmentLookup::Pending
        } else {
            inner
                .segments
                .get((id - first) as usize)
                .cloned()
                .map_or(SegmentLookup::Pending, SegmentLookup::Found)
        };

        Ok(lookup)
    }

    /// Snapshot of the retained segments, oldest first
    pub fn segments(&self) -> Result<Vec<Segment>, PlaylistError> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(PlaylistError::Closed);
        }
        Ok(inner.segments.iter().cloned().collect())
    }

    /// IDs of the oldest and newest retained segments
    pub fn window(&self) -> Option<(u64, u64)> {
        self.inner.lock().window()
    }

    /// Number of retained segments
    pub fn len(&self) -> usize {
        self.inner.lock().segments.len()
    }

    /// Check if no segment is retained
    pub fn is_empty(&self) -> bool {
        self.inner.lock().segments.is_empty()
    }

    /// ID the next appended segment must carry
    ///
    /// A reattaching publisher continues the sequence from here.
    pub fn next_id(&self) -> u64 {
        self.inner.lock().next_id.unwrap_or(0)
    }

    /// Store the publisher's stream description
    pub fn set_stream_info(&self, info: StreamInfo) {
        self.inner.lock().stream_info = Some(info);
    }

    /// Codec metadata of the stream
    ///
    /// Fails if no publisher has ever attached.
    pub fn stream_info(&self) -> Result<StreamInfo, PlaylistError> {
        let inner = self.inner.lock();
        if inner.closed {
            return Err(PlaylistError::Closed);
        }
        inner.stream_info.clone().ok_or(PlaylistError::NoStreamInfo)
    }

    /// Tear down the playlist, failing every suspended reader
    pub fn close(&self) {
        self.inner.lock().close();
    }

    /// Check if the playlist was torn down
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of readers currently suspended
    pub fn waiting_readers(&self) -> usize {
        let inner = self.inner.lock();
        let pending = |queue: &Vec<oneshot::Sender<Segment>>| {
            queue.iter().filter(|waiter| !waiter.is_closed()).count()
        };
        inner.waiters.values().map(pending).sum::<usize>() + pending(&inner.first_waiters)
    }
}
