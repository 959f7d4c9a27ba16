//! Path entry
//!
//! A path binds one stream name to its playlist, at most one publisher and
//! any number of readers. Sessions are tracked by ID only; connections
//! refer back to the path through a `Weak` handle.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::media::playlist::Playlist;

use super::config::PathConf;
use super::error::PathError;

/// A named live stream
#[derive(Debug)]
pub struct Path {
    name: String,

    conf: PathConf,

    playlist: Playlist,

    /// Session ID of the active publisher
    publisher_id: Mutex<Option<u64>>,

    /// Session IDs of the active readers
    readers: Mutex<HashSet<u64>>,

    /// Created by a publisher rather than registered by the application
    dynamic: bool,

    created_at: Instant,
}

impl Path {
    pub(super) fn new(name: String, conf: PathConf, dynamic: bool) -> Self {
        Self {
            playlist: Playlist::new(conf.segment_count),
            name,
            conf,
            publisher_id: Mutex::new(None),
            readers: Mutex::new(HashSet::new()),
            dynamic,
            created_at: Instant::now(),
        }
    }

    /// Path name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path configuration
    pub fn conf(&self) -> &PathConf {
        &self.conf
    }

    /// Segment buffer of this path
    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Check if the path was created by a publisher
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Session ID of the active publisher
    pub fn publisher_id(&self) -> Option<u64> {
        *self.publisher_id.lock()
    }

    /// Check if the path has an active publisher
    pub fn has_publisher(&self) -> bool {
        self.publisher_id.lock().is_some()
    }

    /// Number of active readers
    pub fn reader_count(&self) -> usize {
        self.readers.lock().len()
    }

    pub(super) fn attach_publisher(&self, session_id: u64) -> Result<(), PathError> {
        let mut publisher = self.publisher_id.lock();
        if publisher.is_some() {
            return Err(PathError::AlreadyPublishing(self.name.clone()));
        }
        *publisher = Some(session_id);
        Ok(())
    }

    /// Returns false if `session_id` is not the active publisher
    pub(super) fn detach_publisher(&self, session_id: u64) -> bool {
        let mut publisher = self.publisher_id.lock();
        if *publisher != Some(session_id) {
            return false;
        }
        *publisher = None;
        true
    }

    pub(super) fn attach_reader(&self, session_id: u64) {
        self.readers.lock().insert(session_id);
    }

    pub(super) fn detach_reader(&self, session_id: u64) -> bool {
        self.readers.lock().remove(&session_id)
    }

    /// Release the playlist and forget all sessions
    pub(super) fn close(&self) {
        self.playlist.close();
        *self.publisher_id.lock() = None;
        self.readers.lock().clear();
    }

    /// Snapshot of the path state
    pub fn stats(&self) -> PathStats {
        let window = self.playlist.window();
        PathStats {
            publisher_id: self.publisher_id(),
            reader_count: self.reader_count(),
            segment_count: self.playlist.len(),
            first_segment_id: window.map(|(first, _)| first),
            latest_segment_id: window.map(|(_, latest)| latest),
            dynamic: self.dynamic,
            uptime: self.created_at.elapsed(),
        }
    }
}

/// Statistics for a path
#[derive(Debug, Clone)]
pub struct PathStats {
    /// Session ID of the active publisher
    pub publisher_id: Option<u64>,
    /// Number of active readers
    pub reader_count: usize,
    /// Number of retained segments
    pub segment_count: usize,
    /// Oldest retained segment
    pub first_segment_id: Option<u64>,
    /// Live edge
    pub latest_segment_id: Option<u64>,
    /// Whether the path was created by a publisher
    pub dynamic: bool,
    /// Time since the path was created
    pub uptime: Duration,
}
