//! Segment source handle handed to the owning application
//!
//! The handle only holds a weak reference: once the path is removed every
//! call fails with [`PlaylistError::Closed`].

use std::sync::{Arc, Weak};

use crate::error::PlaylistError;
use crate::media::sdp::StreamInfo;
use crate::media::segment::Segment;

use super::entry::Path;

/// Read access to a path's segments
#[derive(Debug, Clone)]
pub struct HlsMuxer {
    path: Weak<Path>,
}

impl HlsMuxer {
    pub(crate) fn new(path: &Arc<Path>) -> Self {
        Self {
            path: Arc::downgrade(path),
        }
    }

    fn path(&self) -> Result<Arc<Path>, PlaylistError> {
        self.path.upgrade().ok_or(PlaylistError::Closed)
    }

    /// Codec metadata of the stream
    pub fn stream_info(&self) -> Result<StreamInfo, PlaylistError> {
        self.path()?.playlist().stream_info()
    }

    /// Wait until the path holds at least one finalized segment
    pub async fn wait_for_segment_finalized(&self) -> Result<(), PlaylistError> {
        self.path()?.playlist().wait_for_segment_finalized().await
    }

    /// Get the segment following `prev_id`, blocking at the live edge
    pub async fn next_segment(&self, prev_id: u64) -> Result<Segment, PlaylistError> {
        self.path()?.playlist().next_segment(prev_id).await
    }

    /// Check if the path still exists
    pub fn is_alive(&self) -> bool {
        self.path
            .upgrade()
            .is_some_and(|path| !path.playlist().is_closed())
    }
}
