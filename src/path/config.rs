//! Path and path manager configuration

use std::time::Duration;

/// Per-path options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConf {
    /// Number of finalized segments retained for readers
    pub segment_count: usize,

    /// Target media duration of a segment
    pub segment_duration: Duration,

    /// Longest time a segment may stay open before it is finalized anyway
    pub segment_max_hold: Duration,
}

impl Default for PathConf {
    fn default() -> Self {
        Self {
            segment_count: 7,
            segment_duration: Duration::from_secs(1),
            segment_max_hold: Duration::from_secs(4),
        }
    }
}

impl PathConf {
    /// Set the retention window
    pub fn segment_count(mut self, count: usize) -> Self {
        self.segment_count = count.max(1);
        self
    }

    /// Set the target segment duration
    pub fn segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration = duration;
        self
    }

    /// Set the maximum time a segment may stay open
    pub fn segment_max_hold(mut self, hold: Duration) -> Self {
        self.segment_max_hold = hold;
        self
    }
}

/// Path manager options
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Create paths on first publish instead of rejecting unknown names
    pub allow_dynamic_paths: bool,

    /// Configuration used for dynamically created paths
    pub default_path: PathConf,
}

impl ManagerConfig {
    /// Allow publishers to create paths
    pub fn allow_dynamic_paths(mut self, allow: bool) -> Self {
        self.allow_dynamic_paths = allow;
        self
    }

    /// Set the configuration of dynamically created paths
    pub fn default_path(mut self, conf: PathConf) -> Self {
        self.default_path = conf;
        self
    }
}
