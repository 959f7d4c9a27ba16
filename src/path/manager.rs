//! Path manager implementation
//!
//! The registry of all paths. It creates and destroys paths, enforces one
//! publisher per path and routes publish/play requests to the right path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::config::{ManagerConfig, PathConf};
use super::entry::{Path, PathStats};
use super::error::PathError;
use super::muxer::HlsMuxer;

/// Central registry for all paths
///
/// Thread-safe via `RwLock`. Lookups from readers take the read lock;
/// adding/removing paths and attaching publishers take the write lock.
#[derive(Debug)]
pub struct PathManager {
    /// Map of path name to path
    paths: RwLock<HashMap<String, Arc<Path>>>,

    config: ManagerConfig,

    /// Set once `shutdown` ran
    closed: AtomicBool,
}

impl PathManager {
    /// Create a manager with default configuration
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Create a manager with custom configuration
    pub fn with_config(config: ManagerConfig) -> Self {
        Self {
            paths: RwLock::new(HashMap::new()),
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the manager configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Register a path
    ///
    /// Fails without touching existing state if the name is taken.
    pub async fn add_path(&self, name: &str, conf: PathConf) -> Result<HlsMuxer, PathError> {
        validate_name(name)?;

        let mut paths = self.paths.write().await;
        self.ensure_open()?;

        if paths.contains_key(name) {
            return Err(PathError::AlreadyExists(name.to_string()));
        }

        let path = Arc::new(Path::new(name.to_string(), conf, false));
        let muxer = HlsMuxer::new(&path);
        paths.insert(name.to_string(), path);

        tracing::info!(path = %name, "Path added");
        Ok(muxer)
    }

    /// Remove a path, failing every reader blocked on it
    ///
    /// Removing an unknown path is a no-op.
    pub async fn remove_path(&self, name: &str) {
        let removed = self.paths.write().await.remove(name);

        if let Some(path) = removed {
            path.close();
            tracing::info!(path = %name, "Path removed");
        }
    }

    /// Tear down a path after an internal consistency violation
    pub async fn abort_path(&self, name: &str, reason: &str) {
        tracing::error!(path = %name, reason = reason, "Aborting path");
        self.remove_path(name).await;
    }

    /// Check if a path exists
    pub async fn path_exists(&self, name: &str) -> bool {
        self.paths.read().await.contains_key(name)
    }

    /// Look up a path
    pub async fn get_path(&self, name: &str) -> Option<Arc<Path>> {
        self.paths.read().await.get(name).cloned()
    }

    /// Get a segment handle for an existing path
    pub async fn muxer(&self, name: &str) -> Option<HlsMuxer> {
        self.get_path(name).await.map(|path| HlsMuxer::new(&path))
    }

    /// Check whether a publisher could attach to `name` right now
    pub async fn check_publish(&self, name: &str) -> Result<(), PathError> {
        validate_name(name)?;
        self.ensure_open()?;

        match self.paths.read().await.get(name) {
            Some(path) if path.has_publisher() => {
                Err(PathError::AlreadyPublishing(name.to_string()))
            }
            Some(_) => Ok(()),
            None if self.config.allow_dynamic_paths => Ok(()),
            None => Err(PathError::NotFound(name.to_string())),
        }
    }

    /// Attach a publisher to a path
    ///
    /// Unknown names create a dynamic path if the configuration allows it.
    pub async fn register_publisher(
        &self,
        name: &str,
        session_id: u64,
    ) -> Result<Arc<Path>, PathError> {
        validate_name(name)?;

        let mut paths = self.paths.write().await;
        self.ensure_open()?;

        let path = match paths.get(name) {
            Some(path) => Arc::clone(path),
            None if self.config.allow_dynamic_paths => {
                let path = Arc::new(Path::new(
                    name.to_string(),
                    self.config.default_path.clone(),
                    true,
                ));
                paths.insert(name.to_string(), Arc::clone(&path));
                tracing::info!(path = %name, "Dynamic path created");
                path
            }
            None => return Err(PathError::NotFound(name.to_string())),
        };

        path.attach_publisher(session_id)?;

        tracing::info!(
            path = %name,
            session_id = session_id,
            readers = path.reader_count(),
            "Publisher registered"
        );

        Ok(path)
    }

    /// Detach a publisher from a path
    ///
    /// Dynamic paths are destroyed with their publisher; registered paths
    /// keep their segments and wait for the next publisher.
    pub async fn unregister_publisher(&self, name: &str, session_id: u64) {
        let mut paths = self.paths.write().await;

        let Some(path) = paths.get(name).cloned() else {
            return;
        };

        if !path.detach_publisher(session_id) {
            tracing::warn!(
                path = %name,
                expected = ?path.publisher_id(),
                actual = session_id,
                "Publisher unregister mismatch"
            );
            return;
        }

        if path.is_dynamic() {
            paths.remove(name);
            path.close();
            tracing::info!(
                path = %name,
                session_id = session_id,
                "Publisher disconnected, dynamic path removed"
            );
        } else {
            tracing::info!(
                path = %name,
                session_id = session_id,
                readers = path.reader_count(),
                "Publisher disconnected"
            );
        }
    }

    /// Attach a reader to a path
    pub async fn register_reader(&self, name: &str, session_id: u64) -> Result<Arc<Path>, PathError> {
        self.ensure_open()?;

        let path = self
            .get_path(name)
            .await
            .ok_or_else(|| PathError::NotFound(name.to_string()))?;
        path.attach_reader(session_id);

        tracing::info!(
            path = %name,
            session_id = session_id,
            readers = path.reader_count(),
            "Reader added"
        );

        Ok(path)
    }

    /// Detach a reader from a path
    pub async fn unregister_reader(&self, name: &str, session_id: u64) {
        if let Some(path) = self.get_path(name).await {
            if path.detach_reader(session_id) {
                tracing::debug!(
                    path = %name,
                    session_id = session_id,
                    readers = path.reader_count(),
                    "Reader removed"
                );
            }
        }
    }

    /// Get path statistics
    pub async fn path_stats(&self, name: &str) -> Option<PathStats> {
        self.get_path(name).await.map(|path| path.stats())
    }

    /// Get total number of paths
    pub async fn path_count(&self) -> usize {
        self.paths.read().await.len()
    }

    /// Close every path and refuse new ones
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);

        let paths: Vec<_> = self.paths.write().await.drain().collect();
        for (name, path) in &paths {
            path.close();
            tracing::debug!(path = %name, "Path closed by shutdown");
        }

        tracing::info!(paths = paths.len(), "Path manager shut down");
    }

    /// Spawn a task that shuts the manager down once `token` is cancelled
    pub fn spawn_shutdown_task(self: &Arc<Self>, token: CancellationToken) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            token.cancelled().await;
            manager.shutdown().await;
        })
    }

    fn ensure_open(&self) -> Result<(), PathError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PathError::ShuttingDown);
        }
        Ok(())
    }
}

impl Default for PathManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Path names appear in RTSP and HLS URLs
fn validate_name(name: &str) -> Result<(), PathError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '~'));

    if valid {
        Ok(())
    } else {
        Err(PathError::InvalidName(name.to_string()))
    }
}
