//! HLS HTTP endpoints
//!
//! | Endpoint | Description |
//! |----------|-------------|
//! | `GET /hls/<name>/index.m3u8` | Live playlist, `?_HLS_msn=<n>` blocks for segment `n` |
//! | `GET /hls/<name>/<id>.ts` | Segment payload |

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue};
use axum::middleware::map_response;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::media::playlist::SegmentLookup;
use crate::path::PathManager;

use super::error::HlsError;
use super::manifest::{live_playlist, MANIFEST_CONTENT_TYPE, SEGMENT_CONTENT_TYPE};

/// Router state
#[derive(Debug, Clone)]
pub struct HlsState {
    pub manager: Arc<PathManager>,

    /// Longest time a manifest request waits for a segment
    pub manifest_wait_timeout: Duration,
}

/// Query of a blocking playlist reload
#[derive(Debug, Default, Deserialize)]
pub struct ManifestQuery {
    #[serde(rename = "_HLS_msn")]
    pub msn: Option<u64>,
}

/// Create the HLS router with all endpoints
pub fn hls_router(state: HlsState) -> Router {
    Router::new()
        .route(
            "/hls/{name}/index.m3u8",
            get(manifest_handler).fallback(method_not_allowed),
        )
        .route(
            "/hls/{name}/{segment}",
            get(segment_handler).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(map_response(no_cache))
        .with_state(state)
}

/// Serve the live playlist of a path
///
/// Waits for the first segment of a fresh path. With `_HLS_msn=<n>` the
/// request is held until segment `n` exists, as long as `n` is at most one
/// past the live edge.
async fn manifest_handler(
    Path(name): Path<String>,
    Query(query): Query<ManifestQuery>,
    State(state): State<HlsState>,
) -> Result<Response, HlsError> {
    let path = state
        .manager
        .get_path(&name)
        .await
        .ok_or_else(|| HlsError::PathNotFound(name.clone()))?;
    let playlist = path.playlist();

    match tokio::time::timeout(state.manifest_wait_timeout, playlist.wait_for_segment_finalized()).await {
        Ok(result) => result.map_err(|e| HlsError::from_playlist(&name, e))?,
        Err(_) => return Err(HlsError::NotReady(format!("no segment produced for {}", name))),
    }

    if let Some(msn) = query.msn {
        let (_, latest) = playlist
            .window()
            .ok_or_else(|| HlsError::PathNotFound(name.clone()))?;

        if msn > latest + 1 {
            return Err(HlsError::BadRequest(format!(
                "_HLS_msn {} is beyond the next segment {}",
                msn,
                latest + 1
            )));
        }

        if msn == latest + 1 {
            let wait = tokio::time::timeout(state.manifest_wait_timeout, playlist.next_segment(latest));
            match wait.await {
                Ok(Ok(segment)) => {
                    tracing::trace!(path = %name, segment_id = segment.id, "Blocking reload released")
                }
                Ok(Err(e)) => return Err(HlsError::from_playlist(&name, e)),
                // Serve what we have
                Err(_) => {}
            }
        }
    }

    let segments = playlist
        .segments()
        .map_err(|e| HlsError::from_playlist(&name, e))?;

    Ok(([(header::CONTENT_TYPE, MANIFEST_CONTENT_TYPE)], live_playlist(&segments)).into_response())
}

/// Serve one segment by ID
async fn segment_handler(
    Path((name, segment)): Path<(String, String)>,
    State(state): State<HlsState>,
) -> Result<Response, HlsError> {
    let id: u64 = segment
        .strip_suffix(".ts")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HlsError::SegmentNotFound(segment.clone()))?;

    let path = state
        .manager
        .get_path(&name)
        .await
        .ok_or_else(|| HlsError::PathNotFound(name.clone()))?;

    let lookup = path
        .playlist()
        .segment(id)
        .map_err(|e| HlsError::from_playlist(&name, e))?;

    match lookup {
        SegmentLookup::Found(segment) => {
            Ok(([(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)], segment.data).into_response())
        }
        SegmentLookup::Evicted => Err(HlsError::SegmentGone(id)),
        SegmentLookup::Pending => Err(HlsError::SegmentNotFound(segment)),
    }
}

async fn method_not_allowed() -> HlsError {
    HlsError::MethodNotAllowed
}

async fn not_found() -> HlsError {
    HlsError::PathNotFound("no such resource".into())
}

async fn no_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
