//! Single-thread expansion API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use forumdex_core::forum::ExpandError;
use forumdex_core::pipeline::filter_episode;
use forumdex_core::{EpisodeRecord, PipelineError};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReleaseParams {
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ThreadReleasesResponse {
    pub thread_id: String,
    pub releases: Vec<EpisodeRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error }))
}

/// GET /api/v1/threads/{id}/releases
///
/// Expand one thread and return its releases, optionally narrowed to a
/// season and episode.
pub async fn thread_releases(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Query(params): Query<ReleaseParams>,
) -> Result<Json<ThreadReleasesResponse>, impl IntoResponse> {
    if thread_id.is_empty() || !thread_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid thread id: {}", thread_id),
        ));
    }

    match state.pipeline().expand_thread(&thread_id).await {
        Ok(records) => {
            let records: Vec<EpisodeRecord> = match params.season {
                Some(season) => records
                    .into_iter()
                    .filter(|r| r.season.is_none() || r.season == Some(season))
                    .collect(),
                None => records,
            };
            let releases = filter_episode(records, params.episode);
            Ok(Json(ThreadReleasesResponse {
                total: releases.len(),
                thread_id,
                releases,
            }))
        }
        Err(e) => {
            warn!(thread_id = %thread_id, error = %e, "Thread expansion failed");
            let status = match &e {
                PipelineError::Auth(_) | PipelineError::Expand(ExpandError::SessionLost) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                PipelineError::Expand(ExpandError::Transport(_)) => StatusCode::BAD_GATEWAY,
            };
            Err(error_response(status, e.to_string()))
        }
    }
}
