//! Torznab API endpoint.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use forumdex_core::{EpisodeRecord, SearchRequest};

use crate::feed::FeedError;
use crate::metrics::TORZNAB_REQUESTS;
use crate::state::AppState;

/// Code carried by every Torznab error document.
pub const TORZNAB_ERROR_CODE: u16 = 100;

/// Upper bound on items per feed.
const MAX_LIMIT: usize = 100;

/// Query parameters of `GET /api`.
///
/// Numeric parameters are kept as strings: clients send empty values, and a
/// malformed season or episode is ignored rather than rejected.
#[derive(Debug, Default, Deserialize)]
pub struct TorznabParams {
    pub t: Option<String>,
    pub q: Option<String>,
    pub season: Option<String>,
    pub ep: Option<String>,
    pub cat: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn number<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.map(str::trim).and_then(|v| v.parse().ok())
}

impl TorznabParams {
    fn search_request(&self, with_episode: bool) -> SearchRequest {
        let mut request = SearchRequest::new(self.q.as_deref().unwrap_or_default().trim());
        if let Some(season) = number(self.season.as_deref()) {
            request = request.with_season(season);
        }
        if with_episode {
            if let Some(episode) = number(self.ep.as_deref()) {
                request = request.with_episode(episode);
            }
        }
        request
    }

    /// Offset and limit applied to a result list.
    fn page(&self, records: Vec<EpisodeRecord>) -> Vec<EpisodeRecord> {
        let offset: usize = number(self.offset.as_deref()).unwrap_or(0);
        let limit: usize = number::<usize>(self.limit.as_deref())
            .unwrap_or(MAX_LIMIT)
            .min(MAX_LIMIT);
        records.into_iter().skip(offset).take(limit).collect()
    }
}

fn xml_response(state: &AppState, status: StatusCode, body: Result<String, FeedError>) -> Response {
    match body {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, state.encoder().content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode Torznab response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn torznab_error(state: &AppState, description: &str) -> Response {
    xml_response(
        state,
        StatusCode::OK,
        state.encoder().error(TORZNAB_ERROR_CODE, description),
    )
}

/// GET /api
///
/// Dispatches on `t`: `caps`, `search`, `tvsearch` or `test`.
pub async fn torznab_api(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TorznabParams>,
) -> Response {
    let function = params.t.as_deref().unwrap_or_default();

    match function {
        "caps" => {
            TORZNAB_REQUESTS.with_label_values(&["caps"]).inc();
            xml_response(&state, StatusCode::OK, state.encoder().capabilities())
        }
        "search" | "tvsearch" => {
            TORZNAB_REQUESTS.with_label_values(&[function]).inc();
            let request = params.search_request(function == "tvsearch");
            info!(
                function,
                query = %request.query,
                season = ?request.season,
                episode = ?request.episode,
                "Torznab search"
            );
            let records = params.page(state.pipeline().search(&request).await);
            xml_response(&state, StatusCode::OK, state.encoder().encode(&records))
        }
        "test" => {
            TORZNAB_REQUESTS.with_label_values(&["test"]).inc();
            match state.session().ensure_authenticated().await {
                Ok(_) => xml_response(&state, StatusCode::OK, state.encoder().encode(&[])),
                Err(e) => {
                    warn!(error = %e, "Torznab test could not authenticate with the forum");
                    torznab_error(&state, &format!("Forum login failed: {}", e))
                }
            }
        }
        other => {
            TORZNAB_REQUESTS.with_label_values(&["unknown"]).inc();
            if other.is_empty() {
                torznab_error(&state, "Missing parameter: t")
            } else {
                torznab_error(&state, &format!("Unknown function: {}", other))
            }
        }
    }
}
