//! Authentication and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use forumdex_core::{AccessError, AccessRequest, Identity};

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

use super::torznab::TORZNAB_ERROR_CODE;

/// Metrics middleware that tracks HTTP request duration and counts.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Build what the authenticator sees: lowercased headers plus the `apikey`
/// query parameter.
fn access_request(request: &Request<Body>) -> AccessRequest {
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let query_api_key = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(params)| params.get("apikey").cloned());

    AccessRequest {
        headers,
        query_api_key,
    }
}

/// The request itself must not be held across the await: `Body` is not `Sync`.
async fn authenticate(
    state: &AppState,
    access: AccessRequest,
    path: &str,
) -> Result<Identity, AccessError> {
    let authenticator = state.authenticator();
    if authenticator.method_name() == "none" {
        return Ok(Identity::anonymous());
    }

    let result = authenticator.authenticate(&access).await;
    if let Err(e) = &result {
        let reason = match e {
            AccessError::NotAuthenticated => "not_authenticated",
            AccessError::InvalidKey => "invalid_key",
            AccessError::ConfigurationError(_) => "internal_error",
        };
        AUTH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
        debug!(reason, path, "Rejected API request");
    }
    result
}

/// API key check for JSON routes. Failures map to a bare status code.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let access = access_request(&request);
    let path = request.uri().path().to_string();
    match authenticate(&state, access, &path).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(AccessError::ConfigurationError(_)) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// API key check for the Torznab endpoint. Failures are answered with a
/// Torznab error document so indexer clients can show the reason.
pub async fn torznab_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let access = access_request(&request);
    let path = request.uri().path().to_string();
    match authenticate(&state, access, &path).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            let status = match e {
                AccessError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            };
            let encoder = state.encoder();
            match encoder.error(TORZNAB_ERROR_CODE, &e.to_string()) {
                Ok(body) => (status, [(header::CONTENT_TYPE, encoder.content_type())], body)
                    .into_response(),
                Err(_) => status.into_response(),
            }
        }
    }
}

/// Extractor for the authenticated caller.
///
/// Falls back to "anonymous" when no identity was attached.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let user_id = parts
            .extensions
            .get::<Identity>()
            .map(|id| id.user_id.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        std::future::ready(Ok(AuthUser(user_id)))
    }
}
