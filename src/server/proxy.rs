//! Download proxy: fetches a predeclared URL and streams it back unmodified.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, info};

use super::AppState;
use crate::{
    models::DEFAULT_CONTENT_TYPE,
    protocol::{DownloadQuery, ErrorBody},
};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("Invalid URL")]
    InvalidUrl,

    #[error("Upstream responded with {0}")]
    UpstreamStatus(StatusCode),

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Upstream error: {0}")]
    Upstream(reqwest::Error),
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Upstream(err)
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::InvalidUrl => (StatusCode::BAD_REQUEST, ErrorBody::new("Invalid URL")),
            Self::UpstreamStatus(upstream) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Failed to fetch content")
                    .with_details(format!("Status: {}", upstream.as_u16())),
            ),
            Self::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorBody::new("Request timed out"),
            ),
            Self::Upstream(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new("Download error").with_details(err.to_string()),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[tracing::instrument(skip(state, query))]
pub async fn download(
    State(state): State<Arc<AppState>>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, ProxyError> {
    let url = match query {
        Ok(Query(DownloadQuery { url: Some(url) })) if state.keywords.is_known_url(&url) => url,
        _ => return Err(ProxyError::InvalidUrl),
    };
    info!("Download requested: {}", url);

    // The deadline covers the whole transfer, body included.
    let upstream = state
        .client
        .get(&url)
        .header(header::USER_AGENT, BROWSER_USER_AGENT)
        .timeout(state.upstream_timeout)
        .send()
        .await
        .map_err(|e| {
            error!("Upstream fetch failed: {}", e);
            ProxyError::from(e)
        })?;

    let status = upstream.status();
    if !status.is_success() {
        error!("Upstream responded with {}", status);
        return Err(ProxyError::UpstreamStatus(status));
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let content_length = upstream.content_length();
    debug!(?content_type, ?content_length, "Streaming upstream body");

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    Ok(response)
}
