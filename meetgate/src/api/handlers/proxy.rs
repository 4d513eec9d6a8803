//! Server-side image fetching.
//!
//! The vendor CDN refuses hotlinked images, so the frontend loads them through here. Any URL is
//! accepted.

use axum::{
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::Response,
};
use tracing::{debug, instrument};

use crate::AppState;
use crate::api::models::uploads::ProxyImageQuery;
use crate::errors::{Error, MediaError};
use crate::vendor::VendorError;

const FETCH_FAILED: &str = "Failed to fetch image";

#[instrument(skip_all)]
pub async fn proxy_image(
    State(state): State<AppState>,
    query: Result<Query<ProxyImageQuery>, QueryRejection>,
) -> Result<Response, MediaError> {
    let Query(query) = query.map_err(|rejection| Error::BadRequest {
        message: format!("Invalid image url parameter: {}", rejection.body_text()),
    })?;
    let url = query.url.filter(|url| !url.trim().is_empty()).ok_or_else(|| Error::BadRequest {
        message: "Missing image url parameter".to_string(),
    })?;
    debug!("Proxying image {}", url);

    let mut request = state
        .http_client
        .get(&url)
        .header(header::REFERER, &state.config.image_proxy.referer);
    if let Some(timeout) = state.config.image_proxy.timeout {
        request = request.timeout(timeout);
    }

    let upstream = request
        .send()
        .await
        .map_err(|e| Error::upstream(FETCH_FAILED, VendorError::Transport(e)))?;

    let status = upstream.status();
    if !status.is_success() {
        return Err(Error::upstream(FETCH_FAILED, VendorError::Status { status: status.as_u16() }).into());
    }

    let mut response = Response::builder().status(StatusCode::OK);
    if let Some(content_type) = upstream.headers().get(header::CONTENT_TYPE) {
        response = response.header(header::CONTENT_TYPE, content_type.clone());
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| Error::Other(e.into()).into())
}
