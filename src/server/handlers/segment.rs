use crate::{
    error::Result,
    metrics,
    relay::RelayResponse,
    server::{handlers::ProxyQuery, state::AppState, url_validation::validate_origin_url},
};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::info;

/// Relay one playlist reference: rewrite it if it is a nested playlist,
/// stream it otherwise.
///
/// Failures before the origin answers become JSON errors. Once media bytes
/// are flowing, an origin failure closes the client connection instead.
pub async fn serve_segment(
    Query(query): Query<ProxyQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();

    let response = match relay_segment(&query, &state, &headers).await {
        Ok(relayed) => relayed.into_response(),
        Err(e) => {
            if e.is_origin_failure() {
                metrics::record_origin_error(e.kind());
            }
            e.into_response()
        }
    };

    metrics::record_request("segment", response.status().as_u16());
    metrics::record_duration("segment", start);
    response
}

async fn relay_segment(
    query: &ProxyQuery,
    state: &AppState,
    headers: &HeaderMap,
) -> Result<RelayResponse> {
    let url = validate_origin_url(
        query.url.as_deref(),
        state.config.block_private_origins,
    )?;
    let range = headers.get(header::RANGE);

    match range.and_then(|r| r.to_str().ok()) {
        Some(range) => info!("Relaying {} (Range: {})", url, range),
        None => info!("Relaying {}", url),
    }

    state.relay.resource(&url, range).await
}
