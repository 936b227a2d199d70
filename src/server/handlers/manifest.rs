use crate::{
    error::Result,
    metrics,
    relay::playlist_response,
    server::{handlers::ProxyQuery, state::AppState, url_validation::validate_origin_url},
};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::info;

/// Fetch an origin manifest and return it with every reference proxied
pub async fn serve_manifest(
    Query(query): Query<ProxyQuery>,
    State(state): State<AppState>,
) -> Response {
    let start = Instant::now();

    let response = match rewrite_manifest(&query, &state).await {
        Ok(text) => playlist_response(text),
        Err(e) => {
            if e.is_origin_failure() {
                metrics::record_origin_error(e.kind());
            }
            e.into_response()
        }
    };

    metrics::record_request("manifest", response.status().as_u16());
    metrics::record_duration("manifest", start);
    response
}

async fn rewrite_manifest(query: &ProxyQuery, state: &AppState) -> Result<String> {
    let url = validate_origin_url(
        query.url.as_deref(),
        state.config.block_private_origins,
    )?;

    info!("Fetching manifest from origin: {}", url);
    state.relay.manifest(&url).await
}
