use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Errors produced while fetching, rewriting or relaying origin content.
///
/// Every error is scoped to the single client request that triggered it.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{0} parameter required")]
    MissingParameter(&'static str),

    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    #[error("Cannot resolve playlist reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Origin unreachable: {0}")]
    OriginUnreachable(String),

    #[error("Origin returned HTTP {0}")]
    OriginHttpError(u16),

    #[error("Origin timed out after {0}s")]
    Timeout(u64),

    #[error("Playlist exceeds {0} bytes")]
    PlaylistTooLarge(usize),

    #[error("Upstream read failed: {0}")]
    ProxyUpstreamError(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Too many concurrent relays")]
    Overloaded,
}

impl RelayError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::InvalidUrl(_) => "invalid_url",
            Self::InvalidReference { .. } => "invalid_reference",
            Self::OriginUnreachable(_) => "origin_unreachable",
            Self::OriginHttpError(_) => "origin_http_error",
            Self::Timeout(_) => "timeout",
            Self::PlaylistTooLarge(_) => "playlist_too_large",
            Self::ProxyUpstreamError(_) => "proxy_upstream_error",
            Self::Unauthorized => "unauthorized",
            Self::Overloaded => "overloaded",
        }
    }

    /// Whether the failure came from the origin side of the relay, as
    /// opposed to the client's request or local capacity.
    pub fn is_origin_failure(&self) -> bool {
        matches!(
            self,
            Self::OriginUnreachable(_)
                | Self::OriginHttpError(_)
                | Self::Timeout(_)
                | Self::PlaylistTooLarge(_)
                | Self::ProxyUpstreamError(_)
                | Self::InvalidReference { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_) | Self::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Request failed ({}): {}", self.kind(), self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
