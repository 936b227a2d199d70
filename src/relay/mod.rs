//! Manifest rewriting and segment relay.
//!
//! [`Relay`] ties the origin client, the playlist rewriter and the stream
//! accounting together. A manifest request is fetched and rewritten in one
//! go. A segment request is opened as a stream and classified from its
//! response headers: nested playlists are read and rewritten, everything else
//! is relayed to the client chunk by chunk.

pub mod stream;

use crate::config::Config;
use crate::error::Result;
use crate::hls::{self, PLAYLIST_CONTENT_TYPE, ResourceKind, classify::guess_content_type};
use crate::origin::{Manifest, OriginClient};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use stream::{RelayTracker, TrackedStream, chunked_body};
use tracing::{debug, info};
use url::Url;

/// Origin response headers copied onto relayed media responses.
pub const FORWARDED_HEADERS: [header::HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
];

/// What a relayed resource becomes on the way back to the client.
pub enum RelayResponse {
    /// A rewritten playlist
    Playlist(String),
    /// Media bytes streamed from the origin
    Stream {
        status: StatusCode,
        headers: HeaderMap,
        body: Body,
    },
}

impl RelayResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayResponse::Playlist(_) => StatusCode::OK,
            RelayResponse::Stream { status, .. } => *status,
        }
    }
}

impl IntoResponse for RelayResponse {
    fn into_response(self) -> Response {
        match self {
            RelayResponse::Playlist(text) => playlist_response(text),
            RelayResponse::Stream {
                status,
                headers,
                body,
            } => (status, headers, body).into_response(),
        }
    }
}

/// Response for rewritten playlist text.
pub fn playlist_response(text: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        text,
    )
        .into_response()
}

#[derive(Clone, Debug)]
pub struct Relay {
    origin: OriginClient,
    tracker: RelayTracker,
    public_base_url: String,
    chunk_size: usize,
}

impl Relay {
    pub fn new(config: &Config) -> std::result::Result<Self, reqwest::Error> {
        Ok(Self {
            origin: OriginClient::new(config)?,
            tracker: RelayTracker::new(config.max_concurrent_relays),
            public_base_url: config.public_base_url.clone(),
            chunk_size: config.chunk_size,
        })
    }

    pub fn tracker(&self) -> &RelayTracker {
        &self.tracker
    }

    /// Fetch a top-level manifest and rewrite its references.
    pub async fn manifest(&self, url: &Url) -> Result<String> {
        let manifest = self.origin.fetch_manifest(url).await?;
        hls::rewrite_playlist(&manifest.body, &manifest.url, &self.public_base_url)
    }

    /// Fetch one referenced resource and relay it.
    ///
    /// `range` is the client's `Range` header, forwarded to the origin as-is.
    /// Only media streams take a relay slot; nested playlists are small,
    /// short-lived reads and stay available when the streaming pool is full.
    pub async fn resource(&self, url: &Url, range: Option<&HeaderValue>) -> Result<RelayResponse> {
        let response = self.origin.open(url, range).await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        match hls::classify(content_type, url) {
            ResourceKind::Playlist => {
                info!("Nested playlist detected: {}", url);
                let manifest = if response.status() == StatusCode::PARTIAL_CONTENT {
                    // A byte range of a playlist cannot be rewritten line by line
                    debug!("Origin sent a partial playlist for {}, refetching whole", url);
                    drop(response);
                    self.origin.fetch_manifest(url).await?
                } else {
                    let base = response.url().clone();
                    let body = self.origin.read_playlist(url, response).await?;
                    Manifest { url: base, body }
                };

                let rewritten =
                    hls::rewrite_playlist(&manifest.body, &manifest.url, &self.public_base_url)?;
                Ok(RelayResponse::Playlist(rewritten))
            }
            ResourceKind::Segment => {
                let guard = self.tracker.acquire()?;
                let status = response.status();
                let headers = media_headers(response.headers(), url);
                info!("Streaming segment {} ({})", url, status);

                let body = chunked_body(response, self.chunk_size);
                let stream = TrackedStream::new(body, url.clone(), guard);

                Ok(RelayResponse::Stream {
                    status,
                    headers,
                    body: Body::from_stream(stream),
                })
            }
        }
    }
}

/// Build client-facing headers for a relayed media response.
fn media_headers(origin: &HeaderMap, url: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in FORWARDED_HEADERS {
        if let Some(value) = origin.get(&name) {
            headers.insert(name, value.clone());
        }
    }

    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(guess_content_type(url)),
        );
    }

    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    headers
}
