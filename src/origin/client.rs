//! HTTP access to origin servers.
//!
//! [`OriginClient`] wraps a pooled [`reqwest::Client`] and applies the
//! identity policy to every request. Nothing here retries: a failed origin
//! request fails the client request that caused it, and the player decides
//! whether to try again.

use super::identity::outbound_headers;
use crate::config::Config;
use crate::error::{RelayError, Result};
use futures_util::StreamExt;
use reqwest::header::HeaderValue;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Playlist text together with the URL it was finally served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Final URL after redirects; relative references resolve against it
    pub url: Url,
    pub body: String,
}

/// Origin HTTP client shared by the manifest and segment handlers.
#[derive(Clone, Debug)]
pub struct OriginClient {
    http: Client,
    response_timeout: Duration,
    manifest_timeout: Duration,
    max_playlist_bytes: usize,
}

impl OriginClient {
    /// Build a client with the dial timeout from `config`.
    ///
    /// No total-request timeout is set on the client itself, since relayed
    /// segments can legitimately take longer than any fixed bound.
    pub fn new(config: &Config) -> std::result::Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            http,
            response_timeout: config.response_timeout,
            manifest_timeout: config.manifest_timeout,
            max_playlist_bytes: config.max_playlist_bytes,
        })
    }

    /// Fetch playlist text from `url`.
    ///
    /// The manifest timeout bounds the whole exchange, body included.
    pub async fn fetch_manifest(&self, url: &Url) -> Result<Manifest> {
        let fetch = async {
            let response = self
                .http
                .get(url.as_str())
                .headers(outbound_headers(url, None))
                .send()
                .await
                .map_err(|e| map_send_error(url, e, self.manifest_timeout))?;

            let response = ensure_success(url, response)?;
            let final_url = response.url().clone();

            let body = read_capped(url, response, self.max_playlist_bytes).await?;

            Ok::<_, RelayError>(Manifest {
                url: final_url,
                body,
            })
        };

        let manifest = tokio::time::timeout(self.manifest_timeout, fetch)
            .await
            .map_err(|_| {
                warn!("Manifest fetch timed out for {}", url);
                RelayError::Timeout(self.manifest_timeout.as_secs())
            })??;

        debug!("Fetched manifest {} ({} bytes)", manifest.url, manifest.body.len());
        Ok(manifest)
    }

    /// Issue a streamed GET and return as soon as response headers arrive.
    ///
    /// Only the wait for headers is bounded; the body is left unread for the
    /// caller to consume at its own pace.
    pub async fn open(&self, url: &Url, range: Option<&HeaderValue>) -> Result<Response> {
        let request = self
            .http
            .get(url.as_str())
            .headers(outbound_headers(url, range))
            .send();

        let response = tokio::time::timeout(self.response_timeout, request)
            .await
            .map_err(|_| {
                warn!("Origin did not respond within {:?} for {}", self.response_timeout, url);
                RelayError::Timeout(self.response_timeout.as_secs())
            })?
            .map_err(|e| map_send_error(url, e, self.response_timeout))?;

        ensure_success(url, response)
    }

    /// Read the body of an already opened response as playlist text, under
    /// the manifest timeout and the playlist size cap.
    pub async fn read_playlist(&self, url: &Url, response: Response) -> Result<String> {
        tokio::time::timeout(
            self.manifest_timeout,
            read_capped(url, response, self.max_playlist_bytes),
        )
        .await
        .map_err(|_| {
            warn!("Playlist body timed out for {}", url);
            RelayError::Timeout(self.manifest_timeout.as_secs())
        })?
    }
}

/// Accumulate a body into text, refusing anything over `limit` bytes.
///
/// A declared `Content-Length` over the limit is rejected before reading;
/// otherwise the stream is cut as soon as it crosses the limit.
async fn read_capped(url: &Url, response: Response, limit: usize) -> Result<String> {
    if let Some(declared) = response.content_length()
        && declared > limit as u64
    {
        warn!("Playlist {} declares {} bytes, over the {} byte cap", url, declared, limit);
        return Err(RelayError::PlaylistTooLarge(limit));
    }

    let mut body = Vec::new();
    let mut chunks = std::pin::pin!(response.bytes_stream());
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| {
            warn!("Playlist body read failed for {}: {}", url, e);
            RelayError::ProxyUpstreamError(e.to_string())
        })?;
        if body.len() + chunk.len() > limit {
            warn!("Playlist {} exceeded the {} byte cap", url, limit);
            return Err(RelayError::PlaylistTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn ensure_success(url: &Url, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        warn!("Origin returned {} for {}", status, url);
        Err(RelayError::OriginHttpError(status.as_u16()))
    }
}

fn map_send_error(url: &Url, e: reqwest::Error, timeout: Duration) -> RelayError {
    warn!("Origin request failed for {}: {}", url, e);
    if e.is_timeout() {
        RelayError::Timeout(timeout.as_secs())
    } else {
        RelayError::OriginUnreachable(e.to_string())
    }
}
