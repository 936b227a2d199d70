//! Bounded-memory body streaming with relay accounting.
//!
//! A relayed segment body is pulled from the origin one chunk at a time, only
//! when hyper asks for the next chunk to write to the client. When the client
//! goes away hyper drops the body, which drops the origin response and closes
//! its connection; [`RelayGuard`] records that the relay has ended.

use crate::error::{RelayError, Result};
use crate::metrics;
use axum::body::Bytes;
use futures_util::{Stream, TryStreamExt};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, info, warn};
use url::Url;

/// Boxed stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Counts in-flight relays and enforces the optional concurrency limit.
#[derive(Clone, Debug)]
pub struct RelayTracker {
    active: Arc<AtomicUsize>,
    limit: Option<Arc<Semaphore>>,
}

impl RelayTracker {
    /// `max_concurrent == 0` disables the limit.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            limit: (max_concurrent > 0).then(|| Arc::new(Semaphore::new(max_concurrent))),
        }
    }

    /// Number of relays currently holding a guard.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Reserve a relay slot, failing fast with [`RelayError::Overloaded`]
    /// instead of queueing when the limit is reached.
    pub fn acquire(&self) -> Result<RelayGuard> {
        let permit = match &self.limit {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .try_acquire_owned()
                    .map_err(|_| RelayError::Overloaded)?,
            ),
            None => None,
        };

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_relays(active);

        Ok(RelayGuard {
            active: self.active.clone(),
            _permit: permit,
        })
    }
}

/// Held for the lifetime of one relay; releases its slot on drop.
#[derive(Debug)]
pub struct RelayGuard {
    active: Arc<AtomicUsize>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_relays(active);
    }
}

/// Turn an origin response body into a stream of chunks no larger than
/// `chunk_size`.
pub fn chunked_body(response: reqwest::Response, chunk_size: usize) -> ByteStream {
    let origin = response.bytes_stream().map_err(io::Error::other);
    Box::pin(ReaderStream::with_capacity(
        StreamReader::new(origin),
        chunk_size,
    ))
}

/// Body stream that owns the relay guard and logs how the transfer ended.
pub struct TrackedStream {
    inner: ByteStream,
    url: Url,
    bytes: u64,
    finished: bool,
    _guard: RelayGuard,
}

impl TrackedStream {
    pub fn new(inner: ByteStream, url: Url, guard: RelayGuard) -> Self {
        Self {
            inner,
            url,
            bytes: 0,
            finished: false,
            _guard: guard,
        }
    }
}

impl Stream for TrackedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes += chunk.len() as u64;
                metrics::record_bytes_relayed(chunk.len() as u64);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                // Headers are already on the wire, so the only way to signal
                // failure is to abort the client connection.
                let err = RelayError::ProxyUpstreamError(e.to_string());
                warn!("{} after {} bytes from {}", err, this.bytes, this.url);
                metrics::record_origin_error(err.kind());
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                debug!("Relayed {} bytes from {}", this.bytes, this.url);
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        if !self.finished {
            info!(
                "Client disconnected after {} bytes; closing origin fetch for {}",
                self.bytes, self.url
            );
        }
    }
}
