//! Outbound identity presented to origin servers.
//!
//! Many HLS origins refuse requests that lack a same-origin `Referer` or come
//! from an unrecognised client, so every origin request carries a fixed
//! desktop browser identity. The policy is a pure function of the target URL
//! and the client's optional `Range` header.

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RANGE, REFERER, USER_AGENT};
use url::Url;

/// Desktop browser user agent sent to every origin.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// `scheme://host[:port]/` of the target, used as the `Referer`.
pub fn referer_for(target: &Url) -> String {
    match (target.host_str(), target.port()) {
        (Some(host), Some(port)) => format!("{}://{}:{}/", target.scheme(), host, port),
        (Some(host), None) => format!("{}://{}/", target.scheme(), host),
        _ => format!("{}:///", target.scheme()),
    }
}

/// Build the header set for an origin request.
///
/// `range` is forwarded byte-for-byte when present.
pub fn outbound_headers(target: &Url, range: Option<&HeaderValue>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

    // Host names and ports are ASCII after URL parsing, so this only fails
    // for pathological inputs; skip the header rather than fail the request.
    if let Ok(referer) = HeaderValue::from_str(&referer_for(target)) {
        headers.insert(REFERER, referer);
    }

    if let Some(range) = range {
        headers.insert(RANGE, range.clone());
    }

    headers
}
