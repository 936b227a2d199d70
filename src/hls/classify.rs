//! Decide whether a fetched origin resource is a playlist or media.
//!
//! Origins are inconsistent about labelling chunklists, so this is a
//! best-effort heuristic over the `Content-Type` header and the URL path.
//! A mislabelled resource is misclassified; that is an accepted limitation.

use url::Url;

/// What a relayed resource turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A nested manifest that must be rewritten before it reaches the player
    Playlist,
    /// Opaque media bytes relayed as-is
    Segment,
}

/// Classify a resource from its response `Content-Type` and URL.
///
/// Any media type mentioning `mpegurl` wins regardless of the URL suffix.
/// Otherwise a `.m3u8`/`.m3u` path (query ignored) marks a playlist.
pub fn classify(content_type: Option<&str>, url: &Url) -> ResourceKind {
    let labelled_playlist = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("mpegurl"))
        .unwrap_or(false);

    if labelled_playlist || has_playlist_suffix(url) {
        ResourceKind::Playlist
    } else {
        ResourceKind::Segment
    }
}

fn has_playlist_suffix(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

/// Fallback `Content-Type` for media the origin sent unlabelled.
pub fn guess_content_type(url: &Url) -> &'static str {
    let path = url.path().to_ascii_lowercase();
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        "application/vnd.apple.mpegurl"
    } else if path.ends_with(".mp4") || path.ends_with(".m4s") {
        "video/mp4"
    } else if path.ends_with(".aac") {
        "audio/aac"
    } else if path.ends_with(".vtt") {
        "text/vtt"
    } else {
        "video/mp2t"
    }
}
